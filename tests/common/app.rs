use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use tokio::sync::broadcast;

use attention_backend::config::{
    Config, PerceptionConfig, PerceptionMode, SessionConfig, WorkerConfig,
};
use attention_backend::perception::{
    FramePayload, PerceptionClient, PerceptionEngine, PerceptionError,
};
use attention_backend::routes::build_router;
use attention_backend::state::AppState;
use attention_backend::tracking::{Detection, SessionStore, TrackingConfig};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
}

/// 按顺序返回预设结果的感知引擎；队列耗尽后返回空检测
#[derive(Default)]
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Result<Detection, PerceptionError>>>,
    delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Result<Detection, PerceptionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            script: Mutex::default(),
            delay: Some(delay),
        }
    }
}

#[axum::async_trait]
impl PerceptionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(&self, _frame: &FramePayload) -> Result<Detection, PerceptionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Detection::default()))
    }
}

pub fn test_config() -> Config {
    // 直接构造 Config，避免 set_var 在并行测试中相互干扰
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 8000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        cors_origin: "*".to_string(),
        max_frame_bytes: 64 * 1024,
        tracking_config_path: None,
        session: SessionConfig {
            max_sessions: 4,
            idle_ttl_secs: 1800,
        },
        worker: WorkerConfig {
            enabled: false,
            session_cleanup_cron: "0 */5 * * * *".to_string(),
            session_stats_cron: "0 * * * * *".to_string(),
        },
        perception: PerceptionConfig {
            mode: PerceptionMode::Mock,
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 1,
        },
    }
}

pub fn spawn_with(config: Config, engine: Arc<dyn PerceptionEngine>) -> TestApp {
    let sessions = Arc::new(SessionStore::new(
        TrackingConfig::default(),
        config.session.max_sessions,
    ));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(sessions, engine, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp { app, state, config }
}

pub fn spawn_with_engine(engine: ScriptedEngine) -> TestApp {
    spawn_with(test_config(), Arc::new(engine))
}

pub async fn spawn_test_app() -> TestApp {
    let config = test_config();
    let engine = Arc::new(PerceptionClient::new(&config.perception));
    spawn_with(config, engine)
}

pub async fn spawn_test_server() -> TestApp {
    spawn_test_app().await
}
