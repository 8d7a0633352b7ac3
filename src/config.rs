use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    /// 请求体上限（base64 帧图像）
    pub max_frame_bytes: usize,
    /// 检测器调参 JSON 文件，未设置时使用内置默认值
    pub tracking_config_path: Option<String>,
    pub session: SessionConfig,
    pub worker: WorkerConfig,
    pub perception: PerceptionConfig,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_sessions: usize,
    pub idle_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub session_cleanup_cron: String,
    pub session_stats_cron: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerceptionMode {
    Disabled,
    Mock,
    Remote,
}

impl PerceptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Mock => "mock",
            Self::Remote => "remote",
        }
    }
}

impl FromStr for PerceptionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(Self::Disabled),
            "mock" => Ok(Self::Mock),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown perception mode: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct PerceptionConfig {
    pub mode: PerceptionMode,
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for PerceptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerceptionConfig")
            .field("mode", &self.mode)
            .field("url", &self.url)
            .field("api_key", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))),
            port: env_or_parse("PORT", 8000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "*"),
            max_frame_bytes: env_or_parse("MAX_FRAME_BYTES", 8 * 1024 * 1024_usize),
            tracking_config_path: env::var("TRACKING_CONFIG_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty()),
            session: SessionConfig {
                max_sessions: env_or_parse("MAX_SESSIONS", 256_usize),
                idle_ttl_secs: env_or_parse("SESSION_IDLE_TTL_SECS", 1800_u64),
            },
            worker: WorkerConfig {
                enabled: env_or_bool("WORKER_ENABLED", true),
                session_cleanup_cron: env_or("SESSION_CLEANUP_CRON", "0 */5 * * * *"),
                session_stats_cron: env_or("SESSION_STATS_CRON", "0 * * * * *"),
            },
            perception: PerceptionConfig {
                mode: env_or_parse("PERCEPTION_MODE", PerceptionMode::Mock),
                url: env_or("PERCEPTION_URL", "http://127.0.0.1:8500/detect"),
                api_key: env_or("PERCEPTION_API_KEY", ""),
                timeout_secs: env_or_parse("PERCEPTION_TIMEOUT_SECS", 5_u64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "MAX_SESSIONS",
            "PERCEPTION_MODE",
            "PERCEPTION_TIMEOUT_SECS",
            "TRACKING_CONFIG_PATH",
            "WORKER_ENABLED",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.session.max_sessions, 256);
        assert_eq!(cfg.perception.mode, PerceptionMode::Mock);
        assert!(cfg.tracking_config_path.is_none());
        assert!(cfg.worker.enabled);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("MAX_SESSIONS", "8");
        env::set_var("PERCEPTION_TIMEOUT_SECS", "42");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.session.max_sessions, 8);
        assert_eq!(cfg.perception.timeout_secs, 42);
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("PERCEPTION_MODE", "quantum");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.perception.mode, PerceptionMode::Mock);
    }

    #[test]
    fn perception_mode_and_flags() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PERCEPTION_MODE", " Remote ");
        env::set_var("WORKER_ENABLED", "off");
        env::set_var("TRACKING_CONFIG_PATH", "  ");

        let cfg = Config::from_env();
        assert_eq!(cfg.perception.mode, PerceptionMode::Remote);
        assert!(!cfg.worker.enabled);
        assert!(cfg.tracking_config_path.is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let cfg = PerceptionConfig {
            mode: PerceptionMode::Remote,
            url: "http://localhost".into(),
            api_key: "secret-token".into(),
            timeout_secs: 1,
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("REDACTED"));
    }
}
