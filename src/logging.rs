use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "attention-backend";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

impl From<&Config> for LogConfig {
    fn from(config: &Config) -> Self {
        Self {
            log_level: config.log_level.clone(),
            enable_file_logs: config.enable_file_logs,
            log_dir: config.log_dir.clone(),
        }
    }
}

/// 初始化全局 subscriber：stdout 文本日志 + 可选的按天滚动 JSON 文件日志
///
/// 日志目录不可用时退回仅 stdout。重复调用（如多个测试）时静默忽略 "already been set"。
pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    let (appender, appender_error) = match file_appender(config) {
        Some(Ok(appender)) => (Some(appender), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    // Option<Layer> 为 None 时等价于不挂载
    let file_layer = appender.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(false)
    });

    let result = Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = result {
        if !e.to_string().contains("already been set") {
            panic!("Failed to initialize tracing: {e}");
        }
    }

    if let Some(e) = appender_error {
        tracing::warn!(log_dir = %config.log_dir, error = %e, "File logging disabled");
    }
}

fn file_appender(
    config: &LogConfig,
) -> Option<Result<RollingFileAppender, tracing_appender::rolling::InitError>> {
    if !config.enable_file_logs {
        return None;
    }
    Some(
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(14)
            .build(&config.log_dir),
    )
}
