//! 日志初始化
//!
//! 基于 `tracing-subscriber`（fmt + EnvFilter）。`RUST_LOG` 优先，未设置时
//! 使用调用方给出的默认过滤规则。`log` crate 的记录通过 `tracing-log`
//! 转发。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 默认过滤规则
pub const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Failed to install log bridge: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 按给定默认规则初始化日志
pub fn try_init_logger_with(default_filter: &str) -> Result<(), LoggerError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// 初始化日志（默认 `info`）
pub fn try_init_logger() -> Result<(), LoggerError> {
    try_init_logger_with(DEFAULT_FILTER)
}

/// 初始化日志，重复调用时静默忽略
pub fn init_logger() {
    let _ = try_init_logger();
}
