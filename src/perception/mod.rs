//! 感知引擎边界：图像 → 面部/姿态关键点
//!
//! 引擎本身不在本服务内实现。`PerceptionClient` 通过 HTTP 调用外部 sidecar，
//! 测试与本地开发可使用 mock 模式。

pub mod client;
pub mod frame;

pub use client::PerceptionClient;
pub use frame::{FramePayload, BLANK_FRAME};

use crate::tracking::Detection;

#[derive(Debug, thiserror::Error)]
pub enum PerceptionError {
    #[error("perception engine is disabled")]
    Disabled,
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("perception request timed out")]
    Timeout,
    #[error("perception network error: {0}")]
    Network(String),
    #[error("perception engine error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("invalid perception response: {0}")]
    InvalidResponse(String),
}

#[axum::async_trait]
pub trait PerceptionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// 检测一帧；未检测到人脸/人体时对应字段为 None，而不是错误
    async fn detect(&self, frame: &FramePayload) -> Result<Detection, PerceptionError>;
}
