//! 注意力追踪核心：关键点帧 → 眨眼 / 眼动 / 姿态 / 表情 → 评分
//!
//! 本模块不做任何 I/O，关键点由外部感知引擎提供。

pub mod blink;
pub mod config;
pub mod expression;
pub mod gaze;
pub mod history;
pub mod posture;
pub mod scoring;
pub mod session;
pub mod store;
pub mod types;

pub use config::TrackingConfig;
pub use session::{Session, SessionResults};
pub use store::{SessionStore, StoreError, DEFAULT_SESSION_KEY};
pub use types::{Detection, FrameError, FrameMetrics, LandmarkFrame, Point3};
