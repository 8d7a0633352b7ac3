//! 单个会话：全部检测器 + 累计指标
//!
//! 每帧按固定顺序运行：眨眼 → 眼动 → 表情（需要面部）→ 姿态，
//! 然后把结果折叠进 `SessionMetrics`。表情规则读取的是本帧更新后的眼动累计数。

use std::sync::Arc;

use serde::Serialize;

use crate::tracking::blink::BlinkDetector;
use crate::tracking::config::TrackingConfig;
use crate::tracking::expression::ExpressionClassifier;
use crate::tracking::gaze::GazeMovementDetector;
use crate::tracking::posture::PostureClassifier;
use crate::tracking::scoring::{frame_score, session_score, SessionMetrics};
use crate::tracking::types::{
    Expression, ExpressionHistogram, FrameMetrics, FrameRecord, LandmarkFrame, PostureHistogram,
};

/// get_session_results 的返回体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub eye_blinks: u64,
    pub eye_movements: u64,
    pub posture_changes: u64,
    pub attentiveness_score: f64,
    pub facial_expressions: ExpressionHistogram,
    pub posture_states: PostureHistogram,
    /// 时间序列与直方图的 JSON 文本
    pub session_data: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    config: Arc<TrackingConfig>,
    blink: BlinkDetector,
    gaze: GazeMovementDetector,
    posture: PostureClassifier,
    expression: ExpressionClassifier,
    metrics: SessionMetrics,
}

impl Session {
    pub fn new(config: Arc<TrackingConfig>) -> Self {
        Self {
            blink: BlinkDetector::new(config.blink.clone()),
            gaze: GazeMovementDetector::new(config.gaze.clone()),
            posture: PostureClassifier::new(config.posture.clone()),
            expression: ExpressionClassifier::new(config.expression.clone()),
            metrics: SessionMetrics::default(),
            config,
        }
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn frame_count(&self) -> usize {
        self.metrics.total_frames()
    }

    /// 处理一帧。帧在构造时已完成校验，这里不会失败。
    pub fn process_frame(&mut self, frame: &LandmarkFrame) -> FrameMetrics {
        let timestamp = frame.timestamp();
        let mut blink_detected = false;
        let mut expression = Expression::Neutral;

        if let Some(face) = frame.face() {
            blink_detected = self.blink.process(&face, timestamp).blink_detected;
            let gaze = self.gaze.process(&face, timestamp);
            expression = self.expression.classify(
                &face,
                gaze.eye_movement_count,
                &mut self.metrics.facial_expressions,
            );
        }

        let posture = self
            .posture
            .process(frame.pose(), timestamp, &mut self.metrics.posture_states);

        let m = &mut self.metrics;
        m.blink_count = self.blink.blink_count();
        m.eye_movement_count = self.gaze.eye_movement_count();
        m.posture_change_count = posture.posture_change_count;
        m.time_series.push(FrameRecord {
            timestamp,
            blink_detected,
            eye_movements: m.eye_movement_count,
            posture_changes: m.posture_change_count,
            expression,
        });

        let attentiveness_score = frame_score(
            blink_detected,
            m.eye_movement_count,
            m.posture_change_count,
            expression,
            &self.config.scoring,
        );

        tracing::debug!(
            blink_count = m.blink_count,
            eye_movement_count = m.eye_movement_count,
            posture_change_count = m.posture_change_count,
            attentiveness_score,
            expression = expression.as_str(),
            "frame processed"
        );

        FrameMetrics {
            blink_count: m.blink_count,
            eye_movement_count: m.eye_movement_count,
            posture_change_count: m.posture_change_count,
            attentiveness_score,
            facial_expression: expression,
        }
    }

    /// 只读快照；两次调用之间没有新帧时结果相同
    pub fn results(&self) -> Result<SessionResults, serde_json::Error> {
        let m = &self.metrics;
        Ok(SessionResults {
            eye_blinks: m.blink_count,
            eye_movements: m.eye_movement_count,
            posture_changes: m.posture_change_count,
            attentiveness_score: session_score(m, &self.config.scoring),
            facial_expressions: m.facial_expressions,
            posture_states: m.posture_states,
            session_data: m.to_session_data()?,
        })
    }

    /// 整体替换为全新状态（包括所有检测器历史与自适应阈值）
    pub fn reset(&mut self) {
        *self = Session::new(Arc::clone(&self.config));
    }
}
