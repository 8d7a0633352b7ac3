//! 会话指标聚合与注意力评分
//!
//! 两种评分：
//! - 逐帧快速评分：基准分扣减固定惩罚，随每帧结果返回
//! - 会话综合评分：按需从全部累计数据重算，计数先换算成每分钟速率，
//!   再与正常区间比较得到分项惩罚

use serde::Serialize;

use crate::tracking::config::ScoringConfig;
use crate::tracking::types::{Expression, ExpressionHistogram, FrameRecord, PostureHistogram};

/// 单个会话的累计状态，只能整体替换
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionMetrics {
    #[serde(skip)]
    pub blink_count: u64,
    #[serde(skip)]
    pub eye_movement_count: u64,
    #[serde(skip)]
    pub posture_change_count: u64,
    pub time_series: Vec<FrameRecord>,
    pub facial_expressions: ExpressionHistogram,
    pub posture_states: PostureHistogram,
}

impl SessionMetrics {
    pub fn total_frames(&self) -> usize {
        self.time_series.len()
    }

    /// 首尾时间戳差，不足两帧或差值过小时取下限
    pub fn duration_secs(&self, min_duration: f64) -> f64 {
        match (self.time_series.first(), self.time_series.last()) {
            (Some(first), Some(last)) if self.time_series.len() >= 2 => {
                min_duration.max(last.timestamp - first.timestamp)
            }
            _ => min_duration,
        }
    }

    /// `{time_series, facial_expressions, posture_states}` 的 JSON 文本
    pub fn to_session_data(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 逐帧快速评分
pub fn frame_score(
    blink_detected: bool,
    eye_movement_count: u64,
    posture_change_count: u64,
    expression: Expression,
    config: &ScoringConfig,
) -> i64 {
    let mut score = config.frame_base;
    if blink_detected {
        score -= config.frame_blink_penalty;
    }
    if eye_movement_count > config.frame_eye_movement_limit {
        score -= config.frame_eye_movement_penalty;
    }
    if posture_change_count > config.frame_posture_change_limit {
        score -= config.frame_posture_penalty;
    }
    if expression == Expression::Distracted {
        score -= config.frame_distracted_penalty;
    }
    score.clamp(0.0, 100.0).round() as i64
}

/// 综合评分的各分项，便于日志与排查
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreBreakdown {
    pub duration_secs: f64,
    pub blinks_per_minute: f64,
    pub eye_movements_per_minute: f64,
    pub posture_changes_per_minute: f64,
    pub focused_percentage: f64,
    pub good_posture_percentage: f64,
    pub blink_penalty: f64,
    pub eye_movement_penalty: f64,
    pub posture_penalty: f64,
    pub distraction_penalty: f64,
    pub base_score: f64,
    pub score: f64,
}

pub fn blink_penalty(per_minute: f64, c: &ScoringConfig) -> f64 {
    if per_minute < c.normal_blink_min {
        c.blink_penalty_cap
            .min(c.low_blink_base_penalty + (c.normal_blink_min - per_minute) * c.low_blink_slope)
    } else if per_minute > c.normal_blink_max {
        c.blink_penalty_cap
            .min((per_minute - c.normal_blink_max) * c.high_blink_slope)
    } else {
        0.0
    }
}

pub fn eye_movement_penalty(per_minute: f64, c: &ScoringConfig) -> f64 {
    excess_penalty(
        per_minute,
        c.normal_eye_movement_max,
        c.eye_movement_slope,
        c.eye_movement_penalty_cap,
    )
}

pub fn posture_penalty(per_minute: f64, c: &ScoringConfig) -> f64 {
    excess_penalty(
        per_minute,
        c.normal_posture_change_max,
        c.posture_change_slope,
        c.posture_penalty_cap,
    )
}

fn excess_penalty(value: f64, max_normal: f64, slope: f64, cap: f64) -> f64 {
    if value > max_normal {
        cap.min((value - max_normal) * slope)
    } else {
        0.0
    }
}

/// 会话综合评分；没有任何帧时返回 None，由调用方使用默认分
pub fn session_breakdown(metrics: &SessionMetrics, c: &ScoringConfig) -> Option<ScoreBreakdown> {
    let total = metrics.total_frames();
    if total == 0 {
        return None;
    }
    let total = total as f64;
    let expressions = &metrics.facial_expressions;
    let postures = &metrics.posture_states;

    let focused = (expressions.focused + expressions.neutral) as f64;
    let focused_percentage = focused / total * 100.0;

    let good_posture =
        postures.upright as f64 + postures.leaning_forward as f64 * c.leaning_forward_credit;
    let good_posture_percentage = (good_posture / total * 100.0).min(100.0);

    let duration_secs = metrics.duration_secs(c.min_duration_secs);
    let per_minute = |count: u64| count as f64 / duration_secs * 60.0;
    let blinks_per_minute = per_minute(metrics.blink_count);
    let eye_movements_per_minute = per_minute(metrics.eye_movement_count);
    let posture_changes_per_minute = per_minute(metrics.posture_change_count);

    let blink_penalty = blink_penalty(blinks_per_minute, c);
    let eye_movement_penalty = eye_movement_penalty(eye_movements_per_minute, c);
    let posture_penalty = posture_penalty(posture_changes_per_minute, c);

    let distracted = (expressions.distracted + expressions.confused) as f64;
    let distraction_penalty = c
        .distraction_penalty_cap
        .min(distracted / total * 100.0 * c.distraction_slope);

    let base_score =
        focused_percentage * c.focus_weight + good_posture_percentage * c.posture_weight;
    let penalties = blink_penalty + eye_movement_penalty + posture_penalty + distraction_penalty;

    let mut adjusted = c.score_floor.max(base_score - penalties);
    if duration_secs < c.short_session_secs {
        adjusted = adjusted.max(c.short_session_floor);
    }

    Some(ScoreBreakdown {
        duration_secs,
        blinks_per_minute,
        eye_movements_per_minute,
        posture_changes_per_minute,
        focused_percentage,
        good_posture_percentage,
        blink_penalty,
        eye_movement_penalty,
        posture_penalty,
        distraction_penalty,
        base_score,
        score: adjusted.clamp(0.0, 100.0),
    })
}

pub fn session_score(metrics: &SessionMetrics, config: &ScoringConfig) -> f64 {
    match session_breakdown(metrics, config) {
        Some(b) => {
            tracing::debug!(
                duration_secs = b.duration_secs,
                blinks_per_minute = b.blinks_per_minute,
                eye_movements_per_minute = b.eye_movements_per_minute,
                posture_changes_per_minute = b.posture_changes_per_minute,
                base_score = b.base_score,
                blink_penalty = b.blink_penalty,
                eye_movement_penalty = b.eye_movement_penalty,
                posture_penalty = b.posture_penalty,
                distraction_penalty = b.distraction_penalty,
                score = b.score,
                "attentiveness score computed"
            );
            b.score
        }
        None => config.empty_session_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: f64, expression: Expression) -> FrameRecord {
        FrameRecord {
            timestamp,
            blink_detected: false,
            eye_movements: 0,
            posture_changes: 0,
            expression,
        }
    }

    /// `frames` 帧均匀分布在 `duration` 秒内，全部专注、端坐
    fn steady_session(frames: usize, duration: f64) -> SessionMetrics {
        let mut m = SessionMetrics::default();
        for i in 0..frames {
            let t = duration * i as f64 / (frames - 1) as f64;
            m.time_series.push(record(t, Expression::Focused));
            m.facial_expressions.increment(Expression::Focused);
            m.posture_states.upright += 1;
        }
        m
    }

    #[test]
    fn frame_score_applies_each_penalty() {
        let c = ScoringConfig::default();
        assert_eq!(frame_score(false, 0, 0, Expression::Neutral, &c), 90);
        assert_eq!(frame_score(true, 0, 0, Expression::Neutral, &c), 85);
        assert_eq!(frame_score(false, 10, 5, Expression::Neutral, &c), 90);
        assert_eq!(frame_score(false, 11, 6, Expression::Neutral, &c), 72);
        assert_eq!(frame_score(true, 11, 6, Expression::Distracted, &c), 52);
    }

    #[test]
    fn frame_score_is_clamped() {
        let c = ScoringConfig {
            frame_base: 10.0,
            ..ScoringConfig::default()
        };
        assert_eq!(frame_score(true, 99, 99, Expression::Distracted, &c), 0);
        let c = ScoringConfig {
            frame_base: 150.0,
            ..ScoringConfig::default()
        };
        assert_eq!(frame_score(false, 0, 0, Expression::Neutral, &c), 100);
    }

    #[test]
    fn empty_session_returns_default() {
        let c = ScoringConfig::default();
        let m = SessionMetrics::default();
        assert!(session_breakdown(&m, &c).is_none());
        assert_eq!(session_score(&m, &c), 75.0);
    }

    #[test]
    fn blink_penalty_is_asymmetric() {
        let c = ScoringConfig::default();
        assert_eq!(blink_penalty(12.0, &c), 0.0);
        // 每分钟 0 次：3 + 8 × 0.8
        assert!((blink_penalty(0.0, &c) - 9.4).abs() < 1e-9);
        assert!((blink_penalty(30.0, &c) - 7.0).abs() < 1e-9);
        assert_eq!(blink_penalty(100.0, &c), 15.0);
    }

    #[test]
    fn excess_penalties_are_capped() {
        let c = ScoringConfig::default();
        assert_eq!(eye_movement_penalty(5.0, &c), 0.0);
        assert!((eye_movement_penalty(8.0, &c) - 6.0).abs() < 1e-9);
        assert_eq!(eye_movement_penalty(60.0, &c), 20.0);
        assert_eq!(posture_penalty(3.0, &c), 0.0);
        assert!((posture_penalty(5.0, &c) - 6.0).abs() < 1e-9);
        assert_eq!(posture_penalty(30.0, &c), 10.0);
    }

    #[test]
    fn single_frame_uses_unit_duration() {
        let c = ScoringConfig::default();
        let mut m = SessionMetrics::default();
        m.time_series.push(record(100.0, Expression::Neutral));
        m.facial_expressions.increment(Expression::Neutral);
        let b = session_breakdown(&m, &c).unwrap();
        assert_eq!(b.duration_secs, 1.0);
        // 短会话保底 60
        assert!(b.score >= 60.0);
    }

    #[test]
    fn long_focused_session_scores_high() {
        let c = ScoringConfig::default();
        let mut m = steady_session(61, 60.0);
        m.blink_count = 12;
        m.eye_movement_count = 3;
        m.posture_change_count = 1;
        let b = session_breakdown(&m, &c).unwrap();
        assert_eq!(b.duration_secs, 60.0);
        assert_eq!(b.focused_percentage, 100.0);
        assert_eq!(b.good_posture_percentage, 100.0);
        assert_eq!(b.blink_penalty, 0.0);
        assert_eq!(b.score, 100.0);
    }

    #[test]
    fn distracted_long_session_hits_floor() {
        let c = ScoringConfig::default();
        let mut m = SessionMetrics::default();
        for i in 0..21 {
            m.time_series.push(record(i as f64 * 3.0, Expression::Distracted));
            m.facial_expressions.increment(Expression::Distracted);
            m.posture_states.slouching += 1;
        }
        m.eye_movement_count = 200;
        m.posture_change_count = 100;
        let b = session_breakdown(&m, &c).unwrap();
        assert_eq!(b.base_score, 0.0);
        assert_eq!(b.score, 30.0);
    }

    #[test]
    fn leaning_forward_gets_partial_credit() {
        let c = ScoringConfig::default();
        let mut m = steady_session(11, 20.0);
        m.posture_states.upright = 0;
        m.posture_states.leaning_forward = 11;
        m.blink_count = 4;
        let b = session_breakdown(&m, &c).unwrap();
        assert!((b.good_posture_percentage - 70.0).abs() < 1e-9);
    }

    #[test]
    fn good_posture_is_capped_when_buckets_exceed_frames() {
        let c = ScoringConfig::default();
        let mut m = steady_session(5, 4.0);
        m.posture_states.leaning_forward = 10;
        let b = session_breakdown(&m, &c).unwrap();
        assert_eq!(b.good_posture_percentage, 100.0);
    }

    #[test]
    fn session_data_has_three_sections() {
        let m = steady_session(2, 1.0);
        let raw = m.to_session_data().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["time_series"].as_array().unwrap().len(), 2);
        assert_eq!(value["facial_expressions"]["focused"], 2);
        assert_eq!(value["posture_states"]["upright"], 2);
        assert!(value.get("blink_count").is_none());
    }
}
