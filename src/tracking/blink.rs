//! 眨眼检测模块
//!
//! 基于四状态有限状态机：
//! Open（睁眼）→ Closing（正在闭眼）→ Closed（闭眼）→ Opening（正在睁眼）→ Open
//!
//! 阈值随个人睁眼基线自适应（历史 EAR 的 80 分位数乘以比例，并设下限）。
//! 除状态机外还有三种补充判定：速度尖峰、快速下降、先降后升模式。
//! 每帧按 速度尖峰 → 状态机 → 快速下降 → 模式匹配 的固定顺序求值，
//! 共用同一个冷却时钟，计数成功后立即更新，因此同一帧最多计数一次。

use serde::Serialize;

use crate::tracking::config::BlinkConfig;
use crate::tracking::history::{percentile, RingBuffer};
use crate::tracking::types::{FaceLandmarks, LEFT_EYE, RIGHT_EYE};

/// 单眼 6 点 EAR
///
/// 公式: EAR = (|p2-p6| + |p3-p5|) / (2 * |p1-p4|)
/// 水平距离不大于 `degenerate_width` 时返回 0。
pub fn eye_aspect_ratio(face: &FaceLandmarks<'_>, eye: &[usize; 6], degenerate_width: f64) -> f64 {
    let p = |i: usize| face.point(eye[i]);

    let horizontal = p(0).planar_distance(&p(3));
    if horizontal <= degenerate_width {
        return 0.0;
    }

    let vertical1 = p(1).planar_distance(&p(5));
    let vertical2 = p(2).planar_distance(&p(4));
    ((vertical1 + vertical2) / 2.0) / horizontal
}

/// 双眼平均 EAR
pub fn binocular_ear(face: &FaceLandmarks<'_>, degenerate_width: f64) -> f64 {
    let left = eye_aspect_ratio(face, &LEFT_EYE, degenerate_width);
    let right = eye_aspect_ratio(face, &RIGHT_EYE, degenerate_width);
    (left + right) / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkState {
    Open,
    Closing,
    Closed,
    Opening,
}

/// 触发计数的判定路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkTrigger {
    VelocitySpike,
    StateMachine,
    RapidDrop,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkThresholds {
    pub open: f64,
    pub closing: f64,
    pub opening: f64,
    pub closed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarSample {
    pub ear: f64,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkOutcome {
    pub blink_detected: bool,
    pub trigger: Option<BlinkTrigger>,
    pub ear: f64,
    pub state: BlinkState,
}

#[derive(Debug, Clone)]
pub struct BlinkDetector {
    config: BlinkConfig,
    history: RingBuffer<EarSample>,
    state: BlinkState,
    closed_frames: u32,
    velocity_confirmations: u32,
    last_blink_at: Option<f64>,
    blink_count: u64,
}

impl BlinkDetector {
    pub fn new(config: BlinkConfig) -> Self {
        let history = RingBuffer::new(config.history_size);
        Self {
            config,
            history,
            state: BlinkState::Open,
            closed_frames: 0,
            velocity_confirmations: 0,
            last_blink_at: None,
            blink_count: 0,
        }
    }

    pub fn blink_count(&self) -> u64 {
        self.blink_count
    }

    pub fn state(&self) -> BlinkState {
        self.state
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn process(&mut self, face: &FaceLandmarks<'_>, timestamp: f64) -> BlinkOutcome {
        let ear = binocular_ear(face, self.config.degenerate_width);
        self.process_ear(ear, timestamp)
    }

    pub fn process_ear(&mut self, ear: f64, timestamp: f64) -> BlinkOutcome {
        self.history.push(EarSample { ear, timestamp });
        let thresholds = self.thresholds();

        tracing::trace!(
            ear,
            state = ?self.state,
            closed = thresholds.closed,
            open = thresholds.open,
            "blink frame"
        );

        let mut trigger = None;

        if self.check_velocity_spike(ear, timestamp) {
            trigger = trigger.or(self.register(timestamp, BlinkTrigger::VelocitySpike));
        }
        if self.advance_state(ear, &thresholds) {
            trigger = trigger.or(self.register(timestamp, BlinkTrigger::StateMachine));
        }
        if self.check_rapid_drop(ear) {
            trigger = trigger.or(self.register(timestamp, BlinkTrigger::RapidDrop));
        }
        if self.check_pattern() {
            trigger = trigger.or(self.register(timestamp, BlinkTrigger::Pattern));
        }

        BlinkOutcome {
            blink_detected: trigger.is_some(),
            trigger,
            ear,
            state: self.state,
        }
    }

    /// 当前阈值：样本不足时使用下限常量
    pub fn thresholds(&self) -> BlinkThresholds {
        let c = &self.config;
        let fixed = BlinkThresholds {
            open: c.open_floor,
            closing: c.closing_floor,
            opening: c.opening_floor,
            closed: c.closed_floor,
        };
        if self.history.len() < c.adaptive_min_samples {
            return fixed;
        }

        let mut ears: Vec<f64> = self.history.iter().map(|s| s.ear).collect();
        let Some(baseline) = percentile(&mut ears, c.baseline_percentile) else {
            return fixed;
        };

        BlinkThresholds {
            open: c.open_floor.max(baseline * c.open_fraction),
            closing: c.closing_floor.max(baseline * c.closing_fraction),
            opening: c.opening_floor.max(baseline * c.opening_fraction),
            closed: c.closed_floor.max(baseline * c.closed_fraction),
        }
    }

    /// 冷却门：通过则计数并立即刷新冷却时钟
    fn register(&mut self, now: f64, trigger: BlinkTrigger) -> Option<BlinkTrigger> {
        let cooled = self
            .last_blink_at
            .map_or(true, |last| now - last > self.config.cooldown_secs);
        if !cooled {
            tracing::trace!(?trigger, "blink candidate suppressed by cooldown");
            return None;
        }
        self.blink_count += 1;
        self.last_blink_at = Some(now);
        tracing::debug!(?trigger, count = self.blink_count, "blink detected");
        Some(trigger)
    }

    fn cooldown_elapsed(&self, now: f64) -> bool {
        self.last_blink_at
            .map_or(true, |last| now - last > self.config.cooldown_secs)
    }

    /// 连续若干帧 EAR 下降速度超过阈值（仅睁眼状态）
    fn check_velocity_spike(&mut self, ear: f64, now: f64) -> bool {
        let Some(prev) = self.history.recent(1).copied() else {
            return false;
        };
        let dt = now - prev.timestamp;
        if dt <= 0.0 {
            return false;
        }

        let velocity = (prev.ear - ear) / dt;
        if velocity <= self.config.velocity_threshold || self.state != BlinkState::Open {
            self.velocity_confirmations = 0;
            return false;
        }

        self.velocity_confirmations += 1;
        tracing::trace!(velocity, confirmations = self.velocity_confirmations, "EAR velocity spike");
        if self.velocity_confirmations >= self.config.velocity_confirm_frames {
            self.velocity_confirmations = 0;
            return true;
        }
        false
    }

    /// 推进状态机，返回是否完成一次眨眼
    fn advance_state(&mut self, ear: f64, t: &BlinkThresholds) -> bool {
        let mut completed = false;
        let next = match self.state {
            BlinkState::Open if ear < t.closing => BlinkState::Closing,
            BlinkState::Open => BlinkState::Open,
            BlinkState::Closing if ear < t.closed => {
                self.closed_frames = 1;
                BlinkState::Closed
            }
            // 未完全闭合就重新睁开，放弃本次
            BlinkState::Closing if ear > t.open => BlinkState::Open,
            BlinkState::Closing => BlinkState::Closing,
            BlinkState::Closed if ear < t.closed => {
                self.closed_frames += 1;
                BlinkState::Closed
            }
            BlinkState::Closed if ear > t.opening => BlinkState::Opening,
            BlinkState::Closed => BlinkState::Closed,
            BlinkState::Opening if ear > t.open => {
                completed = self.closed_frames >= self.config.min_closed_frames;
                self.closed_frames = 0;
                BlinkState::Open
            }
            BlinkState::Opening if ear < t.closed => BlinkState::Closed,
            BlinkState::Opening => BlinkState::Opening,
        };

        if next != self.state {
            tracing::trace!(from = ?self.state, to = ?next, ear, "blink state transition");
        }
        self.state = next;
        completed
    }

    /// 与 N 帧前相比 EAR 骤降（状态机可能漏掉的极快眨眼）
    fn check_rapid_drop(&self, ear: f64) -> bool {
        let Some(earlier) = self.history.recent(self.config.rapid_drop_lookback) else {
            return false;
        };
        earlier.ear - ear > self.config.rapid_drop_delta && self.state == BlinkState::Open
    }

    /// 最近 5 个样本呈 降、降、升、升
    fn check_pattern(&self) -> bool {
        let samples: Option<Vec<f64>> = (0..5)
            .rev()
            .map(|age| self.history.recent(age).map(|s| s.ear))
            .collect();
        let Some(samples) = samples else {
            return false;
        };
        let Some(now) = self.history.recent(0).map(|s| s.timestamp) else {
            return false;
        };

        let diffs: Vec<f64> = samples.windows(2).map(|w| w[1] - w[0]).collect();
        let drop = -self.config.pattern_drop_delta;
        let rise = self.config.pattern_rise_delta;

        diffs[0] < drop
            && diffs[1] < drop
            && diffs[2] > rise
            && diffs[3] > rise
            && self.cooldown_elapsed(now)
    }
}
