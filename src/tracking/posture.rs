//! 姿态分类与姿态变化检测
//!
//! 特征向量 = [脊柱角, 肩部倾斜角, 头部前伸角?, 头部前伸深度?]，
//! 角度均为图像坐标系下 `atan2(y, x)`。只有前两个分量参与变化距离计算。

use crate::tracking::config::PostureConfig;
use crate::tracking::history::{percentile, RingBuffer};
use crate::tracking::types::{
    Point3, PostureBucket, PostureHistogram, PostureLabel, PoseLandmarks, POSE_LEFT_EAR,
    POSE_LEFT_HIP, POSE_LEFT_SHOULDER, POSE_NOSE, POSE_RIGHT_EAR, POSE_RIGHT_HIP,
    POSE_RIGHT_SHOULDER,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadForward {
    pub angle: f64,
    pub depth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureVector {
    pub spine_angle: f64,
    pub shoulder_tilt_angle: f64,
    pub head: Option<HeadForward>,
}

impl PostureVector {
    pub fn from_pose(pose: &PoseLandmarks<'_>, min_visibility: f64) -> Self {
        let shoulder_center = pose
            .point(POSE_LEFT_SHOULDER)
            .midpoint(&pose.point(POSE_RIGHT_SHOULDER));
        let hip_center = pose.point(POSE_LEFT_HIP).midpoint(&pose.point(POSE_RIGHT_HIP));

        let spine = shoulder_center.sub(&hip_center);
        let tilt = pose.point(POSE_LEFT_SHOULDER).sub(&pose.point(POSE_RIGHT_SHOULDER));

        let ear_center = match (
            pose.visible(POSE_LEFT_EAR, min_visibility),
            pose.visible(POSE_RIGHT_EAR, min_visibility),
        ) {
            (Some(left), Some(right)) => Some(left.midpoint(&right)),
            _ => None,
        };
        let head = ear_center
            .or_else(|| pose.visible(POSE_NOSE, min_visibility))
            .map(|anchor: Point3| {
                let v = anchor.sub(&shoulder_center);
                HeadForward {
                    angle: v.y.atan2(v.x),
                    depth: v.z,
                }
            });

        Self {
            spine_angle: spine.y.atan2(spine.x),
            shoulder_tilt_angle: tilt.y.atan2(tilt.x),
            head,
        }
    }

    /// 仅比较脊柱角与肩部倾斜角
    pub fn stable_distance(&self, other: &PostureVector) -> f64 {
        let ds = self.spine_angle - other.spine_angle;
        let dt = self.shoulder_tilt_angle - other.shoulder_tilt_angle;
        (ds * ds + dt * dt).sqrt()
    }
}

/// 按脊柱角分类的有序规则，先匹配者生效
pub struct PostureRule {
    pub label: PostureLabel,
    pub matches: fn(f64, &PostureConfig) -> bool,
}

pub const SPINE_RULES: [PostureRule; 4] = [
    PostureRule {
        label: PostureLabel::Upright,
        matches: |angle, c| angle.abs() < c.upright_band,
    },
    PostureRule {
        label: PostureLabel::LeaningForward,
        matches: |angle, c| angle < c.strong_lean_angle,
    },
    PostureRule {
        label: PostureLabel::SlightForward,
        matches: |angle, _| angle < 0.0,
    },
    PostureRule {
        label: PostureLabel::Slouching,
        matches: |_, _| true,
    },
];

pub fn classify_spine(spine_angle: f64, config: &PostureConfig) -> PostureLabel {
    SPINE_RULES
        .iter()
        .find(|rule| (rule.matches)(spine_angle, config))
        .map_or(PostureLabel::Slouching, |rule| rule.label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Label,
    Vector,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureOutcome {
    /// None 表示本帧无人
    pub label: Option<PostureLabel>,
    pub change: Option<ChangeKind>,
    pub posture_change_count: u64,
    pub threshold: f64,
}

#[derive(Debug, Clone)]
pub struct PostureClassifier {
    config: PostureConfig,
    history: RingBuffer<PostureVector>,
    diff_threshold: f64,
    last_label: Option<PostureLabel>,
    last_vector: Option<PostureVector>,
    last_change_at: Option<f64>,
    posture_change_count: u64,
}

impl PostureClassifier {
    pub fn new(config: PostureConfig) -> Self {
        let history = RingBuffer::new(config.history_size);
        let diff_threshold = config.diff_threshold_floor;
        Self {
            config,
            history,
            diff_threshold,
            last_label: None,
            last_vector: None,
            last_change_at: None,
            posture_change_count: 0,
        }
    }

    pub fn posture_change_count(&self) -> u64 {
        self.posture_change_count
    }

    pub fn last_label(&self) -> Option<PostureLabel> {
        self.last_label
    }

    pub fn diff_threshold(&self) -> f64 {
        self.diff_threshold
    }

    pub fn process(
        &mut self,
        pose: Option<PoseLandmarks<'_>>,
        timestamp: f64,
        histogram: &mut PostureHistogram,
    ) -> PostureOutcome {
        let Some(pose) = pose else {
            histogram.increment(PostureBucket::Away);
            return PostureOutcome {
                label: None,
                change: None,
                posture_change_count: self.posture_change_count,
                threshold: self.diff_threshold,
            };
        };

        let vector = PostureVector::from_pose(&pose, self.config.min_visibility);
        self.history.push(vector);
        self.adapt_threshold();

        let mut label = classify_spine(vector.spine_angle, &self.config);
        histogram.increment(label.bucket());
        if vector
            .head
            .is_some_and(|head| head.angle < self.config.looking_down_angle)
        {
            label = PostureLabel::LookingDown;
            histogram.increment(PostureBucket::LeaningForward);
        }

        tracing::trace!(
            label = label.as_str(),
            spine_angle = vector.spine_angle,
            threshold = self.diff_threshold,
            "posture classified"
        );

        let change = self.detect_change(label, &vector, timestamp);

        self.last_label = Some(label);
        self.last_vector = Some(vector);

        PostureOutcome {
            label: Some(label),
            change,
            posture_change_count: self.posture_change_count,
            threshold: self.diff_threshold,
        }
    }

    /// 样本不足时沿用上一次阈值
    fn adapt_threshold(&mut self) {
        if self.history.len() < self.config.adaptive_min_samples {
            return;
        }
        let mut diffs: Vec<f64> = self
            .history
            .pairs()
            .map(|(prev, curr)| curr.stable_distance(prev))
            .collect();
        if let Some(noise) = percentile(&mut diffs, self.config.noise_percentile) {
            self.diff_threshold = self
                .config
                .diff_threshold_floor
                .max(noise * self.config.noise_multiplier);
        }
    }

    fn detect_change(
        &mut self,
        label: PostureLabel,
        vector: &PostureVector,
        now: f64,
    ) -> Option<ChangeKind> {
        match (self.last_label, self.last_vector) {
            (Some(last), _) if last != label => {
                self.register(now).then(|| {
                    tracing::debug!(from = last.as_str(), to = label.as_str(), "posture state changed");
                    ChangeKind::Label
                })
            }
            (_, Some(last_vector)) => {
                let diff = vector.stable_distance(&last_vector);
                if diff > self.diff_threshold && self.register(now) {
                    tracing::debug!(diff, "subtle posture change detected");
                    Some(ChangeKind::Vector)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn register(&mut self, now: f64) -> bool {
        let elapsed = self
            .last_change_at
            .map_or(true, |last| now - last > self.config.debounce_secs);
        if elapsed {
            self.posture_change_count += 1;
            self.last_change_at = Some(now);
        }
        elapsed
    }
}
