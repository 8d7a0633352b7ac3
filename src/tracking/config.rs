use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlinkConfig {
    /// EAR 历史窗口容量
    pub history_size: usize,
    /// 启用自适应阈值所需的最少样本数
    pub adaptive_min_samples: usize,
    /// 睁眼基线取历史 EAR 的分位数
    pub baseline_percentile: f64,
    pub open_floor: f64,
    pub open_fraction: f64,
    pub closing_floor: f64,
    pub closing_fraction: f64,
    pub opening_floor: f64,
    pub opening_fraction: f64,
    pub closed_floor: f64,
    pub closed_fraction: f64,
    /// 两次计数之间的最小间隔（秒）
    pub cooldown_secs: f64,
    /// EAR 下降速度阈值（每秒）
    pub velocity_threshold: f64,
    /// 速度尖峰需要连续确认的帧数
    pub velocity_confirm_frames: u32,
    /// 快速下降检测：与 N 帧前相比的 EAR 降幅
    pub rapid_drop_delta: f64,
    pub rapid_drop_lookback: usize,
    /// 模式匹配：先降后升的单步幅度
    pub pattern_drop_delta: f64,
    pub pattern_rise_delta: f64,
    /// 状态机完成一次眨眼所需的最少闭眼帧数
    pub min_closed_frames: u32,
    /// 水平眼宽不大于该值时 EAR 记为 0
    pub degenerate_width: f64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            history_size: 10,
            adaptive_min_samples: 5,
            baseline_percentile: 0.8,
            open_floor: 0.22,
            open_fraction: 0.85,
            closing_floor: 0.19,
            closing_fraction: 0.70,
            opening_floor: 0.18,
            opening_fraction: 0.65,
            closed_floor: 0.16,
            closed_fraction: 0.60,
            cooldown_secs: 0.2,
            velocity_threshold: 1.5,
            velocity_confirm_frames: 2,
            rapid_drop_delta: 0.08,
            rapid_drop_lookback: 2,
            pattern_drop_delta: 0.03,
            pattern_rise_delta: 0.02,
            min_closed_frames: 1,
            degenerate_width: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GazeConfig {
    pub history_size: usize,
    pub adaptive_min_samples: usize,
    /// 噪声水平取相邻位移的分位数
    pub noise_percentile: f64,
    pub noise_multiplier: f64,
    pub threshold_floor: f64,
    /// 瞳孔中心：中心点权重，其余由虹膜外圈四点均分
    pub pupil_center_weight: f64,
    pub debounce_secs: f64,
    /// 上一步位移需超过 阈值 × 该系数 才算持续运动
    pub sustained_fraction: f64,
    /// 扫视速度阈值（面部坐标单位/秒）
    pub saccade_velocity: f64,
    /// 最新速度须超过上一速度的倍数
    pub saccade_ratio: f64,
    /// 参与扫视判断的最近样本对数
    pub saccade_pairs: usize,
    pub epsilon: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            history_size: 10,
            adaptive_min_samples: 5,
            noise_percentile: 0.6,
            noise_multiplier: 2.2,
            threshold_floor: 0.01,
            pupil_center_weight: 0.6,
            debounce_secs: 0.3,
            sustained_fraction: 0.5,
            saccade_velocity: 0.5,
            saccade_ratio: 2.0,
            saccade_pairs: 3,
            epsilon: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostureConfig {
    pub history_size: usize,
    pub adaptive_min_samples: usize,
    pub noise_percentile: f64,
    pub noise_multiplier: f64,
    pub diff_threshold_floor: f64,
    /// |spine_angle| 小于该值视为端坐
    pub upright_band: f64,
    /// spine_angle 小于该值视为明显前倾
    pub strong_lean_angle: f64,
    /// 头部前伸角小于该值时判定为低头
    pub looking_down_angle: f64,
    pub debounce_secs: f64,
    /// 耳朵/鼻子可见度低于该值视为不可用
    pub min_visibility: f64,
}

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            history_size: 15,
            adaptive_min_samples: 7,
            noise_percentile: 0.7,
            noise_multiplier: 1.5,
            diff_threshold_floor: 0.05,
            upright_band: 0.12,
            strong_lean_angle: -0.3,
            looking_down_angle: -0.25,
            debounce_secs: 0.5,
            min_visibility: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpressionConfig {
    pub mouth_open: f64,
    pub smile: f64,
    pub eyebrow_raise: f64,
    pub eyebrow_furrow: f64,
    pub squint_openness: f64,
    /// 累计眼动次数超过该值即判定分心
    pub eye_movement_limit: u64,
    pub tight_lip_mouth: f64,
    pub tight_lip_smile: f64,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            mouth_open: 0.04,
            smile: 0.01,
            eyebrow_raise: 0.025,
            eyebrow_furrow: 0.01,
            squint_openness: 0.025,
            eye_movement_limit: 10,
            tight_lip_mouth: 0.015,
            tight_lip_smile: 0.005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    // --- 逐帧快速评分 ---
    pub frame_base: f64,
    pub frame_blink_penalty: f64,
    pub frame_eye_movement_limit: u64,
    pub frame_eye_movement_penalty: f64,
    pub frame_posture_change_limit: u64,
    pub frame_posture_penalty: f64,
    pub frame_distracted_penalty: f64,

    // --- 会话综合评分 ---
    /// 没有任何帧时直接返回的默认分
    pub empty_session_score: f64,
    pub focus_weight: f64,
    pub posture_weight: f64,
    /// 前倾帧按该比例计入良好姿态
    pub leaning_forward_credit: f64,
    pub min_duration_secs: f64,
    pub normal_blink_min: f64,
    pub normal_blink_max: f64,
    pub low_blink_base_penalty: f64,
    pub low_blink_slope: f64,
    pub high_blink_slope: f64,
    pub blink_penalty_cap: f64,
    pub normal_eye_movement_max: f64,
    pub eye_movement_slope: f64,
    pub eye_movement_penalty_cap: f64,
    pub normal_posture_change_max: f64,
    pub posture_change_slope: f64,
    pub posture_penalty_cap: f64,
    pub distraction_slope: f64,
    pub distraction_penalty_cap: f64,
    pub score_floor: f64,
    pub short_session_secs: f64,
    pub short_session_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            frame_base: 90.0,
            frame_blink_penalty: 5.0,
            frame_eye_movement_limit: 10,
            frame_eye_movement_penalty: 10.0,
            frame_posture_change_limit: 5,
            frame_posture_penalty: 8.0,
            frame_distracted_penalty: 15.0,
            empty_session_score: 75.0,
            focus_weight: 0.7,
            posture_weight: 0.3,
            leaning_forward_credit: 0.7,
            min_duration_secs: 1.0,
            normal_blink_min: 8.0,
            normal_blink_max: 20.0,
            low_blink_base_penalty: 3.0,
            low_blink_slope: 0.8,
            high_blink_slope: 0.7,
            blink_penalty_cap: 15.0,
            normal_eye_movement_max: 5.0,
            eye_movement_slope: 2.0,
            eye_movement_penalty_cap: 20.0,
            normal_posture_change_max: 3.0,
            posture_change_slope: 3.0,
            posture_penalty_cap: 10.0,
            distraction_slope: 0.3,
            distraction_penalty_cap: 25.0,
            score_floor: 30.0,
            short_session_secs: 10.0,
            short_session_floor: 60.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingConfig {
    #[serde(default)]
    pub blink: BlinkConfig,
    #[serde(default)]
    pub gaze: GazeConfig,
    #[serde(default)]
    pub posture: PostureConfig,
    #[serde(default)]
    pub expression: ExpressionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl TrackingConfig {
    /// 读取 JSON 覆盖文件；未提供路径时使用默认值
    ///
    /// 文件不可读、格式错误或校验失败时记录错误并回退默认配置。
    pub fn load(path: Option<&str>) -> Self {
        let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
            return Self::default();
        };

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<TrackingConfig>(&raw).map_err(|e| e.to_string()))
            .and_then(|cfg| cfg.validate().map(|_| cfg));

        match parsed {
            Ok(cfg) => {
                tracing::info!(path, "Tracking config loaded");
                cfg
            }
            Err(e) => {
                tracing::error!(path, error = %e, "Invalid tracking config, using defaults");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let b = &self.blink;
        // closed < opening <= closing < open，对下限和比例都成立才能保证取 max 后顺序不变
        if !(b.closed_floor < b.opening_floor
            && b.opening_floor <= b.closing_floor
            && b.closing_floor < b.open_floor)
        {
            return Err("blink floors must satisfy closed < opening <= closing < open".into());
        }
        if !(b.closed_fraction < b.opening_fraction
            && b.opening_fraction <= b.closing_fraction
            && b.closing_fraction < b.open_fraction)
        {
            return Err("blink fractions must satisfy closed < opening <= closing < open".into());
        }
        if b.history_size < 5 {
            return Err("blink.historySize must be at least 5".into());
        }
        if b.adaptive_min_samples == 0 {
            return Err("blink.adaptiveMinSamples must be positive".into());
        }
        if b.rapid_drop_lookback == 0 {
            return Err("blink.rapidDropLookback must be positive".into());
        }

        let g = &self.gaze;
        if g.history_size < 3 {
            return Err("gaze.historySize must be at least 3".into());
        }
        if g.adaptive_min_samples < 2 {
            return Err("gaze.adaptiveMinSamples must be at least 2".into());
        }
        if !(0.0..=1.0).contains(&g.pupil_center_weight) {
            return Err("gaze.pupilCenterWeight must be within [0, 1]".into());
        }
        if g.threshold_floor <= 0.0 || g.epsilon <= 0.0 {
            return Err("gaze.thresholdFloor and gaze.epsilon must be positive".into());
        }
        if g.saccade_pairs < 2 {
            return Err("gaze.saccadePairs must be at least 2".into());
        }

        let p = &self.posture;
        if p.history_size < 2 {
            return Err("posture.historySize must be at least 2".into());
        }
        if p.adaptive_min_samples < 2 {
            return Err("posture.adaptiveMinSamples must be at least 2".into());
        }
        if p.diff_threshold_floor <= 0.0 {
            return Err("posture.diffThresholdFloor must be positive".into());
        }
        if p.strong_lean_angle >= 0.0 {
            return Err("posture.strongLeanAngle must be negative".into());
        }

        // 同一帧内多条检测路径共用这些时钟，非正值会让后一条路径绕过去重
        for (name, value) in [
            ("blink.cooldownSecs", b.cooldown_secs),
            ("gaze.debounceSecs", g.debounce_secs),
            ("posture.debounceSecs", p.debounce_secs),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(format!("{name} must be positive"));
            }
        }

        for (name, value) in [
            ("blink.baselinePercentile", b.baseline_percentile),
            ("gaze.noisePercentile", g.noise_percentile),
            ("posture.noisePercentile", p.noise_percentile),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1]"));
            }
        }

        let s = &self.scoring;
        if s.min_duration_secs <= 0.0 {
            return Err("scoring.minDurationSecs must be positive".into());
        }
        if s.normal_blink_min > s.normal_blink_max {
            return Err("scoring.normalBlinkMin must not exceed normalBlinkMax".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrackingConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_blink_floors() {
        let mut cfg = TrackingConfig::default();
        cfg.blink.closed_floor = 0.2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_percentile() {
        let mut cfg = TrackingConfig::default();
        cfg.gaze.noise_percentile = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("gaze.noisePercentile"));
    }

    #[test]
    fn rejects_non_positive_debounce() {
        for name in ["blink.cooldownSecs", "gaze.debounceSecs", "posture.debounceSecs"] {
            for value in [0.0, -1.0, f64::NAN] {
                let mut cfg = TrackingConfig::default();
                match name {
                    "blink.cooldownSecs" => cfg.blink.cooldown_secs = value,
                    "gaze.debounceSecs" => cfg.gaze.debounce_secs = value,
                    _ => cfg.posture.debounce_secs = value,
                }
                let err = cfg.validate().unwrap_err();
                assert!(err.contains(name), "{name}={value}: {err}");
            }
        }
    }

    #[test]
    fn history_errors_name_the_failing_field() {
        let mut cfg = TrackingConfig::default();
        cfg.gaze.adaptive_min_samples = 1;
        assert!(cfg.validate().unwrap_err().contains("gaze.adaptiveMinSamples"));

        let mut cfg = TrackingConfig::default();
        cfg.gaze.history_size = 2;
        assert!(cfg.validate().unwrap_err().contains("gaze.historySize"));

        let mut cfg = TrackingConfig::default();
        cfg.blink.adaptive_min_samples = 0;
        assert!(cfg.validate().unwrap_err().contains("blink.adaptiveMinSamples"));

        let mut cfg = TrackingConfig::default();
        cfg.posture.adaptive_min_samples = 1;
        assert!(cfg.validate().unwrap_err().contains("posture.adaptiveMinSamples"));
    }

    #[test]
    fn single_field_override_keeps_section_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "blink": {{ "cooldownSecs": 0.3 }}, "posture": {{ "debounceSecs": 1.0 }} }}"#
        )
        .unwrap();

        let cfg = TrackingConfig::load(file.path().to_str());
        assert_eq!(cfg.blink.cooldown_secs, 0.3);
        assert_eq!(cfg.blink.history_size, 10);
        assert_eq!(cfg.blink.open_floor, 0.22);
        assert_eq!(cfg.posture.debounce_secs, 1.0);
        assert_eq!(cfg.posture.history_size, 15);
        assert_eq!(cfg.gaze.debounce_secs, 0.3);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "blink": {{
                "historySize": 12, "adaptiveMinSamples": 5, "baselinePercentile": 0.8,
                "openFloor": 0.22, "openFraction": 0.85, "closingFloor": 0.19,
                "closingFraction": 0.70, "openingFloor": 0.18, "openingFraction": 0.65,
                "closedFloor": 0.16, "closedFraction": 0.60, "cooldownSecs": 0.25,
                "velocityThreshold": 1.5, "velocityConfirmFrames": 2, "rapidDropDelta": 0.08,
                "rapidDropLookback": 2, "patternDropDelta": 0.03, "patternRiseDelta": 0.02,
                "minClosedFrames": 1
            }} }}"#
        )
        .unwrap();

        let cfg = TrackingConfig::load(file.path().to_str());
        assert_eq!(cfg.blink.history_size, 12);
        assert_eq!(cfg.blink.cooldown_secs, 0.25);
        assert_eq!(cfg.posture.history_size, 15);
        assert_eq!(cfg.scoring.empty_session_score, 75.0);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").unwrap();
        let cfg = TrackingConfig::load(file.path().to_str());
        assert_eq!(cfg.blink.history_size, 10);
    }

    #[test]
    fn missing_path_uses_defaults() {
        let cfg = TrackingConfig::load(None);
        assert_eq!(cfg.gaze.debounce_secs, 0.3);
        let cfg = TrackingConfig::load(Some("   "));
        assert_eq!(cfg.posture.debounce_secs, 0.5);
    }
}
