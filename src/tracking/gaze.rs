//! 眼动检测模块
//!
//! 瞳孔位置按眼眶尺寸归一化后投影到面部局部坐标系（鼻梁-下巴为纵轴，
//! 两外眼角连线为横轴），得到与头部转动无关的二维注视坐标。
//! 主判定看相邻样本位移是否超过自适应阈值且上一步也在运动；
//! 扫视判定看最新速度是否出现尖峰。两条路径共用一个去抖时钟。

use crate::tracking::config::GazeConfig;
use crate::tracking::history::{percentile, RingBuffer};
use crate::tracking::types::{
    FaceLandmarks, Vec2, CHIN, LEFT_EYE, LEFT_EYE_BOTTOM, LEFT_EYE_TOP, LEFT_IRIS_CENTER,
    LEFT_IRIS_RING, NOSE_BRIDGE, RIGHT_EYE, RIGHT_EYE_BOTTOM, RIGHT_EYE_TOP, RIGHT_IRIS_CENTER,
    RIGHT_IRIS_RING,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeSample {
    pub position: Vec2,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind {
    Sustained,
    Saccade,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeOutcome {
    pub gaze: Vec2,
    pub threshold: f64,
    pub movement: Option<MovementKind>,
    pub eye_movement_count: u64,
}

struct EyeGeometry {
    center: usize,
    ring: [usize; 4],
    corner_a: usize,
    corner_b: usize,
    top: usize,
    bottom: usize,
}

const LEFT: EyeGeometry = EyeGeometry {
    center: LEFT_IRIS_CENTER,
    ring: LEFT_IRIS_RING,
    corner_a: LEFT_EYE[3],
    corner_b: LEFT_EYE[0],
    top: LEFT_EYE_TOP,
    bottom: LEFT_EYE_BOTTOM,
};

const RIGHT: EyeGeometry = EyeGeometry {
    center: RIGHT_IRIS_CENTER,
    ring: RIGHT_IRIS_RING,
    corner_a: RIGHT_EYE[0],
    corner_b: RIGHT_EYE[3],
    top: RIGHT_EYE_TOP,
    bottom: RIGHT_EYE_BOTTOM,
};

/// 单眼归一化注视向量
fn eye_gaze(face: &FaceLandmarks<'_>, eye: &EyeGeometry, config: &GazeConfig) -> Vec2 {
    let ring: Vec<Vec2> = eye.ring.iter().map(|&i| face.planar(i)).collect();
    let w = config.pupil_center_weight;
    let pupil = face
        .planar(eye.center)
        .scale(w)
        .add(Vec2::mean(&ring).scale(1.0 - w));

    let corner_a = face.planar(eye.corner_a);
    let corner_b = face.planar(eye.corner_b);
    let top = face.planar(eye.top);
    let bottom = face.planar(eye.bottom);

    let width = corner_b.distance(corner_a);
    let height = top.distance(bottom);
    let size = (width * height).sqrt();

    let box_center = Vec2::mean(&[corner_a, corner_b, top, bottom]);
    pupil.sub(box_center).scale(1.0 / (size + config.epsilon))
}

/// 双眼平均注视向量在面部局部坐标系中的坐标
pub fn face_local_gaze(face: &FaceLandmarks<'_>, config: &GazeConfig) -> Vec2 {
    let gaze = eye_gaze(face, &LEFT, config)
        .add(eye_gaze(face, &RIGHT, config))
        .scale(0.5);

    let vertical = face
        .planar(NOSE_BRIDGE)
        .sub(face.planar(CHIN))
        .normalized(config.epsilon);
    let horizontal = face
        .planar(RIGHT_EYE[0])
        .sub(face.planar(LEFT_EYE[3]))
        .normalized(config.epsilon);

    Vec2::new(gaze.dot(horizontal), gaze.dot(vertical))
}

#[derive(Debug, Clone)]
pub struct GazeMovementDetector {
    config: GazeConfig,
    history: RingBuffer<GazeSample>,
    last_movement_at: Option<f64>,
    eye_movement_count: u64,
}

impl GazeMovementDetector {
    pub fn new(config: GazeConfig) -> Self {
        let history = RingBuffer::new(config.history_size);
        Self {
            config,
            history,
            last_movement_at: None,
            eye_movement_count: 0,
        }
    }

    pub fn eye_movement_count(&self) -> u64 {
        self.eye_movement_count
    }

    pub fn process(&mut self, face: &FaceLandmarks<'_>, timestamp: f64) -> GazeOutcome {
        let gaze = face_local_gaze(face, &self.config);
        self.process_gaze(gaze, timestamp)
    }

    pub fn process_gaze(&mut self, gaze: Vec2, timestamp: f64) -> GazeOutcome {
        self.history.push(GazeSample {
            position: gaze,
            timestamp,
        });
        let threshold = self.threshold();

        let mut movement = None;
        if self.sustained_movement(threshold) && self.register(timestamp) {
            movement = Some(MovementKind::Sustained);
        }
        if self.saccade() && self.register(timestamp) {
            movement = Some(MovementKind::Saccade);
        }

        GazeOutcome {
            gaze,
            threshold,
            movement,
            eye_movement_count: self.eye_movement_count,
        }
    }

    /// 自适应位移阈值：相邻位移的噪声分位数 × 系数，不低于下限
    pub fn threshold(&self) -> f64 {
        let c = &self.config;
        if self.history.len() < c.adaptive_min_samples {
            return c.threshold_floor;
        }
        let mut movements: Vec<f64> = self
            .history
            .pairs()
            .map(|(a, b)| b.position.distance(a.position))
            .collect();
        percentile(&mut movements, c.noise_percentile)
            .map_or(c.threshold_floor, |noise| {
                c.threshold_floor.max(noise * c.noise_multiplier)
            })
    }

    fn register(&mut self, now: f64) -> bool {
        let elapsed = self
            .last_movement_at
            .map_or(true, |last| now - last > self.config.debounce_secs);
        if !elapsed {
            return false;
        }
        self.eye_movement_count += 1;
        self.last_movement_at = Some(now);
        tracing::debug!(count = self.eye_movement_count, "eye movement detected");
        true
    }

    fn displacement(&self, newer_age: usize) -> Option<f64> {
        let newer = self.history.recent(newer_age)?;
        let older = self.history.recent(newer_age + 1)?;
        Some(newer.position.distance(older.position))
    }

    /// 本步位移超过阈值，且上一步位移超过阈值的一半
    fn sustained_movement(&self, threshold: f64) -> bool {
        let (Some(current), Some(previous)) = (self.displacement(0), self.displacement(1)) else {
            return false;
        };
        tracing::trace!(distance = current, threshold, "gaze displacement");
        current > threshold && previous > threshold * self.config.sustained_fraction
    }

    /// 最新速度超过阈值且是上一速度的数倍
    fn saccade(&self) -> bool {
        if self.history.len() <= self.config.saccade_pairs {
            return false;
        }
        let velocities: Vec<f64> = (0..self.config.saccade_pairs)
            .filter_map(|age| {
                let newer = self.history.recent(age)?;
                let older = self.history.recent(age + 1)?;
                let dt = newer.timestamp - older.timestamp;
                (dt > 0.0).then(|| newer.position.distance(older.position) / dt)
            })
            .collect();

        velocities.len() >= 2
            && velocities[0] > self.config.saccade_velocity
            && velocities[0] > self.config.saccade_ratio * velocities[1]
    }
}
