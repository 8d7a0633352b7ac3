use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// 关键点索引 (MediaPipe FaceMesh refine_landmarks=true, 共 478 点)
// ---------------------------------------------------------------------------

/// 左眼 6 点轮廓：p1(外角), p2, p3(上眼睑), p4(内角), p5, p6(下眼睑)
pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
/// 右眼 6 点轮廓，排列同上
pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];

pub const LEFT_IRIS_CENTER: usize = 468;
pub const LEFT_IRIS_RING: [usize; 4] = [469, 470, 471, 472];
pub const RIGHT_IRIS_CENTER: usize = 473;
pub const RIGHT_IRIS_RING: [usize; 4] = [474, 475, 476, 477];

pub const LEFT_EYE_TOP: usize = 386;
pub const LEFT_EYE_BOTTOM: usize = 374;
pub const RIGHT_EYE_TOP: usize = 159;
pub const RIGHT_EYE_BOTTOM: usize = 145;

pub const NOSE_BRIDGE: usize = 168;
pub const CHIN: usize = 151;

pub const LEFT_INNER_EYEBROW: usize = 285;
pub const RIGHT_INNER_EYEBROW: usize = 55;
pub const LEFT_OUTER_EYEBROW: usize = 282;
pub const RIGHT_OUTER_EYEBROW: usize = 52;

pub const UPPER_LIP: usize = 13;
pub const LOWER_LIP: usize = 14;
pub const LEFT_MOUTH_CORNER: usize = 61;
pub const RIGHT_MOUTH_CORNER: usize = 291;

/// 带虹膜细化的面部关键点数量
pub const FACE_LANDMARK_COUNT: usize = 478;

// MediaPipe Pose (33 点)
pub const POSE_NOSE: usize = 0;
pub const POSE_LEFT_EAR: usize = 7;
pub const POSE_RIGHT_EAR: usize = 8;
pub const POSE_LEFT_SHOULDER: usize = 11;
pub const POSE_RIGHT_SHOULDER: usize = 12;
pub const POSE_LEFT_HIP: usize = 23;
pub const POSE_RIGHT_HIP: usize = 24;

/// 姿态分类至少需要覆盖到髋部关键点
pub const POSE_MIN_LANDMARKS: usize = POSE_RIGHT_HIP + 1;

/// 归一化图像空间中的三维点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// 可见度 (0.0-1.0)，缺省视为可见
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f64) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// 图像平面内的二维距离
    pub fn planar_distance(&self, other: &Point3) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn planar(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn sub(&self, other: &Point3) -> Point3 {
        Point3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn midpoint(&self, other: &Point3) -> Point3 {
        Point3::new(
            (self.x + other.x) / 2.0,
            (self.y + other.y) / 2.0,
            (self.z + other.z) / 2.0,
        )
    }

    pub fn is_visible(&self, min_visibility: f64) -> bool {
        self.visibility.map_or(true, |v| v >= min_visibility)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// 二维向量（注视坐标、面部局部坐标系）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(self, k: f64) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f64 {
        self.sub(other).norm()
    }

    /// 单位化，`epsilon` 防止零长度向量除零
    pub fn normalized(self, epsilon: f64) -> Vec2 {
        self.scale(1.0 / (self.norm() + epsilon))
    }

    pub fn mean(points: &[Vec2]) -> Vec2 {
        if points.is_empty() {
            return Vec2::default();
        }
        let sum = points.iter().fold(Vec2::default(), |acc, p| acc.add(*p));
        sum.scale(1.0 / points.len() as f64)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("face landmark set too small: expected at least {expected}, got {actual}")]
    FaceTooSmall { expected: usize, actual: usize },
    #[error("pose landmark set too small: expected at least {expected}, got {actual}")]
    PoseTooSmall { expected: usize, actual: usize },
    #[error("non-finite coordinate at {set} landmark {index}")]
    NonFinite { set: &'static str, index: usize },
    #[error("non-finite frame timestamp")]
    InvalidTimestamp,
}

/// 感知引擎的一次输出（尚未绑定时间戳）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub face: Option<Vec<Point3>>,
    #[serde(default)]
    pub pose: Option<Vec<Point3>>,
}

/// 单帧关键点快照，只读
///
/// 构造时完成全部校验，检测器拿到的帧保证索引安全、坐标有限。
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    timestamp: f64,
    face: Option<Vec<Point3>>,
    pose: Option<Vec<Point3>>,
}

impl LandmarkFrame {
    pub fn new(timestamp: f64, detection: Detection) -> Result<Self, FrameError> {
        if !timestamp.is_finite() {
            return Err(FrameError::InvalidTimestamp);
        }
        if let Some(face) = &detection.face {
            if face.len() < FACE_LANDMARK_COUNT {
                return Err(FrameError::FaceTooSmall {
                    expected: FACE_LANDMARK_COUNT,
                    actual: face.len(),
                });
            }
            check_finite("face", face)?;
        }
        if let Some(pose) = &detection.pose {
            if pose.len() < POSE_MIN_LANDMARKS {
                return Err(FrameError::PoseTooSmall {
                    expected: POSE_MIN_LANDMARKS,
                    actual: pose.len(),
                });
            }
            check_finite("pose", pose)?;
        }
        Ok(Self {
            timestamp,
            face: detection.face,
            pose: detection.pose,
        })
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn face(&self) -> Option<FaceLandmarks<'_>> {
        self.face.as_deref().map(FaceLandmarks)
    }

    pub fn pose(&self) -> Option<PoseLandmarks<'_>> {
        self.pose.as_deref().map(PoseLandmarks)
    }
}

fn check_finite(set: &'static str, points: &[Point3]) -> Result<(), FrameError> {
    match points.iter().position(|p| !p.is_finite()) {
        Some(index) => Err(FrameError::NonFinite { set, index }),
        None => Ok(()),
    }
}

/// 已校验的面部关键点视图
#[derive(Debug, Clone, Copy)]
pub struct FaceLandmarks<'a>(&'a [Point3]);

impl<'a> FaceLandmarks<'a> {
    pub fn point(&self, index: usize) -> Point3 {
        self.0[index]
    }

    pub fn planar(&self, index: usize) -> Vec2 {
        self.0[index].planar()
    }

    pub fn y(&self, index: usize) -> f64 {
        self.0[index].y
    }
}

/// 已校验的姿态关键点视图
#[derive(Debug, Clone, Copy)]
pub struct PoseLandmarks<'a>(&'a [Point3]);

impl<'a> PoseLandmarks<'a> {
    pub fn point(&self, index: usize) -> Point3 {
        self.0[index]
    }

    /// 可选关键点：越界或可见度不足时返回 None
    pub fn visible(&self, index: usize, min_visibility: f64) -> Option<Point3> {
        self.0
            .get(index)
            .copied()
            .filter(|p| p.is_visible(min_visibility))
    }
}

// ---------------------------------------------------------------------------
// 标签与直方图桶
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Neutral,
    Focused,
    Confused,
    Distracted,
}

impl Expression {
    pub const ALL: [Expression; 4] = [
        Expression::Neutral,
        Expression::Focused,
        Expression::Confused,
        Expression::Distracted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Focused => "focused",
            Expression::Confused => "confused",
            Expression::Distracted => "distracted",
        }
    }
}

/// 离散姿态标签，比直方图桶更细
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureLabel {
    Upright,
    LeaningForward,
    SlightForward,
    Slouching,
    LookingDown,
}

impl PostureLabel {
    pub fn bucket(&self) -> PostureBucket {
        match self {
            PostureLabel::Upright => PostureBucket::Upright,
            PostureLabel::LeaningForward
            | PostureLabel::SlightForward
            | PostureLabel::LookingDown => PostureBucket::LeaningForward,
            PostureLabel::Slouching => PostureBucket::Slouching,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostureLabel::Upright => "upright",
            PostureLabel::LeaningForward => "leaning_forward",
            PostureLabel::SlightForward => "slight_forward",
            PostureLabel::Slouching => "slouching",
            PostureLabel::LookingDown => "looking_down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureBucket {
    Upright,
    LeaningForward,
    Slouching,
    Away,
}

impl PostureBucket {
    pub const ALL: [PostureBucket; 4] = [
        PostureBucket::Upright,
        PostureBucket::LeaningForward,
        PostureBucket::Slouching,
        PostureBucket::Away,
    ];
}

/// 表情直方图，字段顺序即序列化顺序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionHistogram {
    pub neutral: u64,
    pub focused: u64,
    pub confused: u64,
    pub distracted: u64,
}

impl ExpressionHistogram {
    pub fn increment(&mut self, expression: Expression) {
        *self.slot(expression) += 1;
    }

    pub fn get(&self, expression: Expression) -> u64 {
        match expression {
            Expression::Neutral => self.neutral,
            Expression::Focused => self.focused,
            Expression::Confused => self.confused,
            Expression::Distracted => self.distracted,
        }
    }

    pub fn total(&self) -> u64 {
        self.neutral + self.focused + self.confused + self.distracted
    }

    fn slot(&mut self, expression: Expression) -> &mut u64 {
        match expression {
            Expression::Neutral => &mut self.neutral,
            Expression::Focused => &mut self.focused,
            Expression::Confused => &mut self.confused,
            Expression::Distracted => &mut self.distracted,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureHistogram {
    pub upright: u64,
    pub leaning_forward: u64,
    pub slouching: u64,
    pub away: u64,
}

impl PostureHistogram {
    pub fn increment(&mut self, bucket: PostureBucket) {
        match bucket {
            PostureBucket::Upright => self.upright += 1,
            PostureBucket::LeaningForward => self.leaning_forward += 1,
            PostureBucket::Slouching => self.slouching += 1,
            PostureBucket::Away => self.away += 1,
        }
    }

    pub fn get(&self, bucket: PostureBucket) -> u64 {
        match bucket {
            PostureBucket::Upright => self.upright,
            PostureBucket::LeaningForward => self.leaning_forward,
            PostureBucket::Slouching => self.slouching,
            PostureBucket::Away => self.away,
        }
    }
}

/// 时间序列中的单帧记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp: f64,
    pub blink_detected: bool,
    pub eye_movements: u64,
    pub posture_changes: u64,
    pub expression: Expression,
}

/// submit_frame 的返回体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub blink_count: u64,
    pub eye_movement_count: u64,
    pub posture_change_count: u64,
    pub attentiveness_score: i64,
    pub facial_expression: Expression,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// 全部落在画面中心的面部关键点，调用方再按需改写
    pub fn neutral_face() -> Vec<Point3> {
        vec![Point3::new(0.5, 0.5, 0.0); FACE_LANDMARK_COUNT]
    }

    pub fn upright_pose() -> Vec<Point3> {
        vec![Point3::new(0.5, 0.5, 0.0); 33]
    }

    /// 构造一只 EAR 精确为 `ear` 的眼睛（水平宽度 0.1）
    pub fn set_eye_ear(face: &mut [Point3], eye: &[usize; 6], center_x: f64, ear: f64) {
        let half_width = 0.05;
        let half_height = ear * 0.1 / 2.0;
        face[eye[0]] = Point3::new(center_x - half_width, 0.4, 0.0);
        face[eye[3]] = Point3::new(center_x + half_width, 0.4, 0.0);
        face[eye[1]] = Point3::new(center_x - 0.02, 0.4 - half_height, 0.0);
        face[eye[2]] = Point3::new(center_x + 0.02, 0.4 - half_height, 0.0);
        face[eye[5]] = Point3::new(center_x - 0.02, 0.4 + half_height, 0.0);
        face[eye[4]] = Point3::new(center_x + 0.02, 0.4 + half_height, 0.0);
    }

    pub fn face_with_ear(ear: f64) -> Vec<Point3> {
        let mut face = neutral_face();
        set_eye_ear(&mut face, &LEFT_EYE, 0.62, ear);
        set_eye_ear(&mut face, &RIGHT_EYE, 0.38, ear);
        face
    }

    pub fn frame(timestamp: f64, face: Option<Vec<Point3>>, pose: Option<Vec<Point3>>) -> LandmarkFrame {
        LandmarkFrame::new(timestamp, Detection { face, pose }).expect("valid frame")
    }
}
