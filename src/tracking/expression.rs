//! 表情分类（逐帧无状态）
//!
//! 图像坐标 y 轴向下，所以 "眉毛到眼睛距离" 等差值的符号与直觉相反，
//! 规则阈值按这一约定给出。

use crate::tracking::config::ExpressionConfig;
use crate::tracking::types::{
    Expression, ExpressionHistogram, FaceLandmarks, LEFT_EYE_BOTTOM, LEFT_EYE_TOP,
    LEFT_INNER_EYEBROW, LEFT_MOUTH_CORNER, LEFT_OUTER_EYEBROW, LOWER_LIP, RIGHT_EYE_BOTTOM,
    RIGHT_EYE_TOP, RIGHT_INNER_EYEBROW, RIGHT_MOUTH_CORNER, RIGHT_OUTER_EYEBROW, UPPER_LIP,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpressionFeatures {
    pub eyebrow_to_eye: f64,
    pub eyebrow_furrow: f64,
    pub mouth_distance: f64,
    pub smile: f64,
    pub eye_openness: f64,
}

impl ExpressionFeatures {
    pub fn from_face(face: &FaceLandmarks<'_>) -> Self {
        let left_inner = face.y(LEFT_INNER_EYEBROW);
        let right_inner = face.y(RIGHT_INNER_EYEBROW);
        let left_outer = face.y(LEFT_OUTER_EYEBROW);
        let right_outer = face.y(RIGHT_OUTER_EYEBROW);

        // 眉毛与对侧索引的上眼睑配对
        let eyebrow_to_eye =
            ((left_inner - face.y(RIGHT_EYE_TOP)) + (right_inner - face.y(LEFT_EYE_TOP))) / 2.0;
        let eyebrow_furrow = ((left_inner - left_outer) - (right_inner - right_outer)).abs();

        let upper_lip = face.y(UPPER_LIP);
        let mouth_distance = (upper_lip - face.y(LOWER_LIP)).abs();
        let smile = ((face.y(LEFT_MOUTH_CORNER) - upper_lip)
            + (face.y(RIGHT_MOUTH_CORNER) - upper_lip))
            / 2.0;

        let eye_openness = ((face.y(RIGHT_EYE_TOP) - face.y(RIGHT_EYE_BOTTOM)).abs()
            + (face.y(LEFT_EYE_TOP) - face.y(LEFT_EYE_BOTTOM)).abs())
            / 2.0;

        Self {
            eyebrow_to_eye,
            eyebrow_furrow,
            mouth_distance,
            smile,
            eye_openness,
        }
    }
}

/// 规则输入：面部特征 + 会话累计眼动次数
#[derive(Debug, Clone, Copy)]
pub struct ExpressionInput {
    pub features: ExpressionFeatures,
    pub eye_movement_count: u64,
}

pub struct ExpressionRule {
    pub name: &'static str,
    pub label: Expression,
    pub matches: fn(&ExpressionInput, &ExpressionConfig) -> bool,
}

/// 有序规则表，先匹配者生效；全部不匹配时为 neutral
pub const EXPRESSION_RULES: [ExpressionRule; 4] = [
    ExpressionRule {
        name: "open_mouth_smile",
        label: Expression::Focused,
        matches: |i, c| i.features.mouth_distance > c.mouth_open && i.features.smile > c.smile,
    },
    ExpressionRule {
        name: "open_mouth",
        label: Expression::Confused,
        matches: |i, c| i.features.mouth_distance > c.mouth_open,
    },
    ExpressionRule {
        name: "concentration",
        label: Expression::Focused,
        matches: |i, c| {
            i.features.eyebrow_to_eye > c.eyebrow_raise
                || (i.features.eyebrow_furrow > c.eyebrow_furrow
                    && i.features.eye_openness < c.squint_openness)
        },
    },
    ExpressionRule {
        name: "distraction",
        label: Expression::Distracted,
        matches: |i, c| {
            i.eye_movement_count > c.eye_movement_limit
                || (i.features.mouth_distance < c.tight_lip_mouth
                    && i.features.smile < c.tight_lip_smile)
        },
    },
];

#[derive(Debug, Clone, Default)]
pub struct ExpressionClassifier {
    config: ExpressionConfig,
}

impl ExpressionClassifier {
    pub fn new(config: ExpressionConfig) -> Self {
        Self { config }
    }

    pub fn label(&self, input: &ExpressionInput) -> Expression {
        EXPRESSION_RULES
            .iter()
            .find(|rule| (rule.matches)(input, &self.config))
            .map_or(Expression::Neutral, |rule| {
                tracing::trace!(rule = rule.name, label = rule.label.as_str(), "expression rule matched");
                rule.label
            })
    }

    /// 分类并向直方图记一次
    pub fn classify(
        &self,
        face: &FaceLandmarks<'_>,
        eye_movement_count: u64,
        histogram: &mut ExpressionHistogram,
    ) -> Expression {
        let input = ExpressionInput {
            features: ExpressionFeatures::from_face(face),
            eye_movement_count,
        };
        let label = self.label(&input);
        histogram.increment(label);
        label
    }
}
