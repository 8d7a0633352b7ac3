use attention_backend::tracking::types::{FACE_LANDMARK_COUNT, LEFT_EYE, RIGHT_EYE};
use attention_backend::tracking::Point3;
use serde_json::{json, Value};

pub fn neutral_face() -> Vec<Point3> {
    vec![Point3::new(0.5, 0.5, 0.0); FACE_LANDMARK_COUNT]
}

pub fn upright_pose() -> Vec<Point3> {
    vec![Point3::new(0.5, 0.5, 0.0); 33]
}

fn set_eye_ear(face: &mut [Point3], eye: &[usize; 6], center_x: f64, ear: f64) {
    let half_width = 0.05;
    let half_height = ear * 0.1 / 2.0;
    face[eye[0]] = Point3::new(center_x - half_width, 0.4, 0.0);
    face[eye[3]] = Point3::new(center_x + half_width, 0.4, 0.0);
    face[eye[1]] = Point3::new(center_x - 0.02, 0.4 - half_height, 0.0);
    face[eye[2]] = Point3::new(center_x + 0.02, 0.4 - half_height, 0.0);
    face[eye[5]] = Point3::new(center_x - 0.02, 0.4 + half_height, 0.0);
    face[eye[4]] = Point3::new(center_x + 0.02, 0.4 + half_height, 0.0);
}

/// 双眼 EAR 都精确等于 `ear` 的面部
pub fn face_with_ear(ear: f64) -> Vec<Point3> {
    let mut face = neutral_face();
    set_eye_ear(&mut face, &LEFT_EYE, 0.62, ear);
    set_eye_ear(&mut face, &RIGHT_EYE, 0.38, ear);
    face
}

pub fn landmarks_body(timestamp: f64, face: Option<Vec<Point3>>, pose: Option<Vec<Point3>>) -> Value {
    json!({ "face": face, "pose": pose, "timestamp": timestamp })
}

/// 一次完整眨眼：睁 → 闭 → 睁，约 30fps
pub const BLINK_EARS: [f64; 7] = [0.30, 0.30, 0.30, 0.15, 0.15, 0.30, 0.30];
