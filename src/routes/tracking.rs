use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::extractors::{JsonBody, SessionKey};
use crate::perception::{FramePayload, PerceptionError};
use crate::response::AppError;
use crate::state::AppState;
use crate::tracking::{Detection, FrameMetrics, LandmarkFrame, Point3, SessionResults};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process_frame", post(process_frame))
        .route("/process_landmarks", post(process_landmarks))
        .route("/get_tracking_results", get(get_tracking_results))
        .route("/reset_tracking", post(reset_tracking))
}

#[derive(Debug, Deserialize)]
struct ProcessFrameRequest {
    frame: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessLandmarksRequest {
    #[serde(default)]
    face: Option<Vec<Point3>>,
    #[serde(default)]
    pose: Option<Vec<Point3>>,
    /// 秒；缺省时使用服务端接收时间
    timestamp: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    status: &'static str,
}

fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

async fn process_frame(
    State(state): State<AppState>,
    session: SessionKey,
    JsonBody(req): JsonBody<ProcessFrameRequest>,
) -> Result<Json<FrameMetrics>, AppError> {
    let raw = req
        .frame
        .ok_or_else(|| AppError::bad_request("MISSING_FRAME", "No frame data provided"))?;
    let payload = FramePayload::parse(&raw)?;

    let timeout = Duration::from_secs(state.config().perception.timeout_secs.max(1));
    let detection = tokio::time::timeout(timeout, state.perception().detect(&payload))
        .await
        .map_err(|_| PerceptionError::Timeout)??;

    // 检测结果先校验成帧，失败时会话状态保持不变
    let frame = LandmarkFrame::new(now_secs(), detection)
        .map_err(|e| PerceptionError::InvalidResponse(e.to_string()))?;

    tracing::debug!(
        bytes = payload.decoded_len(),
        face = frame.face().is_some(),
        pose = frame.pose().is_some(),
        "frame detected"
    );

    let metrics = state
        .sessions()
        .process_frame(session.as_str(), &frame)
        .await?;
    Ok(Json(metrics))
}

async fn process_landmarks(
    State(state): State<AppState>,
    session: SessionKey,
    JsonBody(req): JsonBody<ProcessLandmarksRequest>,
) -> Result<Json<FrameMetrics>, AppError> {
    let frame = LandmarkFrame::new(
        req.timestamp.unwrap_or_else(now_secs),
        Detection {
            face: req.face,
            pose: req.pose,
        },
    )?;
    let metrics = state
        .sessions()
        .process_frame(session.as_str(), &frame)
        .await?;
    Ok(Json(metrics))
}

async fn get_tracking_results(
    State(state): State<AppState>,
    session: SessionKey,
) -> Result<Json<SessionResults>, AppError> {
    let results = state.sessions().results(session.as_str()).await?;
    Ok(Json(results))
}

async fn reset_tracking(State(state): State<AppState>, session: SessionKey) -> Json<ResetResponse> {
    state.sessions().reset(session.as_str()).await;
    Json(ResetResponse {
        status: "Tracking reset successfully",
    })
}
