use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::perception::{FramePayload, PerceptionError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/detailed_health", get(detailed_health))
}

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "Tracking service is running" }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// 组件探测：用空白图跑一次感知引擎
pub async fn detailed_health(State(state): State<AppState>) -> impl IntoResponse {
    let timeout = Duration::from_secs(state.config().perception.timeout_secs.max(1));
    let probe = tokio::time::timeout(timeout, state.perception().detect(&FramePayload::blank()))
        .await
        .unwrap_or(Err(PerceptionError::Timeout));

    match probe {
        Ok(_) => {
            let stats = state.sessions().stats().await;
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "online",
                    "components": {
                        "server": "ok",
                        "perception": "ok",
                        "engine": state.perception().name(),
                        "tracking": "ok",
                    },
                    "sessions": {
                        "active": stats.active_sessions,
                        "busy": stats.busy_sessions,
                    },
                    "uptime": state.uptime_secs(),
                })),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Health check error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "degraded",
                    "error": e.to_string(),
                    "uptime": state.uptime_secs(),
                })),
            )
        }
    }
}
