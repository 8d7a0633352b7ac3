use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::perception::PerceptionError;
use crate::tracking::{FrameError, StoreError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    fn operational(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn frame_decode(message: &str) -> Self {
        Self::bad_request("FRAME_DECODE_ERROR", message)
    }

    pub fn invalid_landmarks(message: &str) -> Self {
        Self::bad_request("INVALID_LANDMARKS", message)
    }

    pub fn session_limit(message: &str) -> Self {
        Self::operational(StatusCode::TOO_MANY_REQUESTS, "SESSION_LIMIT", message)
    }

    pub fn payload_too_large(message: &str) -> Self {
        Self::operational(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", message)
    }

    pub fn perception_unavailable(message: &str) -> Self {
        Self::operational(
            StatusCode::SERVICE_UNAVAILABLE,
            "PERCEPTION_UNAVAILABLE",
            message,
        )
    }

    pub fn perception_timeout(message: &str) -> Self {
        Self::operational(StatusCode::GATEWAY_TIMEOUT, "PERCEPTION_TIMEOUT", message)
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "服务器内部错误".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

impl From<FrameError> for AppError {
    fn from(value: FrameError) -> Self {
        AppError::invalid_landmarks(&value.to_string())
    }
}

// 感知错误映射：
// - Decode -> 400（客户端图像问题，消息可暴露）
// - Disabled / Network / Upstream -> 503
// - Timeout -> 504
// - InvalidResponse -> 500（引擎契约被破坏，消息不外露）
impl From<PerceptionError> for AppError {
    fn from(value: PerceptionError) -> Self {
        match &value {
            PerceptionError::Decode(msg) => AppError::frame_decode(msg),
            PerceptionError::Timeout => AppError::perception_timeout(&value.to_string()),
            PerceptionError::Disabled
            | PerceptionError::Network(_)
            | PerceptionError::Upstream { .. } => {
                AppError::perception_unavailable(&value.to_string())
            }
            PerceptionError::InvalidResponse(_) => AppError::internal(&value.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::SessionLimit { .. } => AppError::session_limit(&value.to_string()),
            StoreError::Serialize(_) => AppError::internal(&value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn internal_error_is_redacted() {
        let (status, json) = body_json(AppError::internal("engine crash")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], "服务器内部错误");
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn decode_error_keeps_message() {
        let err: AppError = PerceptionError::Decode("frame is not a data URL".into()).into();
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "FRAME_DECODE_ERROR");
        assert_eq!(json["message"], "frame is not a data URL");
    }

    #[tokio::test]
    async fn perception_errors_map_to_gateway_statuses() {
        let (status, json) = body_json(PerceptionError::Timeout.into()).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["code"], "PERCEPTION_TIMEOUT");

        let (status, _) = body_json(PerceptionError::Disabled.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let upstream = PerceptionError::Upstream {
            status: 502,
            message: "bad gateway".into(),
        };
        let (status, json) = body_json(upstream.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], "PERCEPTION_UNAVAILABLE");
    }

    #[tokio::test]
    async fn invalid_landmarks_and_session_limit() {
        let err: AppError = FrameError::InvalidTimestamp.into();
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "INVALID_LANDMARKS");

        let err: AppError = StoreError::SessionLimit { max: 4 }.into();
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["code"], "SESSION_LIMIT");
    }
}
