use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{PerceptionConfig, PerceptionMode};
use crate::perception::{FramePayload, PerceptionEngine, PerceptionError};
use crate::tracking::Detection;

#[derive(Debug, Clone)]
pub struct PerceptionClient {
    config: PerceptionConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    frame: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    #[serde(default, alias = "error")]
    message: Option<String>,
}

impl PerceptionClient {
    pub fn new(config: &PerceptionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    /// 启动时检查：remote 模式必须配置 URL
    pub fn validate_config(config: &PerceptionConfig) -> Result<(), String> {
        if config.mode == PerceptionMode::Remote && config.url.trim().is_empty() {
            return Err("PERCEPTION_MODE=remote requires PERCEPTION_URL".to_string());
        }
        Ok(())
    }

    pub fn mode(&self) -> PerceptionMode {
        self.config.mode
    }

    async fn detect_remote(&self, frame: &FramePayload) -> Result<Detection, PerceptionError> {
        let mut request = self.client.post(&self.config.url).json(&DetectRequest {
            frame: frame.data_url(),
        });
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<Detection>()
                .await
                .map_err(|e| PerceptionError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<UpstreamError>(&body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(body);

        match status.as_u16() {
            400 | 415 | 422 => Err(PerceptionError::Decode(message)),
            code => Err(PerceptionError::Upstream {
                status: code,
                message,
            }),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> PerceptionError {
    if err.is_timeout() {
        PerceptionError::Timeout
    } else {
        PerceptionError::Network(err.to_string())
    }
}

#[axum::async_trait]
impl PerceptionEngine for PerceptionClient {
    fn name(&self) -> &str {
        self.config.mode.as_str()
    }

    async fn detect(&self, frame: &FramePayload) -> Result<Detection, PerceptionError> {
        match self.config.mode {
            PerceptionMode::Disabled => Err(PerceptionError::Disabled),
            PerceptionMode::Mock => Ok(Detection::default()),
            PerceptionMode::Remote => {
                let started = std::time::Instant::now();
                let result = self.detect_remote(frame).await;
                tracing::debug!(
                    latency_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "perception request finished"
                );
                result
            }
        }
    }
}
