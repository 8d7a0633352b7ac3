//! 帧载荷（data URL）结构校验
//!
//! 真正的图像解码由感知引擎完成；这里只保证载荷形如
//! `data:image/<type>;base64,<payload>`，不合法的帧在触碰任何会话状态前就被拒绝。

use crate::perception::PerceptionError;

/// 空白测试图（1x1 PNG），健康检查用
pub const BLANK_FRAME: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePayload {
    mime: String,
    data_url: String,
    payload_start: usize,
}

impl FramePayload {
    pub fn parse(raw: &str) -> Result<Self, PerceptionError> {
        let raw = raw.trim();
        let (header, payload) = raw
            .split_once(',')
            .ok_or_else(|| decode_error("frame is not a data URL"))?;

        let header = header
            .strip_prefix("data:")
            .ok_or_else(|| decode_error("frame is not a data URL"))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| decode_error("frame must be base64 encoded"))?;
        if !mime.is_empty() && !mime.starts_with("image/") {
            return Err(decode_error("frame is not an image"));
        }

        if payload.is_empty() {
            return Err(decode_error("frame payload is empty"));
        }
        if payload.len() % 4 != 0 || !is_base64(payload) {
            return Err(decode_error("frame payload is not valid base64"));
        }

        Ok(Self {
            mime: if mime.is_empty() {
                "image/png".to_string()
            } else {
                mime.to_string()
            },
            data_url: raw.to_string(),
            payload_start: raw.len() - payload.len(),
        })
    }

    pub fn blank() -> Self {
        Self {
            mime: "image/png".to_string(),
            data_url: BLANK_FRAME.to_string(),
            payload_start: BLANK_FRAME.len()
                - BLANK_FRAME.split_once(',').map_or(0, |(_, p)| p.len()),
        }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn base64_payload(&self) -> &str {
        &self.data_url[self.payload_start..]
    }

    /// 解码后字节数（按 base64 长度推算）
    pub fn decoded_len(&self) -> usize {
        let payload = self.base64_payload();
        let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
        payload.len() / 4 * 3 - padding
    }
}

fn decode_error(message: &str) -> PerceptionError {
    PerceptionError::Decode(message.to_string())
}

fn is_base64(payload: &str) -> bool {
    let body = payload.trim_end_matches('=');
    payload.len() - body.len() <= 2
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_png_data_url() {
        let frame = FramePayload::parse("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(frame.mime(), "image/jpeg");
        assert_eq!(frame.base64_payload(), "/9j/4AAQ");
        assert_eq!(frame.decoded_len(), 6);
    }

    #[test]
    fn blank_frame_is_valid() {
        let parsed = FramePayload::parse(BLANK_FRAME).unwrap();
        assert_eq!(parsed, FramePayload::blank());
        assert_eq!(parsed.decoded_len(), 68);
    }

    #[test]
    fn rejects_malformed_frames() {
        for raw in [
            "",
            "not a frame",
            "iVBORw0KGgo=",
            "data:image/png,AAAA",
            "data:text/plain;base64,AAAA",
            "data:image/png;base64,",
            "data:image/png;base64,AAA",
            "data:image/png;base64,AA*A",
            "data:image/png;base64,A===",
        ] {
            let err = FramePayload::parse(raw).unwrap_err();
            assert!(matches!(err, PerceptionError::Decode(_)), "{raw:?} accepted");
        }
    }
}
