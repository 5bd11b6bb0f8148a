//! Text frame encoding/decoding
//!
//! Wire format: one JSON object per WebSocket text message.
//! Maximum frame size: 1MB (sanity limit)

use chrono::Utc;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::{FrameKind, InboundFrame, OutboundFrame};

/// Maximum allowed frame size (1MB)
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Parse an inbound text frame
pub fn decode(text: &str) -> Result<InboundFrame> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(Error::MalformedFrame(format!(
            "Frame too large: {} bytes (max {})",
            text.len(),
            MAX_FRAME_SIZE
        )));
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::MalformedFrame(format!("Invalid JSON: {}", e)))?;

    let Value::Object(payload) = value else {
        return Err(Error::MalformedFrame("Frame is not a JSON object".into()));
    };

    let kind = match payload.get("type") {
        Some(Value::String(tag)) if !tag.is_empty() => FrameKind::from_tag(tag),
        Some(Value::String(_)) => return Err(Error::MalformedFrame("Empty type".into())),
        Some(_) => return Err(Error::MalformedFrame("type is not a string".into())),
        None => return Err(Error::MalformedFrame("Missing type".into())),
    };

    Ok(InboundFrame {
        kind,
        payload,
        received_at: Utc::now(),
    })
}

/// Serialize an outbound frame
pub fn encode(frame: &OutboundFrame) -> Result<String> {
    let text = serde_json::to_string(frame)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(Error::MalformedFrame(format!(
            "Frame too large: {} bytes (max {})",
            text.len(),
            MAX_FRAME_SIZE
        )));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_keeps_full_payload() {
        let frame = decode(r#"{"type":"new_message","id":7,"content":"hi"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::NewMessage);
        assert_eq!(frame.str_field("type"), Some("new_message"));
        assert_eq!(frame.str_field("content"), Some("hi"));
        assert_eq!(frame.get("id").and_then(Value::as_u64), Some(7));
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let frame = decode(r#"{"type":"custom_x"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Other("custom_x".into()));
    }

    #[test]
    fn test_malformed_frames_rejected() {
        for text in [
            "not json",
            "[1,2,3]",
            "\"new_message\"",
            "{}",
            r#"{"type":42}"#,
            r#"{"type":""}"#,
            r#"{"type":"new_message""#,
        ] {
            assert!(
                matches!(decode(text), Err(Error::MalformedFrame(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let padding = "x".repeat(MAX_FRAME_SIZE);
        let text = format!(r#"{{"type":"new_message","content":"{}"}}"#, padding);
        assert!(matches!(decode(&text), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_encode_ping() {
        assert_eq!(encode(&OutboundFrame::Ping).unwrap(), r#"{"type":"ping"}"#);
    }
}
