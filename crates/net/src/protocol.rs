//! Messaging protocol frame types
//!
//! Every frame is a JSON object tagged with a `type` discriminant.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tellerline_core::UserId;

/// Inbound frame discriminant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    NewMessage,
    ReactionAdded,
    ReactionRemoved,
    TypingStart,
    TypingStop,
    PresenceUpdate,
    CallOffer,
    CallAnswer,
    NewIceCandidate,
    CallEnd,
    CallBusy,
    Pong,
    /// Tag this client does not know about
    Other(String),
}

impl FrameKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "new_message" => FrameKind::NewMessage,
            "reaction_added" => FrameKind::ReactionAdded,
            "reaction_removed" => FrameKind::ReactionRemoved,
            "typing_start" => FrameKind::TypingStart,
            "typing_stop" => FrameKind::TypingStop,
            "presence_update" => FrameKind::PresenceUpdate,
            "call_offer" => FrameKind::CallOffer,
            "call_answer" => FrameKind::CallAnswer,
            "new_ice_candidate" => FrameKind::NewIceCandidate,
            "call_end" => FrameKind::CallEnd,
            "call_busy" => FrameKind::CallBusy,
            "pong" => FrameKind::Pong,
            other => FrameKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FrameKind::NewMessage => "new_message",
            FrameKind::ReactionAdded => "reaction_added",
            FrameKind::ReactionRemoved => "reaction_removed",
            FrameKind::TypingStart => "typing_start",
            FrameKind::TypingStop => "typing_stop",
            FrameKind::PresenceUpdate => "presence_update",
            FrameKind::CallOffer => "call_offer",
            FrameKind::CallAnswer => "call_answer",
            FrameKind::NewIceCandidate => "new_ice_candidate",
            FrameKind::CallEnd => "call_end",
            FrameKind::CallBusy => "call_busy",
            FrameKind::Pong => "pong",
            FrameKind::Other(tag) => tag,
        }
    }

    /// Consumer channel this kind is delivered on
    pub fn channel(&self) -> Channel {
        match self {
            FrameKind::NewMessage | FrameKind::Other(_) => Channel::Message,
            FrameKind::ReactionAdded | FrameKind::ReactionRemoved => Channel::Reaction,
            FrameKind::TypingStart | FrameKind::TypingStop => Channel::Typing,
            FrameKind::PresenceUpdate => Channel::Presence,
            FrameKind::CallOffer
            | FrameKind::CallAnswer
            | FrameKind::NewIceCandidate
            | FrameKind::CallEnd
            | FrameKind::CallBusy => Channel::Signal,
            FrameKind::Pong => Channel::Heartbeat,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer-facing channels an inbound frame can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Message,
    Reaction,
    Typing,
    Presence,
    Signal,
    /// Consumed internally, never delivered
    Heartbeat,
}

/// WebRTC signaling primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    End,
    Busy,
}

/// A parsed inbound frame
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub kind: FrameKind,
    /// The complete JSON object, `type` included
    pub payload: Map<String, Value>,
    pub received_at: DateTime<Utc>,
}

impl InboundFrame {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    pub fn signal_kind(&self) -> Option<SignalKind> {
        match self.kind {
            FrameKind::CallOffer => Some(SignalKind::Offer),
            FrameKind::CallAnswer => Some(SignalKind::Answer),
            FrameKind::NewIceCandidate => Some(SignalKind::Candidate),
            FrameKind::CallEnd => Some(SignalKind::End),
            FrameKind::CallBusy => Some(SignalKind::Busy),
            _ => None,
        }
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.str_field("sender_id")
    }

    pub fn target_user_id(&self) -> Option<&str> {
        self.str_field("target_user_id")
    }
}

/// Frames this client sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Keepalive, answered with `pong`
    Ping,

    /// Chat message; the server stamps the author from the session
    NewMessage { content: String },

    TypingStart,
    TypingStop,

    CallOffer {
        offer: Value,
        sender_id: UserId,
        target_user_id: UserId,
    },

    CallAnswer {
        answer: Value,
        sender_id: UserId,
        target_user_id: UserId,
    },

    NewIceCandidate {
        candidate: Value,
        sender_id: UserId,
        target_user_id: UserId,
    },

    CallEnd {
        sender_id: UserId,
        target_user_id: UserId,
    },

    CallBusy {
        sender_id: UserId,
        target_user_id: UserId,
    },
}

impl OutboundFrame {
    /// Wire discriminant, for logging
    pub fn tag(&self) -> &'static str {
        match self {
            OutboundFrame::Ping => "ping",
            OutboundFrame::NewMessage { .. } => "new_message",
            OutboundFrame::TypingStart => "typing_start",
            OutboundFrame::TypingStop => "typing_stop",
            OutboundFrame::CallOffer { .. } => "call_offer",
            OutboundFrame::CallAnswer { .. } => "call_answer",
            OutboundFrame::NewIceCandidate { .. } => "new_ice_candidate",
            OutboundFrame::CallEnd { .. } => "call_end",
            OutboundFrame::CallBusy { .. } => "call_busy",
        }
    }
}

/// WebSocket close status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Intentional close; never retried
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// Close frame carried no status
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// Connection dropped without a close frame
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    pub fn is_normal(self) -> bool {
        self == CloseCode::NORMAL
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn test_kind_tags_roundtrip() {
        for tag in [
            "new_message",
            "reaction_added",
            "reaction_removed",
            "typing_start",
            "typing_stop",
            "presence_update",
            "call_offer",
            "call_answer",
            "new_ice_candidate",
            "call_end",
            "call_busy",
            "pong",
            "custom_x",
        ] {
            assert_eq!(FrameKind::from_tag(tag).as_str(), tag);
        }
        assert_eq!(
            FrameKind::from_tag("custom_x"),
            FrameKind::Other("custom_x".into())
        );
    }

    #[test]
    fn test_channels() {
        assert_eq!(FrameKind::NewMessage.channel(), Channel::Message);
        assert_eq!(FrameKind::Other("x".into()).channel(), Channel::Message);
        assert_eq!(FrameKind::ReactionRemoved.channel(), Channel::Reaction);
        assert_eq!(FrameKind::TypingStop.channel(), Channel::Typing);
        assert_eq!(FrameKind::PresenceUpdate.channel(), Channel::Presence);
        assert_eq!(FrameKind::NewIceCandidate.channel(), Channel::Signal);
        assert_eq!(FrameKind::CallBusy.channel(), Channel::Signal);
        assert_eq!(FrameKind::Pong.channel(), Channel::Heartbeat);
    }

    #[test]
    fn test_outbound_wire_shape() {
        let ping = serde_json::to_value(OutboundFrame::Ping).unwrap();
        assert_eq!(ping, json!({ "type": "ping" }));

        let typing = serde_json::to_value(OutboundFrame::TypingStart).unwrap();
        assert_eq!(typing, json!({ "type": "typing_start" }));

        let offer = serde_json::to_value(OutboundFrame::CallOffer {
            offer: json!({ "sdp": "v=0", "type": "offer" }),
            sender_id: user("u1"),
            target_user_id: user("u2"),
        })
        .unwrap();
        assert_eq!(
            offer,
            json!({
                "type": "call_offer",
                "offer": { "sdp": "v=0", "type": "offer" },
                "sender_id": "u1",
                "target_user_id": "u2",
            })
        );

        let candidate = serde_json::to_value(OutboundFrame::NewIceCandidate {
            candidate: json!({ "candidate": "candidate:1 1 udp" }),
            sender_id: user("u1"),
            target_user_id: user("u2"),
        })
        .unwrap();
        assert_eq!(candidate["type"], "new_ice_candidate");

        let busy = serde_json::to_value(OutboundFrame::CallBusy {
            sender_id: user("u1"),
            target_user_id: user("u2"),
        })
        .unwrap();
        assert_eq!(
            busy,
            json!({ "type": "call_busy", "sender_id": "u1", "target_user_id": "u2" })
        );
    }

    #[test]
    fn test_close_codes() {
        assert!(CloseCode::NORMAL.is_normal());
        assert!(!CloseCode::ABNORMAL.is_normal());
        assert!(!CloseCode::GOING_AWAY.is_normal());
        assert!(!CloseCode(4001).is_normal());
    }
}
