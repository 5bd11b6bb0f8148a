//! Inbound frame routing
//!
//! Each frame goes to exactly one consumer channel. Unknown tags fall back to
//! the message channel so newer servers degrade gracefully.

use crate::client::ThreadEvent;
use crate::error::Result;
use crate::frame;
use crate::protocol::{Channel, InboundFrame};

/// Routing decision for one inbound frame
#[derive(Debug)]
pub enum Routed {
    Deliver(ThreadEvent),
    /// Heartbeat acknowledgement, consumed internally
    Pong,
}

pub fn route(frame: InboundFrame) -> Routed {
    match frame.kind.channel() {
        Channel::Message => Routed::Deliver(ThreadEvent::Message(frame)),
        Channel::Reaction => Routed::Deliver(ThreadEvent::Reaction(frame)),
        Channel::Typing => Routed::Deliver(ThreadEvent::Typing(frame)),
        Channel::Presence => Routed::Deliver(ThreadEvent::Presence(frame)),
        Channel::Signal => Routed::Deliver(ThreadEvent::Signal(frame)),
        Channel::Heartbeat => Routed::Pong,
    }
}

/// Decode and route a text frame
pub fn route_text(text: &str) -> Result<Routed> {
    Ok(route(frame::decode(text)?))
}
