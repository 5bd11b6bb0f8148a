//! Tellerline Network Library
//!
//! Real-time messaging and call signaling for one conversation thread.
//!
//! # Architecture
//!
//! - **Client**: Handle over a connection task that dials, keeps alive and
//!   reconnects with exponential backoff
//! - **Router**: Sends each inbound frame to exactly one event channel
//! - **Protocol**: JSON text frames tagged by `type`
//! - **Transport**: WebSocket by default, swappable through [`Connector`]
//!
//! # Usage
//!
//! ```ignore
//! let config = ClientConfig::from_settings(&settings.messaging, thread_id, user_id)?
//!     .with_cookie(SessionCookie::new(cookie));
//! let (client, mut events) = ThreadClient::new(config, WsConnector);
//! client.connect();
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ThreadEvent::Message(frame) => { /* handle */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod endpoint;
pub mod error;
mod frame;
pub mod handlers;
mod invariants;
pub mod lifecycle;
pub mod protocol;
pub mod router;
pub mod transport;

#[cfg(test)]
mod testing;

pub use backoff::BackoffPolicy;
pub use client::{ClientConfig, ThreadClient, ThreadEvent};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use handlers::Handlers;
pub use lifecycle::{ConnectionPhase, HaltReason};
pub use protocol::{CloseCode, FrameKind, InboundFrame, OutboundFrame, SignalKind};
pub use transport::{Connector, SessionCookie, Transport, WsConnector};
