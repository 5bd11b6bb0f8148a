//! Messaging endpoint derivation
//!
//! Endpoint format: <ws|wss>://<host>[:port]/ws/messaging/<thread-id>/
//!
//! The endpoint never carries credentials. Authentication rides on the
//! session cookie attached to the upgrade request.

use std::fmt;

use tellerline_core::ThreadId;
use url::Url;

use crate::error::{Error, Result};

/// Path prefix of the messaging socket
pub const MESSAGING_PATH: &str = "/ws/messaging";

/// Resolved socket endpoint for one thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    thread_id: ThreadId,
}

impl Endpoint {
    /// Derive the thread endpoint from a page origin or development endpoint.
    ///
    /// Only scheme, host and port are taken from `base`; its path is ignored.
    /// A secure page scheme selects a secure socket scheme.
    pub fn for_thread(base: &Url, thread_id: &ThreadId) -> Result<Self> {
        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::InvalidEndpoint(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };

        if !base.username().is_empty() || base.password().is_some() {
            return Err(Error::InvalidEndpoint(
                "base URL must not carry credentials".into(),
            ));
        }
        if base.query().is_some() {
            return Err(Error::InvalidEndpoint(
                "base URL must not carry a query string".into(),
            ));
        }

        let host = base
            .host_str()
            .ok_or_else(|| Error::InvalidEndpoint("base URL has no host".into()))?;
        let authority = match base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let raw = format!(
            "{}://{}{}/{}/",
            scheme, authority, MESSAGING_PATH, thread_id
        );
        let url = Url::parse(&raw)
            .map_err(|e| Error::InvalidEndpoint(format!("'{}': {}", raw, e)))?;

        Ok(Self {
            url,
            thread_id: thread_id.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
