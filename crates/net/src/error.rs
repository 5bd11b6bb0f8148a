//! Network error types

use std::time::Duration;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid connect request: {0}")]
    InvalidRequest(String),

    #[error("No inbound traffic for {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] tellerline_core::Error),
}

impl Error {
    /// Whether a failed dial should be treated as a lost connection.
    ///
    /// Errors raised before the request reaches the network are not: the
    /// same request would fail the same way on every retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::InvalidEndpoint(_) | Error::InvalidRequest(_) | Error::Core(_)
        )
    }
}
