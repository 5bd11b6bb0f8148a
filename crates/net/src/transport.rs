//! Transport seam and the WebSocket implementation
//!
//! The connection task only talks to [`Connector`] and [`Transport`], so the
//! lifecycle can run against any bidirectional text transport.

use std::fmt;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::protocol::CloseCode;

/// Opaque session cookie established by the host before the client exists.
///
/// Never parsed, refreshed or logged.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie(String);

impl SessionCookie {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCookie(<redacted>)")
    }
}

/// Everything a connector needs to open one connection
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub endpoint: Endpoint,
    pub cookie: Option<SessionCookie>,
    /// Tags log lines for this dial
    pub connection_id: Uuid,
}

/// Something received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Binary(Vec<u8>),
    Close(CloseCode),
}

/// An open bidirectional connection
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, text: String) -> Result<()>;

    /// Next inbound item. `None` means the connection ended without a close
    /// frame. An `Err` is followed by `None` or a close.
    async fn recv(&mut self) -> Option<Result<Incoming>>;

    async fn close(&mut self, code: CloseCode) -> Result<()>;
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Errors for which [`Error::is_retryable`] is false mean the request
    /// never reached the network.
    async fn open(&self, request: ConnectRequest) -> Result<Self::Transport>;
}

/// WebSocket connector over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

/// An open WebSocket
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    failed: bool,
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn open(&self, request: ConnectRequest) -> Result<WsTransport> {
        if request.endpoint.is_secure() && !cfg!(feature = "tls") {
            return Err(Error::InvalidRequest(format!(
                "{} needs the `tls` feature",
                request.endpoint
            )));
        }

        let mut upgrade = request
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;

        if let Some(cookie) = &request.cookie {
            let value = HeaderValue::from_str(cookie.expose()).map_err(|_| {
                Error::InvalidRequest("session cookie is not a valid header value".into())
            })?;
            upgrade.headers_mut().insert(COOKIE, value);
        }

        let (stream, response) = connect_async(upgrade).await.map_err(|e| match e {
            tokio_tungstenite::tungstenite::Error::Url(e) => Error::InvalidRequest(e.to_string()),
            e => Error::Transport(e.to_string()),
        })?;

        debug!(
            connection_id = %request.connection_id,
            thread_id = %request.endpoint.thread_id(),
            status = %response.status(),
            "WebSocket upgrade complete"
        );

        Ok(WsTransport {
            stream,
            failed: false,
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Incoming>> {
        if self.failed {
            return None;
        }

        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Incoming::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(data)) => return Some(Ok(Incoming::Binary(data.to_vec()))),
                Ok(Message::Close(frame)) => {
                    let code = frame
                        .map(|f| CloseCode(u16::from(f.code)))
                        .unwrap_or(CloseCode::NO_STATUS);
                    return Some(Ok(Incoming::Close(code)));
                }
                // Control frames are answered by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(Error::Transport(e.to_string())));
                }
            }
        }
    }

    async fn close(&mut self, code: CloseCode) -> Result<()> {
        let frame = CloseFrame {
            code: code.0.into(),
            reason: String::new().into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}
