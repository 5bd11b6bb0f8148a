//! In-memory transport for driving the connection task in tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::protocol::CloseCode;
use crate::transport::{ConnectRequest, Connector, Incoming, Transport};

/// How the next dial behaves
#[derive(Debug, Clone, Copy)]
pub(crate) enum Dial {
    Accept,
    /// Network-level failure (retryable)
    Refuse,
    /// Request refused before reaching the network
    Reject,
    /// Never completes
    Hang,
}

/// What the client wrote to the transport
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sent {
    Text(String),
    Close(CloseCode),
}

impl Sent {
    pub(crate) fn json(&self) -> Value {
        match self {
            Sent::Text(text) => serde_json::from_str(text).unwrap(),
            Sent::Close(code) => panic!("expected a text frame, got close {}", code),
        }
    }
}

#[derive(Default)]
struct Inner {
    script: Mutex<VecDeque<Dial>>,
    dials: Mutex<Vec<(Instant, ConnectRequest)>>,
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    inner: Arc<Inner>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    /// Connector plus the stream of server-side peers for accepted dials
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Inner::default()),
                peers,
            },
            peer_rx,
        )
    }

    /// Queue dial behaviours; once exhausted every dial is accepted
    pub(crate) fn script(&self, dials: impl IntoIterator<Item = Dial>) {
        self.inner.script.lock().unwrap().extend(dials);
    }

    pub(crate) fn dial_count(&self) -> usize {
        self.inner.dials.lock().unwrap().len()
    }

    pub(crate) fn dial_times(&self) -> Vec<Instant> {
        self.inner.dials.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn open(&self, request: ConnectRequest) -> Result<MockTransport> {
        self.inner
            .dials
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        let dial = self
            .inner
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Dial::Accept);

        match dial {
            Dial::Accept => {
                let (to_client, inbound) = mpsc::unbounded_channel();
                let (outbound, from_client) = mpsc::unbounded_channel();
                let _ = self.peers.send(MockPeer {
                    request,
                    to_client,
                    from_client,
                });
                Ok(MockTransport { inbound, outbound })
            }
            Dial::Refuse => Err(Error::Transport("connection refused".into())),
            Dial::Reject => Err(Error::InvalidRequest("request rejected".into())),
            Dial::Hang => std::future::pending().await,
        }
    }
}

pub(crate) struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Result<Incoming>>,
    outbound: mpsc::UnboundedSender<Sent>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.outbound
            .send(Sent::Text(text))
            .map_err(|_| Error::Transport("peer gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<Incoming>> {
        self.inbound.recv().await
    }

    async fn close(&mut self, code: CloseCode) -> Result<()> {
        self.outbound
            .send(Sent::Close(code))
            .map_err(|_| Error::Transport("peer gone".into()))
    }
}

/// Server side of an accepted dial
pub(crate) struct MockPeer {
    pub(crate) request: ConnectRequest,
    to_client: mpsc::UnboundedSender<Result<Incoming>>,
    from_client: mpsc::UnboundedReceiver<Sent>,
}

impl MockPeer {
    pub(crate) fn push_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Ok(Incoming::Text(text.into())));
    }

    pub(crate) fn push_json(&self, value: Value) {
        self.push_text(value.to_string());
    }

    pub(crate) fn push_binary(&self, data: &[u8]) {
        let _ = self.to_client.send(Ok(Incoming::Binary(data.to_vec())));
    }

    pub(crate) fn close(&self, code: CloseCode) {
        let _ = self.to_client.send(Ok(Incoming::Close(code)));
    }

    pub(crate) fn fail(&self, reason: &str) {
        let _ = self.to_client.send(Err(Error::Transport(reason.into())));
    }

    /// Drop the connection without a close frame
    pub(crate) fn vanish(self) {}

    pub(crate) async fn next_sent(&mut self) -> Option<Sent> {
        self.from_client.recv().await
    }
}
