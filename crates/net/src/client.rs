//! Thread messaging client
//!
//! [`ThreadClient`] is a handle over a spawned connection task. The handle's
//! methods never block: they update shared state and queue commands. The
//! task owns the transport, the heartbeat, the pending dial and the pending
//! reconnect timer, and reports everything through [`ThreadEvent`]s.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tellerline_core::{MessagingSettings, ThreadId, UserId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::backoff::BackoffPolicy;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::frame;
use crate::invariants::assert_connection_invariants;
use crate::lifecycle::{CloseOutcome, ConnectionPhase, Lifecycle};
use crate::protocol::{CloseCode, InboundFrame, OutboundFrame};
use crate::router::{self, Routed};
use crate::transport::{ConnectRequest, Connector, Incoming, SessionCookie, Transport};

/// Default keepalive interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a closing handshake may take before the transport is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub thread_id: ThreadId,
    pub user_id: UserId,
    /// Page origin or development endpoint the socket URL is derived from
    pub base_url: Url,
    pub cookie: Option<SessionCookie>,
    pub heartbeat_interval: Duration,
    /// Silence after which an open connection is considered dead
    pub pong_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl ClientConfig {
    pub fn new(thread_id: ThreadId, user_id: UserId, base_url: Url) -> Self {
        Self {
            thread_id,
            user_id,
            base_url,
            cookie: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            pong_timeout: DEFAULT_HEARTBEAT_INTERVAL * 2,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn from_settings(
        settings: &MessagingSettings,
        thread_id: ThreadId,
        user_id: UserId,
    ) -> Result<Self> {
        Ok(Self {
            thread_id,
            user_id,
            base_url: settings.endpoint_base()?.clone(),
            cookie: None,
            heartbeat_interval: settings.heartbeat_interval(),
            pong_timeout: settings.pong_timeout(),
            backoff: BackoffPolicy::from_settings(settings),
        })
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: SessionCookie) -> Self {
        self.cookie = Some(cookie);
        self
    }

    /// Set the keepalive interval and pong timeout. The timeout is raised to
    /// the interval if shorter, the same floor settings validation applies.
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, pong_timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.pong_timeout = pong_timeout.max(interval);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Event delivered to the client's owner
#[derive(Debug)]
pub enum ThreadEvent {
    /// `new_message`, or any frame with an unrecognised type
    Message(InboundFrame),
    /// `reaction_added` / `reaction_removed`
    Reaction(InboundFrame),
    /// `typing_start` / `typing_stop`
    Typing(InboundFrame),
    /// `presence_update`
    Presence(InboundFrame),
    /// Call signaling: offer, answer, candidate, end, busy
    Signal(InboundFrame),
    /// The connection opened (`true`) or closed (`false`)
    ConnectionChanged(bool),
    Error(Error),
}

/// State readable from the handle without asking the task
struct Shared {
    phase: AtomicU8,
    reconnect_attempts: AtomicU32,
    heartbeat_active: AtomicBool,
    /// Set by `disconnect()`; suppresses every automatic reconnect
    terminated: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(ConnectionPhase::Idle as u8),
            reconnect_attempts: AtomicU32::new(0),
            heartbeat_active: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        }
    }

    /// Handle side of `disconnect()`.
    ///
    /// `terminated` is stored before the phase; the task re-checks it after
    /// each store of its own (see `ConnectionTask::store_phase`), so Closed
    /// is never overwritten by a transition the task raced with.
    fn mark_disconnected(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.heartbeat_active.store(false, Ordering::SeqCst);
        self.phase
            .store(ConnectionPhase::Closed as u8, Ordering::SeqCst);
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

enum ClientCommand {
    Connect,
    Disconnect,
    Send(String),
}

/// Client handle for one conversation thread
pub struct ThreadClient {
    thread_id: ThreadId,
    user_id: UserId,
    shared: Arc<Shared>,
    cmd_tx: mpsc::UnboundedSender<ClientCommand>,
    _task: JoinHandle<()>,
}

impl ThreadClient {
    /// Create a client and spawn its connection task. Nothing is dialed
    /// until [`connect`](Self::connect).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<C: Connector>(
        config: ClientConfig,
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<ThreadEvent>) {
        let shared = Arc::new(Shared::new());

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let thread_id = config.thread_id.clone();
        let user_id = config.user_id.clone();
        let span = tracing::info_span!("thread_client", thread_id = %thread_id);

        let task = ConnectionTask::new(config, Arc::new(connector), shared.clone(), event_tx);
        let handle = tokio::spawn(task.run(cmd_rx).instrument(span));

        (
            Self {
                thread_id,
                user_id,
                shared,
                cmd_tx,
                _task: handle,
            },
            event_rx,
        )
    }

    /// Open the connection. No-op while connecting or open.
    pub fn connect(&self) {
        self.command(ClientCommand::Connect);
    }

    /// Close with the normal-closure code and stop reconnecting.
    ///
    /// Takes effect immediately for the handle: sends are refused and the
    /// heartbeat is reported stopped before this returns.
    pub fn disconnect(&self) {
        self.shared.mark_disconnected();
        self.command(ClientCommand::Disconnect);
    }

    /// Transmit a frame if the connection is open.
    ///
    /// Returns `false` when it is not; nothing is queued for later.
    pub fn send_raw(&self, frame: &OutboundFrame) -> bool {
        if !self.is_open() {
            debug!(frame = frame.tag(), "Not connected, frame not sent");
            return false;
        }

        let text = match frame::encode(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(frame = frame.tag(), error = %e, "Could not encode frame");
                return false;
            }
        };

        self.cmd_tx.send(ClientCommand::Send(text)).is_ok()
    }

    /// Send a chat message. Blank messages are refused.
    pub fn send_message(&self, content: &str) -> bool {
        if content.trim().is_empty() {
            return false;
        }
        self.send_raw(&OutboundFrame::NewMessage {
            content: content.to_string(),
        })
    }

    /// Broadcast a typing indicator to the thread
    pub fn send_typing(&self, is_typing: bool) -> bool {
        let frame = if is_typing {
            OutboundFrame::TypingStart
        } else {
            OutboundFrame::TypingStop
        };
        self.send_raw(&frame)
    }

    pub fn send_call_offer(&self, target_user_id: &UserId, offer: Value) -> bool {
        self.send_raw(&OutboundFrame::CallOffer {
            offer,
            sender_id: self.user_id.clone(),
            target_user_id: target_user_id.clone(),
        })
    }

    pub fn send_call_answer(&self, target_user_id: &UserId, answer: Value) -> bool {
        self.send_raw(&OutboundFrame::CallAnswer {
            answer,
            sender_id: self.user_id.clone(),
            target_user_id: target_user_id.clone(),
        })
    }

    pub fn send_ice_candidate(&self, target_user_id: &UserId, candidate: Value) -> bool {
        self.send_raw(&OutboundFrame::NewIceCandidate {
            candidate,
            sender_id: self.user_id.clone(),
            target_user_id: target_user_id.clone(),
        })
    }

    pub fn send_call_end(&self, target_user_id: &UserId) -> bool {
        self.send_raw(&OutboundFrame::CallEnd {
            sender_id: self.user_id.clone(),
            target_user_id: target_user_id.clone(),
        })
    }

    pub fn send_call_busy(&self, target_user_id: &UserId) -> bool {
        self.send_raw(&OutboundFrame::CallBusy {
            sender_id: self.user_id.clone(),
            target_user_id: target_user_id.clone(),
        })
    }

    pub fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.shared.phase.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.phase() == ConnectionPhase::Open
    }

    /// Consecutive failed reconnects since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::Acquire)
    }

    pub fn heartbeat_active(&self) -> bool {
        self.shared.heartbeat_active.load(Ordering::SeqCst)
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    fn command(&self, cmd: ClientCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("Connection task not running");
        }
    }
}

type PendingDial<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Owner of the transport and every timer
struct ConnectionTask<C: Connector> {
    config: ClientConfig,
    connector: Arc<C>,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ThreadEvent>,
    lifecycle: Lifecycle,
    transport: Option<C::Transport>,
    dial: Option<PendingDial<C::Transport>>,
    /// Phase to fall back to if the pending dial is refused outright
    dial_revert: ConnectionPhase,
    retry: Option<Pin<Box<Sleep>>>,
    heartbeat: Option<Interval>,
    last_inbound: Instant,
    /// A ping went out and nothing has arrived since
    awaiting_pong: bool,
    connection_id: Option<Uuid>,
}

impl<C: Connector> ConnectionTask<C> {
    fn new(
        config: ClientConfig,
        connector: Arc<C>,
        shared: Arc<Shared>,
        events: mpsc::UnboundedSender<ThreadEvent>,
    ) -> Self {
        let lifecycle = Lifecycle::new(config.backoff);
        Self {
            config,
            connector,
            shared,
            events,
            lifecycle,
            transport: None,
            dial: None,
            dial_revert: ConnectionPhase::Idle,
            retry: None,
            heartbeat: None,
            last_inbound: Instant::now(),
            awaiting_pong: false,
            connection_id: None,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<ClientCommand>) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(ClientCommand::Connect) => {
                        self.shared.terminated.store(false, Ordering::SeqCst);
                        self.connect();
                    }
                    Some(ClientCommand::Disconnect) => self.disconnect().await,
                    Some(ClientCommand::Send(text)) => self.send(text).await,
                    None => {
                        debug!("Client handle dropped");
                        self.disconnect().await;
                        break;
                    }
                },

                result = next_dial(&mut self.dial) => {
                    self.dial = None;
                    self.dial_finished(result).await;
                }

                () = next_retry(&mut self.retry) => {
                    self.retry = None;
                    self.retry_due();
                }

                incoming = next_incoming(&mut self.transport) => self.incoming(incoming),

                _ = next_tick(&mut self.heartbeat) => self.heartbeat_tick().await,
            }
        }

        debug!("Connection task exited");
    }

    fn connect(&mut self) {
        let Some(previous) = self.lifecycle.begin_connect() else {
            debug!(phase = ?self.lifecycle.phase(), "Connect ignored, already in progress");
            return;
        };

        // An explicit connect supersedes a scheduled retry
        self.retry = None;
        self.publish();

        let endpoint = match Endpoint::for_thread(&self.config.base_url, &self.config.thread_id)
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.open_failed(previous, e);
                return;
            }
        };

        let connection_id = Uuid::new_v4();
        info!(%connection_id, endpoint = %endpoint, "Connecting");

        let request = ConnectRequest {
            endpoint,
            cookie: self.config.cookie.clone(),
            connection_id,
        };
        let connector = Arc::clone(&self.connector);
        self.dial = Some(Box::pin(async move { connector.open(request).await }));
        self.dial_revert = previous;
        self.connection_id = Some(connection_id);
    }

    async fn dial_finished(&mut self, result: Result<C::Transport>) {
        match result {
            Ok(mut transport) => {
                if self.shared.is_terminated() {
                    debug!("Disconnected while dialing, dropping new connection");
                    close_quietly(&mut transport, CloseCode::NORMAL).await;
                    return;
                }

                self.transport = Some(transport);
                self.lifecycle.opened();
                self.start_heartbeat();
                self.publish();
                info!(connection_id = ?self.connection_id, "Connected");
                self.emit(ThreadEvent::ConnectionChanged(true));
            }
            Err(e) if !e.is_retryable() => self.open_failed(self.dial_revert, e),
            Err(e) => {
                warn!(error = %e, "Connection attempt failed");
                self.emit(ThreadEvent::Error(e));
                self.closed(CloseCode::ABNORMAL);
            }
        }
    }

    /// The dial never reached the network; report and stay put
    fn open_failed(&mut self, previous: ConnectionPhase, e: Error) {
        warn!(error = %e, "Could not open connection");
        self.lifecycle.open_failed(previous);
        self.publish();
        self.emit(ThreadEvent::Error(e));
    }

    /// Close handler: the only place that schedules reconnects
    fn closed(&mut self, code: CloseCode) {
        self.transport = None;
        self.stop_heartbeat();
        if self.shared.is_terminated() {
            self.lifecycle.terminate();
        }

        let outcome = self.lifecycle.closed(code);
        self.publish();
        self.emit(ThreadEvent::ConnectionChanged(false));

        match outcome {
            CloseOutcome::Retry { delay, attempt } => {
                info!(
                    code = %code,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Connection lost, scheduling reconnect"
                );
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
            CloseOutcome::Halt(reason) => {
                info!(code = %code, reason = ?reason, "Connection closed, not reconnecting");
            }
        }
    }

    fn retry_due(&mut self) {
        if self.shared.is_terminated() {
            debug!("Reconnect skipped, client disconnected");
            return;
        }
        info!(attempt = self.lifecycle.attempts(), "Reconnecting");
        self.connect();
    }

    async fn disconnect(&mut self) {
        let was_open = self.lifecycle.phase() == ConnectionPhase::Open;

        self.shared.terminated.store(true, Ordering::SeqCst);
        self.retry = None;
        self.dial = None;
        self.stop_heartbeat();
        self.lifecycle.terminate();

        if let Some(mut transport) = self.transport.take() {
            close_quietly(&mut transport, CloseCode::NORMAL).await;
        }
        self.publish();

        if was_open {
            info!("Disconnected");
            self.emit(ThreadEvent::ConnectionChanged(false));
        }
    }

    async fn send(&mut self, text: String) {
        let Some(transport) = self.transport.as_mut() else {
            debug!("Connection not open, dropping outbound frame");
            return;
        };

        let result = transport.send(text).await;
        if let Err(e) = result {
            // A dead socket shows up as a close; the error alone changes nothing
            warn!(error = %e, "Send failed");
            self.emit(ThreadEvent::Error(e));
        }
    }

    fn incoming(&mut self, item: Option<Result<Incoming>>) {
        match item {
            Some(Ok(Incoming::Text(text))) => {
                self.traffic_seen();
                match router::route_text(&text) {
                    Ok(Routed::Deliver(event)) => self.emit(event),
                    Ok(Routed::Pong) => debug!("Received pong"),
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed frame");
                        self.emit(ThreadEvent::Error(e));
                    }
                }
            }
            Some(Ok(Incoming::Binary(data))) => {
                self.traffic_seen();
                self.emit(ThreadEvent::Error(Error::MalformedFrame(format!(
                    "Unexpected binary frame ({} bytes)",
                    data.len()
                ))));
            }
            Some(Ok(Incoming::Close(code))) => self.closed(code),
            Some(Err(e)) => {
                warn!(error = %e, "Transport error");
                self.emit(ThreadEvent::Error(e));
            }
            None => self.closed(CloseCode::ABNORMAL),
        }
    }

    async fn heartbeat_tick(&mut self) {
        if self.shared.is_terminated() {
            return;
        }

        // Silence only counts against the connection once a ping is unanswered
        let silent_for = self.last_inbound.elapsed();
        if self.awaiting_pong && silent_for >= self.config.pong_timeout {
            warn!(
                silent_ms = silent_for.as_millis() as u64,
                "No traffic within pong timeout, dropping half-open connection"
            );
            if let Some(mut transport) = self.transport.take() {
                close_quietly(&mut transport, CloseCode::GOING_AWAY).await;
            }
            self.emit(ThreadEvent::Error(Error::HeartbeatTimeout(silent_for)));
            self.closed(CloseCode::ABNORMAL);
            return;
        }

        match frame::encode(&OutboundFrame::Ping) {
            Ok(text) => {
                debug!("Sending ping");
                self.awaiting_pong = true;
                self.send(text).await;
            }
            Err(e) => warn!(error = %e, "Could not encode ping"),
        }
    }

    fn start_heartbeat(&mut self) {
        let period = self.config.heartbeat_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.heartbeat = Some(ticker);
        self.last_inbound = Instant::now();
        self.awaiting_pong = false;

        self.shared.heartbeat_active.store(true, Ordering::SeqCst);
        if self.shared.is_terminated() {
            self.shared.heartbeat_active.store(false, Ordering::SeqCst);
        }
    }

    fn stop_heartbeat(&mut self) {
        self.heartbeat = None;
        self.awaiting_pong = false;
        self.shared.heartbeat_active.store(false, Ordering::SeqCst);
    }

    fn traffic_seen(&mut self) {
        self.last_inbound = Instant::now();
        self.awaiting_pong = false;
    }

    fn publish(&self) {
        assert_connection_invariants(
            &self.lifecycle,
            self.heartbeat.is_some(),
            self.transport.is_some(),
        );
        self.store_phase(self.lifecycle.phase());
        self.shared
            .reconnect_attempts
            .store(self.lifecycle.attempts(), Ordering::Release);
    }

    /// Publish `phase` unless the handle has already disconnected, in which
    /// case it keeps reading Closed.
    fn store_phase(&self, phase: ConnectionPhase) {
        self.shared.phase.store(phase as u8, Ordering::SeqCst);
        if phase != ConnectionPhase::Closed && self.shared.is_terminated() {
            self.shared
                .phase
                .store(ConnectionPhase::Closed as u8, Ordering::SeqCst);
        }
    }

    fn emit(&self, event: ThreadEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

async fn close_quietly<T: Transport>(transport: &mut T, code: CloseCode) {
    match tokio::time::timeout(CLOSE_TIMEOUT, transport.close(code)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Close failed"),
        Err(_) => debug!("Close timed out"),
    }
}

async fn next_dial<T>(dial: &mut Option<PendingDial<T>>) -> Result<T> {
    match dial {
        Some(pending) => pending.await,
        None => std::future::pending().await,
    }
}

async fn next_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_incoming<T: Transport>(transport: &mut Option<T>) -> Option<Result<Incoming>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) -> Instant {
    match heartbeat {
        Some(ticker) => ticker.tick().await,
        None => std::future::pending().await,
    }
}
