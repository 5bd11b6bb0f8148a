//! Callback registration over the event stream
//!
//! Hosts that prefer callbacks to matching on [`ThreadEvent`] register them
//! here and hand over the receiver. Each event goes to at most one callback;
//! a callback that panics is logged and skipped.
//!
//! [`Handlers::spawn`] runs every callback on one task in arrival order, so a
//! slow callback delays all channels behind it. [`Handlers::spawn_per_channel`]
//! gives each registered callback its own blocking thread instead; order then
//! holds within a channel only.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::client::ThreadEvent;
use crate::error::Error;
use crate::protocol::InboundFrame;

type FrameHandler = Box<dyn FnMut(InboundFrame) + Send>;

#[derive(Default)]
pub struct Handlers {
    on_message: Option<FrameHandler>,
    on_reaction: Option<FrameHandler>,
    on_typing: Option<FrameHandler>,
    on_presence: Option<FrameHandler>,
    on_signal: Option<FrameHandler>,
    on_connection_change: Option<Box<dyn FnMut(bool) + Send>>,
    on_error: Option<Box<dyn FnMut(Error) + Send>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_message(mut self, f: impl FnMut(InboundFrame) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_reaction(mut self, f: impl FnMut(InboundFrame) + Send + 'static) -> Self {
        self.on_reaction = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_typing(mut self, f: impl FnMut(InboundFrame) + Send + 'static) -> Self {
        self.on_typing = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_presence(mut self, f: impl FnMut(InboundFrame) + Send + 'static) -> Self {
        self.on_presence = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_signal(mut self, f: impl FnMut(InboundFrame) + Send + 'static) -> Self {
        self.on_signal = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_connection_change(mut self, f: impl FnMut(bool) + Send + 'static) -> Self {
        self.on_connection_change = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Deliver one event to its callback
    pub fn dispatch(&mut self, event: ThreadEvent) {
        match event {
            ThreadEvent::Message(frame) => invoke(&mut self.on_message, "message", frame),
            ThreadEvent::Reaction(frame) => invoke(&mut self.on_reaction, "reaction", frame),
            ThreadEvent::Typing(frame) => invoke(&mut self.on_typing, "typing", frame),
            ThreadEvent::Presence(frame) => invoke(&mut self.on_presence, "presence", frame),
            ThreadEvent::Signal(frame) => invoke(&mut self.on_signal, "signal", frame),
            ThreadEvent::ConnectionChanged(open) => {
                invoke(&mut self.on_connection_change, "connection", open)
            }
            ThreadEvent::Error(e) => invoke(&mut self.on_error, "error", e),
        }
    }

    /// Drain `events` into the callbacks until the client goes away.
    ///
    /// Callbacks run one at a time on the spawned task. They must not block.
    pub fn spawn(mut self, mut events: mpsc::UnboundedReceiver<ThreadEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.dispatch(event);
            }
            debug!("Event stream ended");
        })
    }

    /// Drain `events` with one blocking thread per registered callback.
    ///
    /// A callback may block without holding up other channels. The returned
    /// handle completes once every lane has finished its backlog.
    pub fn spawn_per_channel(
        self,
        mut events: mpsc::UnboundedReceiver<ThreadEvent>,
    ) -> JoinHandle<()> {
        let message = Lane::start(self.on_message, "message");
        let reaction = Lane::start(self.on_reaction, "reaction");
        let typing = Lane::start(self.on_typing, "typing");
        let presence = Lane::start(self.on_presence, "presence");
        let signal = Lane::start(self.on_signal, "signal");
        let connection = Lane::start(self.on_connection_change, "connection");
        let errors = Lane::start(self.on_error, "error");

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ThreadEvent::Message(frame) => message.push(frame),
                    ThreadEvent::Reaction(frame) => reaction.push(frame),
                    ThreadEvent::Typing(frame) => typing.push(frame),
                    ThreadEvent::Presence(frame) => presence.push(frame),
                    ThreadEvent::Signal(frame) => signal.push(frame),
                    ThreadEvent::ConnectionChanged(open) => connection.push(open),
                    ThreadEvent::Error(e) => errors.push(e),
                }
            }
            debug!("Event stream ended, draining handler lanes");

            message.finish().await;
            reaction.finish().await;
            typing.finish().await;
            presence.finish().await;
            signal.finish().await;
            connection.finish().await;
            errors.finish().await;
        })
    }
}

/// One callback fed from its own queue on a blocking thread
struct Lane<T> {
    channel: &'static str,
    queue: Option<mpsc::UnboundedSender<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Lane<T> {
    fn start(handler: Option<Box<dyn FnMut(T) + Send>>, channel: &'static str) -> Self {
        let Some(handler) = handler else {
            return Self {
                channel,
                queue: None,
                worker: None,
            };
        };

        let (queue, mut rx) = mpsc::unbounded_channel();
        let worker = tokio::task::spawn_blocking(move || {
            let mut handler = Some(handler);
            while let Some(value) = rx.blocking_recv() {
                invoke(&mut handler, channel, value);
            }
        });

        Self {
            channel,
            queue: Some(queue),
            worker: Some(worker),
        }
    }

    fn push(&self, value: T) {
        match &self.queue {
            Some(queue) => {
                if queue.send(value).is_err() {
                    error!(channel = self.channel, "Handler lane stopped, event dropped");
                }
            }
            None => debug!(channel = self.channel, "No handler registered, event dropped"),
        }
    }

    async fn finish(mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            if worker.await.is_err() {
                error!(channel = self.channel, "Handler lane failed");
            }
        }
    }
}

fn invoke<T>(handler: &mut Option<Box<dyn FnMut(T) + Send>>, channel: &str, value: T) {
    let Some(handler) = handler.as_mut() else {
        debug!(channel, "No handler registered, event dropped");
        return;
    };

    if catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
        error!(channel, "Event handler panicked");
    }
}
