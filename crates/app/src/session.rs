//! Interactive session for one thread
//!
//! Owns the client, prints events as they arrive and turns terminal lines
//! into sends.

use std::time::Duration;

use serde_json::Value;
use tellerline_net::{ClientConfig, Handlers, InboundFrame, ThreadClient, WsConnector};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::{self, Command};

/// How long to wait for the last events after quitting
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Session {
    client: ThreadClient,
    printer: JoinHandle<()>,
}

impl Session {
    /// Create the client, start printing its events and connect
    pub fn start(config: ClientConfig) -> Self {
        let (client, events) = ThreadClient::new(config, WsConnector);
        let printer = printing_handlers().spawn(events);

        info!(thread_id = %client.thread_id(), user_id = %client.user_id(), "Session started");
        client.connect();

        Self { client, printer }
    }

    /// Read commands from stdin until `/quit` or end of input
    pub async fn run(self) -> anyhow::Result<()> {
        let Session { client, printer } = self;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            match command::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(cmd) => execute(&client, cmd),
                Err(e) => println!("! {}", e),
            }
        }

        client.disconnect();
        drop(client);
        if tokio::time::timeout(DRAIN_TIMEOUT, printer).await.is_err() {
            debug!("Event printer still running at exit");
        }
        Ok(())
    }
}

fn execute(client: &ThreadClient, cmd: Command) {
    let sent = match cmd {
        Command::Say(text) => client.send_message(&text),
        Command::Typing(on) => client.send_typing(on),
        Command::Offer(user, offer) => client.send_call_offer(&user, offer),
        Command::Answer(user, answer) => client.send_call_answer(&user, answer),
        Command::Candidate(user, candidate) => client.send_ice_candidate(&user, candidate),
        Command::End(user) => client.send_call_end(&user),
        Command::Busy(user) => client.send_call_busy(&user),
        Command::Reconnect => {
            client.connect();
            return;
        }
        Command::Quit | Command::Nothing => return,
    };

    if !sent {
        println!("! message not sent, retry");
    }
}

fn printing_handlers() -> Handlers {
    Handlers::new()
        .on_message(|frame| println!("{}", summarize(&frame)))
        .on_reaction(|frame| println!("{}", summarize(&frame)))
        .on_typing(|frame| println!("{}", summarize(&frame)))
        .on_presence(|frame| println!("{}", summarize(&frame)))
        .on_signal(|frame| println!("{}", summarize(&frame)))
        .on_connection_change(|open| {
            println!("* {}", if open { "connected" } else { "disconnected" })
        })
        .on_error(|e| println!("! {}", e))
}

/// One-line rendering of an inbound frame
fn summarize(frame: &InboundFrame) -> String {
    let time = frame.received_at.format("%H:%M:%S");
    let who = frame
        .sender_id()
        .or_else(|| frame.str_field("user_id"))
        .or_else(|| frame.str_field("sender"))
        .unwrap_or("?");

    match frame.str_field("content") {
        Some(content) => format!("[{}] {} {}: {}", time, frame.kind, who, content),
        None => {
            let mut rest = frame.payload.clone();
            rest.remove("type");
            format!("[{}] {} {}: {}", time, frame.kind, who, Value::Object(rest))
        }
    }
}
