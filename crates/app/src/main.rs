//! Tellerline - terminal client for back-office thread messaging
//!
//! Joins one conversation thread, prints what arrives and sends what is
//! typed. Call signaling is relayed as raw JSON.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tellerline_core::{Environment, LogFormat, LoggingSettings, Settings, ThreadId, UserId};
use tellerline_net::{ClientConfig, SessionCookie};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

mod command;
mod session;

use session::Session;

/// Environment variable carrying the session cookie
const COOKIE_ENV: &str = "TELLERLINE_SESSION_COOKIE";

#[derive(Debug, Parser)]
#[command(name = "tellerline", version, about = "Thread messaging client")]
struct Args {
    /// Conversation thread to join
    #[arg(long, env = "TELLERLINE_THREAD")]
    thread: ThreadId,

    /// Your user id, stamped on outgoing call signaling
    #[arg(long, env = "TELLERLINE_USER")]
    user: UserId,

    /// Settings file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Page origin the messaging endpoint is derived from
    #[arg(long)]
    origin: Option<Url>,

    /// Explicit development endpoint; switches to development mode
    #[arg(long, conflicts_with = "origin")]
    dev_endpoint: Option<Url>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings =
        Settings::load_or_default(args.config.as_deref()).context("Failed to load settings")?;
    init_logging(&settings.logging);

    tracing::info!("Starting Tellerline");

    if let Some(origin) = args.origin {
        settings.messaging.environment = Environment::Deployed;
        settings.messaging.origin = Some(origin);
    }
    if let Some(endpoint) = args.dev_endpoint {
        settings.messaging.environment = Environment::Development;
        settings.messaging.dev_endpoint = Some(endpoint);
    }

    let mut config = ClientConfig::from_settings(&settings.messaging, args.thread, args.user)
        .context("Invalid messaging settings")?;

    match std::env::var(COOKIE_ENV) {
        Ok(cookie) if !cookie.is_empty() => {
            config = config.with_cookie(SessionCookie::new(cookie));
        }
        _ => tracing::warn!("{} not set, connecting without a session", COOKIE_ENV),
    }

    Session::start(config).run().await
}

/// `RUST_LOG` wins over the configured filter. Logs go to stderr so they
/// don't interleave with the conversation.
fn init_logging(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
