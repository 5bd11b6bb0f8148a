//! Tellerline Core Library
//!
//! Identifiers and settings shared by the messaging client and its hosts.

pub mod error;
pub mod ids;
pub mod settings;

pub use error::{Error, Result};
pub use ids::{ThreadId, UserId};
pub use settings::{Environment, LogFormat, LoggingSettings, MessagingSettings, Settings};
