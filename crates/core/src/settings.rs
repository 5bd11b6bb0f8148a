//! Settings file schema and loader
//!
//! Settings are plain TOML. Every field has a default, so an absent file or
//! an empty one is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Settings file name inside the platform config directory
pub const SETTINGS_FILE: &str = "tellerline.toml";

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub messaging: MessagingSettings,
    pub logging: LoggingSettings,
}

/// Where the messaging endpoint comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Same origin as the page that hosts the session
    #[default]
    Deployed,
    /// Explicit endpoint, e.g. a local dev server
    Development,
}

/// Messaging connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingSettings {
    pub environment: Environment,
    /// Page origin used in deployed mode
    pub origin: Option<Url>,
    /// Endpoint used in development mode
    pub dev_endpoint: Option<Url>,
    pub heartbeat_interval_secs: u64,
    /// Defaults to twice the heartbeat interval
    pub pong_timeout_secs: Option<u64>,
    pub backoff_base_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Deployed,
            origin: None,
            dev_endpoint: None,
            heartbeat_interval_secs: 30,
            pong_timeout_secs: None,
            backoff_base_ms: 1000,
            max_reconnect_attempts: 5,
        }
    }
}

impl MessagingSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        match self.pong_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.heartbeat_interval() * 2,
        }
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// The base URL selected by `environment`
    pub fn endpoint_base(&self) -> Result<&Url> {
        let (url, key) = match self.environment {
            Environment::Deployed => (self.origin.as_ref(), "messaging.origin"),
            Environment::Development => (self.dev_endpoint.as_ref(), "messaging.dev_endpoint"),
        };
        url.ok_or_else(|| Error::InvalidSetting(format!("{} is not set", key)))
    }

    fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(Error::InvalidSetting(
                "messaging.heartbeat_interval_secs must be positive".into(),
            ));
        }
        if self.pong_timeout() < self.heartbeat_interval() {
            return Err(Error::InvalidSetting(
                "messaging.pong_timeout_secs must not be shorter than the heartbeat interval"
                    .into(),
            ));
        }
        if self.backoff_base_ms == 0 {
            return Err(Error::InvalidSetting(
                "messaging.backoff_base_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Parse and validate settings from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.messaging.validate()?;
        Ok(settings)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `path`, or from the default location if none is given.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading settings");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Default settings path in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "tellerline", "tellerline")
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.messaging.environment, Environment::Deployed);
        assert_eq!(settings.messaging.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(settings.messaging.pong_timeout(), Duration::from_secs(60));
        assert_eq!(settings.messaging.backoff_base(), Duration::from_millis(1000));
        assert_eq!(settings.messaging.max_reconnect_attempts, 5);
        assert_eq!(settings.logging.filter, "info");
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_full_settings() {
        let toml = r#"
[messaging]
environment = "development"
origin = "https://bank.example"
dev_endpoint = "ws://127.0.0.1:8000"
heartbeat_interval_secs = 10
pong_timeout_secs = 25
backoff_base_ms = 500
max_reconnect_attempts = 3

[logging]
filter = "tellerline_net=debug"
format = "json"
"#;
        let settings = Settings::from_toml(toml).unwrap();
        let m = &settings.messaging;
        assert_eq!(m.environment, Environment::Development);
        assert_eq!(m.endpoint_base().unwrap().as_str(), "ws://127.0.0.1:8000/");
        assert_eq!(m.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(m.pong_timeout(), Duration::from_secs(25));
        assert_eq!(m.backoff_base(), Duration::from_millis(500));
        assert_eq!(m.max_reconnect_attempts, 3);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_endpoint_base_requires_selected_url() {
        let settings = Settings::from_toml(
            r#"
[messaging]
dev_endpoint = "ws://127.0.0.1:8000"
"#,
        )
        .unwrap();
        // Deployed mode ignores the dev endpoint
        assert!(settings.messaging.endpoint_base().is_err());
    }

    #[test]
    fn test_rejects_bad_timings() {
        assert!(Settings::from_toml("[messaging]\nheartbeat_interval_secs = 0").is_err());
        assert!(Settings::from_toml("[messaging]\nbackoff_base_ms = 0").is_err());
        assert!(Settings::from_toml(
            "[messaging]\nheartbeat_interval_secs = 30\npong_timeout_secs = 10"
        )
        .is_err());
        assert!(Settings::from_toml("[messaging]\norigin = \"not a url\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[messaging]\norigin = \"https://bank.example\"").unwrap();

        let settings = Settings::load_or_default(Some(file.path())).unwrap();
        assert_eq!(
            settings.messaging.endpoint_base().unwrap().as_str(),
            "https://bank.example/"
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Settings::load_or_default(Some(&missing)),
            Err(Error::Io(_))
        ));
    }
}
