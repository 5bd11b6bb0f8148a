//! Error types for Tellerline Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
