//! Error types for emk-core

use thiserror::Error;

/// Main error type for emk-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias for emk-core
pub type Result<T> = std::result::Result<T, Error>;
