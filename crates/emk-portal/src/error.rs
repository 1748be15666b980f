//! Error types for emk-portal

use emk_browser::BrowserError;
use thiserror::Error;

/// emk-portal error type
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Login form not found: {0}")]
    LoginFormNotFound(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl PortalError {
    /// Whether the browser must be torn down before the next attempt
    pub fn requires_teardown(&self) -> bool {
        match self {
            Self::Authentication(_) | Self::LoginFormNotFound(_) => true,
            Self::Browser(e) => e.is_process_failure(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PortalError>;
