//! Error types for emk-browser

use thiserror::Error;

/// emk-browser error type
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser initialization failed: {0}")]
    Initialization(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Tab error: {0}")]
    TabError(String),

    /// A call outlived its deadline and was left running on the page
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Browser disconnected: {0}")]
    Disconnected(String),
}

impl BrowserError {
    /// Whether the browser process itself is unusable
    ///
    /// A timed-out call may still be driving the tab, so the page counts
    /// as lost along with it.
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            Self::Initialization(_) | Self::TabError(_) | Self::Timeout(_) | Self::Disconnected(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BrowserError>;
