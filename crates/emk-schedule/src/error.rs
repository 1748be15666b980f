//! Error types for emk-schedule

use thiserror::Error;

/// emk-schedule error type
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expr}': {source}")]
    Cron {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("Cron schedule '{0}' has no upcoming run")]
    Exhausted(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScheduleError>;
