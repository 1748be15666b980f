//! emk-schedule: Feed refresh
//!
//! `RefreshController` runs the extractors against the browser session and
//! writes the results into the `FeedCache`. `Scheduler` calls it on a fixed
//! interval or a cron schedule until stopped.

pub mod controller;
pub mod error;
pub mod scheduler;

pub use controller::{RefreshController, RefreshOutcome};
pub use error::{Result, ScheduleError};
pub use scheduler::{Scheduler, SchedulerHandle, Trigger};
