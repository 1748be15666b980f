//! Background refresh scheduler
//!
//! Calls `RefreshController::refresh_all` on a fixed interval or at the
//! times of a cron expression. A refresh that is already running is never
//! interrupted: shutdown is only observed while waiting for the next run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule as CronSchedule;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use emk_core::RefreshConfig;

use crate::controller::{RefreshController, RefreshOutcome};
use crate::error::{Result, ScheduleError};

/// Running scheduler
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the scheduler, waiting for an in-flight refresh to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// When refreshes run
#[derive(Debug, Clone)]
pub enum Trigger {
    Interval(Duration),
    Cron {
        expr: String,
        schedule: Box<CronSchedule>,
    },
}

impl Trigger {
    /// Cron takes precedence over the interval when both are configured
    pub fn from_config(config: &RefreshConfig) -> Result<Self> {
        match config.cron.as_deref().map(str::trim) {
            Some(expr) if !expr.is_empty() => Self::cron(expr),
            _ => Ok(Self::Interval(config.interval())),
        }
    }

    pub fn cron(expr: &str) -> Result<Self> {
        Ok(Self::Cron {
            expr: expr.to_string(),
            schedule: Box::new(parse_cron(expr)?),
        })
    }

    /// Time to wait before the next run
    fn next_delay(&self) -> Result<Duration> {
        match self {
            Self::Interval(interval) => Ok(*interval),
            Self::Cron { expr, schedule } => {
                let now = Utc::now();
                let next = schedule
                    .upcoming(Utc)
                    .next()
                    .ok_or_else(|| ScheduleError::Exhausted(expr.clone()))?;
                Ok((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(interval) => write!(f, "every {}s", interval.as_secs()),
            Self::Cron { expr, .. } => write!(f, "cron '{}'", expr),
        }
    }
}

pub struct Scheduler {
    controller: Arc<RefreshController>,
    trigger: Trigger,
    on_startup: bool,
}

impl Scheduler {
    pub fn new(controller: Arc<RefreshController>, trigger: Trigger) -> Self {
        Self {
            controller,
            trigger,
            on_startup: false,
        }
    }

    pub fn from_config(controller: Arc<RefreshController>, config: &RefreshConfig) -> Result<Self> {
        Ok(Self::new(controller, Trigger::from_config(config)?).with_startup_refresh(config.on_startup))
    }

    /// Refresh once immediately before the first scheduled run
    pub fn with_startup_refresh(mut self, enabled: bool) -> Self {
        self.on_startup = enabled;
        self
    }

    /// Start the scheduler task
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        let handle = tokio::spawn(async move {
            info!("Refresh scheduler started ({})", self.trigger);

            if self.on_startup {
                run_refresh(&self.controller).await;
            }

            loop {
                let delay = match self.trigger.next_delay() {
                    Ok(delay) => delay,
                    Err(e) => {
                        warn!("Stopping scheduler: {}", e);
                        break;
                    }
                };
                info!("Next refresh in {}s", delay.as_secs());

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        run_refresh(&self.controller).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Shutdown requested");
                        break;
                    }
                }
            }

            info!("Refresh scheduler stopped");
        });

        SchedulerHandle {
            shutdown_tx,
            handle,
        }
    }
}

async fn run_refresh(controller: &RefreshController) {
    for (feed, outcome) in controller.refresh_all().await {
        match outcome {
            RefreshOutcome::Completed { records } => {
                info!(feed = %feed, records, "Scheduled refresh completed");
            }
            RefreshOutcome::Failed(message) => {
                warn!(feed = %feed, "Scheduled refresh failed: {}", message);
            }
            RefreshOutcome::Skipped => {
                info!(feed = %feed, "Scheduled refresh skipped");
            }
        }
    }
}

/// Parse a cron expression
///
/// Five-field expressions (`min hour day month weekday`) are accepted and
/// run at second zero.
fn parse_cron(expr: &str) -> Result<CronSchedule> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };

    normalized.parse::<CronSchedule>().map_err(|source| ScheduleError::Cron {
        expr: expr.to_string(),
        source,
    })
}
