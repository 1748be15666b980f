//! emk-gateway: portal feed scraper
//!
//! Keeps the homework and messages feeds of the school portal cached for
//! prompt embedding.
//!
//! Usage:
//!   emk-gateway                - Refresh on schedule until Ctrl+C
//!   emk-gateway --once         - Refresh once and print the cache
//!   emk-gateway --once --json  - Same, as JSON
//!   emk-gateway --help         - Show help

mod output;

use std::sync::Arc;

use emk_browser::ChromeDriver;
use emk_core::Config;
use emk_schedule::{RefreshController, RefreshOutcome, Scheduler};
use tracing_subscriber::EnvFilter;

use crate::output::CacheReport;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Scheduled refresh until Ctrl+C
    Serve,
    /// One refresh, then print the cache
    Once { json: bool },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args(std::env::args().skip(1));

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("emk-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Logs go to stderr so `--once` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting emk-gateway...");
    tracing::info!("Portal: {}", config.portal.base_url);
    tracing::info!("Session mode: {:?}", config.browser.session_mode);

    let driver = Arc::new(ChromeDriver::new(config.browser.clone()));
    let controller = Arc::new(RefreshController::from_config(&config, driver));

    let result = match mode {
        RunMode::Once { json } => run_once(&controller, json).await,
        RunMode::Serve => run_server(&config, Arc::clone(&controller)).await,
        _ => Ok(()),
    };

    controller.shutdown().await;
    result
}

/// Parse command line arguments
fn parse_args(args: impl Iterator<Item = String>) -> RunMode {
    let mut once = false;
    let mut json = false;

    for arg in args {
        match arg.as_str() {
            "--once" | "-1" => once = true,
            "--json" => json = true,
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    if once {
        RunMode::Once { json }
    } else {
        RunMode::Serve
    }
}

/// Print help message
fn print_help() {
    println!("emk-gateway - School portal feed scraper");
    println!();
    println!("Usage:");
    println!("  emk-gateway                Refresh on schedule until Ctrl+C");
    println!("  emk-gateway --once         Refresh once and print the cached feeds");
    println!("  emk-gateway --once --json  Same, as JSON");
    println!("  emk-gateway --help         Show this help message");
    println!("  emk-gateway --version      Show version");
    println!();
    println!("Configuration is read from emk-gateway.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  K12_USERNAME            Portal username");
    println!("  K12_PASSWORD            Portal password");
    println!("  K12_BASE_URL            Portal address (default: https://evrensel.k12net.com)");
    println!("  K12_MAX_RECORDS         Records kept per feed (default: 20)");
    println!("  CHROME_EXECUTABLE_PATH  Browser binary (default: /usr/bin/chromium)");
    println!("  BROWSER_HEADLESS        Run the browser headless (default: true)");
    println!("  BROWSER_SESSION_MODE    per_call or persistent (default: per_call)");
    println!("  REFRESH_ENABLED         Run the scheduler (default: true)");
    println!("  REFRESH_INTERVAL_SECS   Seconds between refreshes (default: 1800)");
    println!("  REFRESH_CRON            cron expression, overrides the interval");
    println!("  RUST_LOG                Log filter");
}

/// Refresh every feed once and print the cache to stdout
async fn run_once(controller: &RefreshController, json: bool) -> anyhow::Result<()> {
    let outcomes = controller.refresh_all().await;
    let failed = outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, RefreshOutcome::Failed(_)))
        .count();
    if failed > 0 {
        tracing::warn!("{} of {} feeds failed to refresh", failed, outcomes.len());
    }

    if json {
        println!("{}", CacheReport::from_cache(controller.cache()).to_json()?);
    } else {
        println!("{}", controller.cache().render());
    }
    Ok(())
}

/// Run the refresh scheduler until Ctrl+C
async fn run_server(config: &Config, controller: Arc<RefreshController>) -> anyhow::Result<()> {
    if !config.refresh.enabled {
        tracing::info!("Scheduled refresh is disabled; refreshing once");
        run_once(&controller, false).await?;
        return Ok(());
    }

    let scheduler = Scheduler::from_config(Arc::clone(&controller), &config.refresh)
        .map_err(|e| anyhow::anyhow!("Scheduler error: {}", e))?;
    let handle = scheduler.start();

    tracing::info!("emk-gateway initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    handle.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RunMode {
        parse_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse(&[]), RunMode::Serve);
        assert_eq!(parse(&["--once"]), RunMode::Once { json: false });
        assert_eq!(parse(&["--json", "--once"]), RunMode::Once { json: true });
        assert_eq!(parse(&["--json"]), RunMode::Serve);
        assert_eq!(parse(&["--once", "--help"]), RunMode::Help);
        assert_eq!(parse(&["-v"]), RunMode::Version);
    }
}
