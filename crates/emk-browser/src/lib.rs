//! emk-browser: Browser session handling for emk-gateway
//!
//! Owns the single automated browser used to scrape the portal.
//!
//! ## Features
//!
//! - Headless Chromium via the headless_chrome crate
//! - `PortalPage` trait with the handful of DOM primitives the scrapers need
//! - `SessionHandle` with per-call and persistent session lifetimes
//! - Liveness watchdog that notices a crashed browser between refreshes
//! - Scripted in-memory portal for tests (`testing` feature)

pub mod chrome;
pub mod error;
pub mod page;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use chrome::ChromeDriver;
pub use emk_core::{BrowserConfig, SessionMode};
pub use error::{BrowserError, Result};
pub use page::PortalPage;
pub use session::{BrowserDriver, BrowserProcess, SessionHandle};
