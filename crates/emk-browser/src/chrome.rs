//! Headless Chromium backend
//!
//! headless_chrome is synchronous, so every call runs on the blocking pool
//! under a timeout. DOM reads go through small scripts that return JSON
//! strings, which keeps the results independent of how the CDP remote
//! object is serialized.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use emk_core::BrowserConfig;

use crate::error::{BrowserError, Result};
use crate::page::PortalPage;
use crate::session::{BrowserDriver, BrowserProcess};

/// Launches Chromium with a sandbox-free argument set suitable for
/// containers and restricted servers
pub struct ChromeDriver {
    config: BrowserConfig,
}

impl ChromeDriver {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn launch(&self) -> Result<Box<dyn BrowserProcess>> {
        let config = self.config.clone();
        let browser = tokio::task::spawn_blocking(move || launch_browser(&config))
            .await
            .map_err(|e| BrowserError::Initialization(format!("Launch task failed: {}", e)))??;

        Ok(Box::new(ChromeProcess::start(browser, self.config.clone())))
    }
}

fn launch_browser(config: &BrowserConfig) -> Result<Browser> {
    info!("Creating browser session (headless: {})", config.headless);

    let args: Vec<String> = vec![
        format!("--window-size={},{}", config.width, config.height),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--no-first-run".to_string(),
        "--no-zygote".to_string(),
    ];
    let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

    let launch_options = LaunchOptionsBuilder::default()
        .headless(config.headless)
        .sandbox(false)
        .window_size(Some((config.width, config.height)))
        .path(config.executable_path.as_ref().map(PathBuf::from))
        .idle_browser_timeout(Duration::from_secs(600))
        .args(os_args)
        .build()
        .map_err(|e| {
            BrowserError::Initialization(format!("Failed to build launch options: {}", e))
        })?;

    let browser = Browser::new(launch_options)
        .map_err(|e| BrowserError::Initialization(format!("Failed to launch browser: {}", e)))?;

    info!("Browser session created successfully");
    Ok(browser)
}

/// A running Chromium process plus its liveness watchdog
struct ChromeProcess {
    browser: Arc<Browser>,
    connected: Arc<AtomicBool>,
    watchdog: JoinHandle<()>,
    config: BrowserConfig,
}

impl ChromeProcess {
    fn start(browser: Browser, config: BrowserConfig) -> Self {
        let browser = Arc::new(browser);
        let connected = Arc::new(AtomicBool::new(true));
        let watchdog = tokio::spawn(watch_browser(
            Arc::downgrade(&browser),
            Arc::clone(&connected),
            config.watchdog_interval(),
        ));

        Self {
            browser,
            connected,
            watchdog,
            config,
        }
    }
}

/// Probe the browser periodically and clear `connected` once it stops
/// answering. Ends when the browser is dropped.
async fn watch_browser(browser: Weak<Browser>, connected: Arc<AtomicBool>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let Some(browser) = browser.upgrade() else {
            return;
        };

        let alive = tokio::task::spawn_blocking(move || browser.get_version().is_ok())
            .await
            .unwrap_or(false);

        if !alive {
            warn!("Browser stopped responding to liveness probe");
            connected.store(false, Ordering::SeqCst);
            return;
        }
    }
}

#[async_trait]
impl BrowserProcess for ChromeProcess {
    async fn is_connected(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }

        let browser = Arc::clone(&self.browser);
        let probe = tokio::task::spawn_blocking(move || browser.get_version().is_ok());
        let alive = matches!(
            tokio::time::timeout(self.config.element_timeout(), probe).await,
            Ok(Ok(true))
        );

        if !alive {
            self.connected.store(false, Ordering::SeqCst);
        }
        alive
    }

    async fn open_page(&self) -> Result<Arc<dyn PortalPage>> {
        let browser = Arc::clone(&self.browser);
        let navigation_timeout = self.config.navigation_timeout();

        let tab = tokio::task::spawn_blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::TabError(format!("Failed to create new tab: {}", e)))?;
            tab.set_default_timeout(navigation_timeout);
            Ok::<_, BrowserError>(tab)
        })
        .await
        .map_err(|e| BrowserError::TabError(format!("Tab task failed: {}", e)))??;

        info!("Created new tab");
        Ok(Arc::new(ChromePage::new(
            tab,
            Arc::downgrade(&self.browser),
            Arc::clone(&self.connected),
            &self.config,
        )))
    }

    async fn close(self: Box<Self>) {
        self.watchdog.abort();
        let browser = self.browser;
        // Dropping the last handle kills the child process.
        let _ = tokio::task::spawn_blocking(move || drop(browser)).await;
    }
}

/// Interval between checks for a submitted form replacing the document
const SUBMIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Set by the submit click; gone once the browser loads the next document
const SUBMIT_MARKER: &str = "window.__emkSubmitPending";

/// One Chromium tab
///
/// Shares the process's `connected` flag with the watchdog. Once the flag
/// is cleared every operation fails with `Disconnected`.
struct ChromePage {
    tab: Arc<Tab>,
    browser: Weak<Browser>,
    connected: Arc<AtomicBool>,
    navigation_timeout: Duration,
    element_timeout: Duration,
}

impl ChromePage {
    fn new(
        tab: Arc<Tab>,
        browser: Weak<Browser>,
        connected: Arc<AtomicBool>,
        config: &BrowserConfig,
    ) -> Self {
        Self {
            tab,
            browser,
            connected,
            navigation_timeout: config.navigation_timeout(),
            element_timeout: config.element_timeout(),
        }
    }

    fn ensure_connected(&self, what: &str) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrowserError::Disconnected(format!(
                "{} refused: browser is no longer connected",
                what
            )))
        }
    }

    /// Run a blocking tab operation on the blocking pool under `timeout`
    ///
    /// A call that misses its deadline keeps running on the pool, so the
    /// page is marked disconnected and never driven again.
    async fn run<T, F>(&self, what: &str, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_connected(what)?;

        let tab = Arc::clone(&self.tab);
        let task = tokio::task::spawn_blocking(move || f(tab.as_ref()));

        let err = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(e))) => e,
            Ok(Err(e)) => BrowserError::Interaction(format!("{} task failed: {}", what, e)),
            Err(_) => {
                warn!("{} did not finish within {:?}; abandoning the page", what, timeout);
                self.connected.store(false, Ordering::SeqCst);
                return Err(BrowserError::Timeout(format!(
                    "{} did not finish within {:?}",
                    what, timeout
                )));
            }
        };

        let alive = err.is_process_failure() || self.is_alive().await;
        Err(classify_failure(err, alive))
    }

    /// Ask the browser for its version, clearing `connected` when it is gone
    async fn is_alive(&self) -> bool {
        let Some(browser) = self.browser.upgrade() else {
            self.connected.store(false, Ordering::SeqCst);
            return false;
        };

        let version = tokio::task::spawn_blocking(move || browser.get_version().is_ok());
        let alive = matches!(
            tokio::time::timeout(self.element_timeout, version).await,
            Ok(Ok(true))
        );

        if !alive {
            warn!("Browser stopped responding after a failed page operation");
            self.connected.store(false, Ordering::SeqCst);
        }
        alive
    }

    /// Evaluate a script that returns `JSON.stringify(..)` and parse the result
    async fn eval_json(&self, what: &str, script: String) -> Result<Value> {
        self.run(what, self.element_timeout, move |tab| eval_json(tab, &script))
            .await
    }
}

/// Page-level errors raised while the browser is gone are process failures
fn classify_failure(err: BrowserError, alive: bool) -> BrowserError {
    if alive || err.is_process_failure() {
        err
    } else {
        BrowserError::Disconnected(err.to_string())
    }
}

/// Poll `pending` until it reports `Some(false)` or `timeout` elapses
///
/// `None` means the check itself failed, which happens while the old
/// document is being torn down, so polling continues.
fn wait_for_document_swap(
    mut pending: impl FnMut() -> Option<bool>,
    timeout: Duration,
    interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pending() == Some(false) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(interval);
    }
}

fn eval_json(tab: &Tab, script: &str) -> Result<Value> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| BrowserError::Extraction(format!("JavaScript execution failed: {}", e)))?;

    match result.value {
        Some(Value::String(json)) => serde_json::from_str(&json)
            .map_err(|e| BrowserError::Extraction(format!("Unexpected script result: {}", e))),
        other => Err(BrowserError::Extraction(format!(
            "Script did not return a JSON string: {:?}",
            other
        ))),
    }
}

/// Quote a string as a JavaScript literal
fn js_str(value: &str) -> String {
    Value::from(value).to_string()
}

fn texts_script(selector: &str) -> String {
    format!(
        "JSON.stringify(Array.from(document.querySelectorAll({})).map(el => (el.innerText || '').trim()))",
        js_str(selector)
    )
}

fn click_nth_script(selector: &str, index: usize) -> String {
    format!(
        "JSON.stringify((() => {{ const el = document.querySelectorAll({})[{}]; \
         if (!el) return false; el.click(); return true; }})())",
        js_str(selector),
        index
    )
}

/// Click like `click_nth_script`, but tag the current document first so the
/// caller can tell when the form post has replaced it
fn submit_nth_script(selector: &str, index: usize) -> String {
    format!(
        "JSON.stringify((() => {{ const el = document.querySelectorAll({})[{}]; \
         if (!el) return false; {} = true; el.click(); return true; }})())",
        js_str(selector),
        index,
        SUBMIT_MARKER
    )
}

fn submit_pending_script() -> String {
    format!("JSON.stringify({} === true)", SUBMIT_MARKER)
}

fn click_text_script(selector: &str, text: &str) -> String {
    format!(
        "JSON.stringify((() => {{ const el = Array.from(document.querySelectorAll({})) \
         .find(e => (e.innerText || '').trim() === {}); \
         if (!el) return false; el.click(); return true; }})())",
        js_str(selector),
        js_str(text)
    )
}

#[async_trait]
impl PortalPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        info!("Navigating to: {}", url);
        let target = url.to_string();

        self.run("Navigation", self.navigation_timeout, move |tab| {
            tab.navigate_to(&target)
                .map_err(|e| BrowserError::Navigation(format!("Failed to navigate to {}: {}", target, e)))?;
            tab.wait_until_navigated()
                .map_err(|e| BrowserError::Navigation(format!("Navigation timeout: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn url(&self) -> Result<String> {
        self.ensure_connected("URL read")?;
        Ok(self.tab.get_url())
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let value = self.eval_json("Text query", texts_script(selector)).await?;
        let texts: Vec<String> = serde_json::from_value(value)
            .map_err(|e| BrowserError::Extraction(format!("Unexpected text list: {}", e)))?;
        debug!("Extracted {} elements for: {}", texts.len(), selector);
        Ok(texts)
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<bool> {
        let value = self
            .eval_json("Click", click_nth_script(selector, index))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click_text(&self, selector: &str, text: &str) -> Result<bool> {
        let value = self
            .eval_json("Click", click_text_script(selector, text))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn fill_nth(&self, selector: &str, index: usize, value: &str) -> Result<bool> {
        if self.count(selector).await? <= index {
            return Ok(false);
        }

        debug!("Typing into element: {} #{} ({} chars)", selector, index, value.chars().count());
        let selector = selector.to_string();
        let value = value.to_string();

        self.run("Typing", self.element_timeout, move |tab| {
            let elements = tab.find_elements(&selector).map_err(|e| {
                BrowserError::Interaction(format!("Element '{}' not found: {}", selector, e))
            })?;
            let Some(element) = elements.get(index) else {
                return Ok(false);
            };

            element.click().map_err(|e| {
                BrowserError::Interaction(format!("Failed to focus '{}': {}", selector, e))
            })?;
            element
                .call_js_fn(
                    "function() { this.focus(); if (this.select) { this.select(); } }",
                    vec![],
                    false,
                )
                .map_err(|e| {
                    BrowserError::Interaction(format!("Failed to select '{}': {}", selector, e))
                })?;
            tab.type_str(&value).map_err(|e| {
                BrowserError::Interaction(format!("Failed to type into '{}': {}", selector, e))
            })?;
            Ok(true)
        })
        .await
    }

    async fn submit_nth(&self, selector: &str, index: usize) -> Result<bool> {
        let clicked = self
            .eval_json("Submit", submit_nth_script(selector, index))
            .await?;
        if !clicked.as_bool().unwrap_or(false) {
            return Ok(false);
        }

        let swap_timeout = self.navigation_timeout;
        let script = submit_pending_script();

        // The swap wait and the load wait each take up to the navigation timeout.
        self.run("Submit navigation", self.navigation_timeout * 2, move |tab| {
            let swapped = wait_for_document_swap(
                || eval_json(tab, &script).ok().and_then(|v| v.as_bool()),
                swap_timeout,
                SUBMIT_POLL_INTERVAL,
            );
            if !swapped {
                debug!("Submit did not load a new document");
                return Ok(());
            }

            tab.wait_until_navigated()
                .map_err(|e| BrowserError::Navigation(format!("Navigation timeout: {}", e)))?;
            Ok(())
        })
        .await?;

        Ok(true)
    }
}
