//! Browser session management
//!
//! A `SessionHandle` owns at most one browser process and one page. It is
//! held by the refresh controller and never shared, so there are no hidden
//! globals: whoever holds the handle holds the browser.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use emk_core::SessionMode;

use crate::error::Result;
use crate::page::PortalPage;

/// Launches browser processes
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserProcess>>;
}

/// A running browser process
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    /// Whether the process is still reachable
    async fn is_connected(&self) -> bool;

    /// Open a new page in this browser
    async fn open_page(&self) -> Result<Arc<dyn PortalPage>>;

    /// Shut the process down
    async fn close(self: Box<Self>);
}

/// One live browser context
struct Session {
    process: Box<dyn BrowserProcess>,
    page: Arc<dyn PortalPage>,
    authenticated: bool,
    last_url: Option<String>,
}

/// Owner of the scraper's browser session
pub struct SessionHandle {
    driver: Arc<dyn BrowserDriver>,
    mode: SessionMode,
    session: Option<Session>,
}

impl SessionHandle {
    pub fn new(driver: Arc<dyn BrowserDriver>, mode: SessionMode) -> Self {
        Self {
            driver,
            mode,
            session: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Whether a browser is currently held
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Return the live page, launching a browser first if there is none or
    /// the held one has disconnected
    pub async fn acquire(&mut self) -> Result<Arc<dyn PortalPage>> {
        if let Some(session) = &self.session {
            if session.process.is_connected().await {
                debug!("Reusing browser session");
                return Ok(Arc::clone(&session.page));
            }

            warn!("Browser disconnected; dropping session and relaunching");
            self.release().await;
        }

        info!("Launching browser session ({:?})", self.mode);
        let process = self.driver.launch().await?;

        let page = match process.open_page().await {
            Ok(page) => page,
            Err(e) => {
                process.close().await;
                return Err(e);
            }
        };

        self.session = Some(Session {
            process,
            page: Arc::clone(&page),
            authenticated: false,
            last_url: None,
        });

        Ok(page)
    }

    /// Whether the held session has logged in
    pub fn is_authenticated(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.authenticated)
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        if let Some(session) = &mut self.session {
            session.authenticated = authenticated;
        }
    }

    /// Remember the page's URL after an operation
    pub fn record_url(&mut self, url: impl Into<String>) {
        if let Some(session) = &mut self.session {
            session.last_url = Some(url.into());
        }
    }

    pub fn last_url(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.last_url.as_deref())
    }

    /// Close the browser unconditionally
    pub async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Closing browser session");
            session.process.close().await;
        }
    }

    /// End of one logical operation: per-call sessions are closed, persistent
    /// sessions stay open
    pub async fn finish(&mut self) {
        if self.mode == SessionMode::PerCall {
            self.release().await;
        }
    }
}
