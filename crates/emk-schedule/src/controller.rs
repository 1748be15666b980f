//! Refresh controller
//!
//! Owns the browser session and serializes every use of it. A refresh that
//! finds the session busy is skipped rather than queued, so at most one
//! sequence of navigations is ever in flight.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use emk_browser::{BrowserDriver, SessionHandle};
use emk_core::{Config, Feed, FeedCache};
use emk_portal::{Authenticator, FeedExtractor, HomeworkExtractor, MessagesExtractor, PortalError};

/// What one feed refresh did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New records were stored
    Completed { records: usize },
    /// The cache now holds the error diagnostic
    Failed(String),
    /// Another refresh held the session; nothing was done
    Skipped,
}

pub struct RefreshController {
    cache: FeedCache,
    session: Mutex<SessionHandle>,
    auth: Authenticator,
    extractors: Vec<Arc<dyn FeedExtractor>>,
}

impl RefreshController {
    /// Controller with no extractors and a fresh cache
    pub fn new(session: SessionHandle, auth: Authenticator) -> Self {
        Self {
            cache: FeedCache::new(),
            session: Mutex::new(session),
            auth,
            extractors: Vec::new(),
        }
    }

    /// Controller for every feed, wired from configuration
    pub fn from_config(config: &Config, driver: Arc<dyn BrowserDriver>) -> Self {
        let session = SessionHandle::new(driver, config.browser.session_mode);
        let auth = Authenticator::new(
            config.portal.clone(),
            config.credentials.clone(),
            config.settle.login(),
        );

        Self::new(session, auth)
            .with_extractor(Arc::new(HomeworkExtractor::new(
                &config.portal,
                config.settle.clone(),
            )))
            .with_extractor(Arc::new(MessagesExtractor::new(
                &config.portal,
                config.settle.clone(),
            )))
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeedExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Shared handle to the cache this controller writes
    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    /// Refresh one feed
    pub async fn refresh(&self, feed: Feed) -> RefreshOutcome {
        let Some(extractor) = self.extractors.iter().find(|e| e.feed() == feed) else {
            warn!("No extractor registered for {}", feed);
            return RefreshOutcome::Failed(format!("no extractor for {}", feed));
        };

        let Some(mut session) = self.try_session() else {
            return RefreshOutcome::Skipped;
        };

        let outcome = self.refresh_locked(&mut session, extractor.as_ref()).await;
        session.finish().await;
        outcome
    }

    /// Refresh every registered feed, one after another, on one session
    pub async fn refresh_all(&self) -> Vec<(Feed, RefreshOutcome)> {
        let Some(mut session) = self.try_session() else {
            return self
                .extractors
                .iter()
                .map(|e| (e.feed(), RefreshOutcome::Skipped))
                .collect();
        };

        let mut outcomes = Vec::with_capacity(self.extractors.len());
        for extractor in &self.extractors {
            let outcome = self.refresh_locked(&mut session, extractor.as_ref()).await;
            outcomes.push((extractor.feed(), outcome));
        }

        session.finish().await;
        outcomes
    }

    /// Close the browser, waiting for an in-flight refresh first
    pub async fn shutdown(&self) {
        self.session.lock().await.release().await;
    }

    fn try_session(&self) -> Option<MutexGuard<'_, SessionHandle>> {
        match self.session.try_lock() {
            Ok(session) => Some(session),
            Err(_) => {
                info!("Refresh already in progress; skipping");
                None
            }
        }
    }

    async fn refresh_locked(
        &self,
        session: &mut SessionHandle,
        extractor: &dyn FeedExtractor,
    ) -> RefreshOutcome {
        let feed = extractor.feed();
        info!(feed = %feed, "Refreshing feed");
        self.cache.mark_refreshing(feed);

        match self.extract(session, extractor).await {
            Ok(records) => {
                let count = records.len();
                self.cache.complete(feed, records, Utc::now());
                info!(feed = %feed, records = count, "Feed refreshed");
                RefreshOutcome::Completed { records: count }
            }
            Err(e) => {
                error!(feed = %feed, "Feed refresh failed: {}", e);
                if e.requires_teardown() {
                    warn!("Tearing down browser session after {}", e);
                    session.release().await;
                }
                let message = e.to_string();
                self.cache.fail(feed, &message);
                RefreshOutcome::Failed(message)
            }
        }
    }

    async fn extract(
        &self,
        session: &mut SessionHandle,
        extractor: &dyn FeedExtractor,
    ) -> Result<Vec<String>, PortalError> {
        let page = session.acquire().await?;

        if !session.is_authenticated() {
            self.auth.login(page.as_ref()).await?;
            session.set_authenticated(true);
        }

        let records = extractor.extract(page.as_ref(), &self.auth).await?;
        session.record_url(page.url().await?);
        Ok(records)
    }
}
