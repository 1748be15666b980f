//! Scripted in-memory portal
//!
//! A stand-in for the real browser used by tests. It models just enough of
//! the portal: a login form, redirects to the login page while logged out,
//! forced session expiry, views with selector → text tables, a navigation
//! link that swaps in a panel, and a summary list whose items open a detail
//! view until its close button is clicked. The connection can also be made
//! to drop partway through a detail walk.
//!
//! Every `goto` is recorded so tests can assert navigation order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BrowserError, Result};
use crate::page::PortalPage;
use crate::session::{BrowserDriver, BrowserProcess};

/// Shape of the login form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginForm {
    /// `#username`, `#password`, `#loginButton`
    Ids,
    /// Unnamed inputs; only positional lookups work
    Positional,
    /// No form at all
    Missing,
}

/// Detail views opened from a summary list
#[derive(Debug, Clone)]
pub struct ScriptedDetails {
    pub summary_selector: String,
    pub detail_selector: String,
    pub close_label: String,
    /// Detail text per summary item; `None` renders no detail view
    pub details: Vec<Option<String>>,
}

/// One portal view
#[derive(Debug, Clone, Default)]
pub struct ScriptedView {
    elements: HashMap<String, Vec<String>>,
    panels: HashMap<String, HashMap<String, Vec<String>>>,
    details: Option<ScriptedDetails>,
}

impl ScriptedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements matching `selector`
    pub fn with(mut self, selector: &str, texts: &[&str]) -> Self {
        self.elements.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Elements shown after clicking the link labelled `label`
    pub fn with_panel(mut self, label: &str, selector: &str, texts: &[&str]) -> Self {
        self.panels.entry(label.to_string()).or_default().insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Summary list plus one detail view per item
    pub fn with_details(
        mut self,
        summary_selector: &str,
        detail_selector: &str,
        close_label: &str,
        details: Vec<Option<String>>,
    ) -> Self {
        let titles: Vec<String> = (1..=details.len()).map(|i| format!("Ödev {}", i)).collect();
        self.elements.insert(summary_selector.to_string(), titles);
        self.details = Some(ScriptedDetails {
            summary_selector: summary_selector.to_string(),
            detail_selector: detail_selector.to_string(),
            close_label: close_label.to_string(),
            details,
        });
        self
    }
}

/// The simulated portal
#[derive(Debug, Clone)]
pub struct ScriptedSite {
    pub base_url: String,
    pub login_path: String,
    pub home_path: String,
    pub username: String,
    pub password: String,
    pub form: LoginForm,
    views: HashMap<String, ScriptedView>,
}

impl Default for ScriptedSite {
    fn default() -> Self {
        Self {
            base_url: "https://portal.test".to_string(),
            login_path: "/Login.aspx".to_string(),
            home_path: "/Home".to_string(),
            username: "student".to_string(),
            password: "secret".to_string(),
            form: LoginForm::Ids,
            views: HashMap::new(),
        }
    }
}

impl ScriptedSite {
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }

    pub fn home_url(&self) -> String {
        format!("{}{}", self.base_url, self.home_path)
    }

    pub fn form(mut self, form: LoginForm) -> Self {
        self.form = form;
        self
    }

    /// Register a view at `path` (relative to the base URL)
    pub fn view(mut self, path: &str, view: ScriptedView) -> Self {
        self.views.insert(format!("{}{}", self.base_url, path), view);
        self
    }
}

#[derive(Debug)]
struct PageState {
    site: ScriptedSite,
    url: String,
    authenticated: bool,
    expire_after_login: usize,
    typed: HashMap<usize, String>,
    open_detail: Option<usize>,
    panel: Option<String>,
    history: Vec<String>,
    logins: usize,
    failures: HashMap<String, String>,
    crash_after_opens: Option<usize>,
    crashed: bool,
}

impl PageState {
    fn ensure_alive(&self) -> Result<()> {
        if self.crashed {
            Err(BrowserError::Disconnected(
                "scripted connection dropped".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn view(&self) -> Option<&ScriptedView> {
        self.site.views.get(&self.url)
    }

    fn on_login_page(&self) -> bool {
        self.url.contains(&self.site.login_path)
    }

    /// Which credential slot a login-form lookup refers to
    fn login_slot(&self, selector: &str, index: usize) -> Option<usize> {
        if !self.on_login_page() {
            return None;
        }
        match self.site.form {
            LoginForm::Ids => match (selector, index) {
                ("#username", 0) => Some(0),
                ("#password", 0) => Some(1),
                _ => None,
            },
            LoginForm::Positional if selector.starts_with("input") && !selector.contains("submit") => {
                (index < 2).then_some(index)
            }
            _ => None,
        }
    }

    fn is_submit(&self, selector: &str, index: usize) -> bool {
        if !self.on_login_page() || index != 0 {
            return false;
        }
        match self.site.form {
            LoginForm::Ids => selector == "#loginButton",
            LoginForm::Positional => selector.contains("submit"),
            LoginForm::Missing => false,
        }
    }
}

/// Scripted page; cheap to share between the driver and the test
#[derive(Debug)]
pub struct ScriptedPage {
    state: Mutex<PageState>,
    delay: Duration,
}

impl ScriptedPage {
    pub fn new(site: ScriptedSite) -> Self {
        Self {
            state: Mutex::new(PageState {
                site,
                url: "about:blank".to_string(),
                authenticated: false,
                expire_after_login: 0,
                typed: HashMap::new(),
                open_detail: None,
                panel: None,
                history: Vec::new(),
                logins: 0,
                failures: HashMap::new(),
                crash_after_opens: None,
                crashed: false,
            }),
            delay: Duration::ZERO,
        }
    }

    /// Make every navigation take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forget the login, as a freshly launched browser would
    pub fn reset_session(&self) {
        let mut state = self.lock();
        state.authenticated = false;
        state.url = "about:blank".to_string();
        state.open_detail = None;
        state.panel = None;
        state.crashed = false;
    }

    /// Drop the connection right after `opens` more detail views open;
    /// every later call fails with `Disconnected` until the next launch
    pub fn crash_after_opening(&self, opens: usize) {
        self.lock().crash_after_opens = Some(opens);
    }

    /// Expire the session on the next `count` authenticated navigations
    pub fn expire_sessions(&self, count: usize) {
        self.lock().expire_after_login = count;
    }

    /// Make navigations to `url` fail with a navigation error
    pub fn fail_navigation(&self, url: &str, message: &str) {
        self.lock()
            .failures
            .insert(url.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Replace the view registered at `path`
    pub fn set_view(&self, path: &str, view: ScriptedView) {
        let mut state = self.lock();
        let url = format!("{}{}", state.site.base_url, path);
        state.site.views.insert(url, view);
    }

    /// Mark the session as logged in without submitting the form
    pub fn sign_in(&self) {
        self.lock().authenticated = true;
    }

    /// Change the password the portal accepts
    pub fn set_password(&self, password: &str) {
        self.lock().site.password = password.to_string();
    }

    /// Every URL passed to `goto`, in order
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Number of login submissions
    pub fn logins(&self) -> usize {
        self.lock().logins
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }
}

#[async_trait]
impl PortalPage for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut state = self.lock();
        state.ensure_alive()?;
        state.history.push(url.to_string());
        state.open_detail = None;
        state.panel = None;

        if let Some(message) = state.failures.get(url) {
            return Err(BrowserError::Navigation(message.clone()));
        }

        let login_url = state.site.login_url();
        if url.contains(&state.site.login_path) {
            state.url = login_url;
        } else if !state.authenticated {
            state.url = format!("{}?ReturnUrl=redirect", login_url);
        } else if state.expire_after_login > 0 {
            state.expire_after_login -= 1;
            state.authenticated = false;
            state.url = format!("{}?ReturnUrl=expired", login_url);
        } else {
            state.url = url.to_string();
        }
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        let state = self.lock();
        state.ensure_alive()?;
        Ok(state.url.clone())
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let state = self.lock();
        state.ensure_alive()?;
        let Some(view) = state.view() else {
            return Ok(Vec::new());
        };

        if let (Some(index), Some(details)) = (state.open_detail, &view.details) {
            if selector == details.detail_selector {
                return Ok(details.details[index].iter().cloned().collect());
            }
        }

        let elements = match &state.panel {
            Some(label) => view.panels.get(label),
            None => Some(&view.elements),
        };

        Ok(elements
            .and_then(|e| e.get(selector))
            .cloned()
            .unwrap_or_default())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<bool> {
        let mut state = self.lock();
        state.ensure_alive()?;
        let opened = state.view().and_then(|v| v.details.as_ref()).is_some_and(|d| {
            d.summary_selector == selector && index < d.details.len()
        });
        if opened {
            state.open_detail = Some(index);
            match state.crash_after_opens {
                Some(0) | Some(1) => {
                    state.crash_after_opens = None;
                    state.crashed = true;
                }
                Some(n) => state.crash_after_opens = Some(n - 1),
                None => {}
            }
        }
        Ok(opened)
    }

    async fn click_text(&self, _selector: &str, text: &str) -> Result<bool> {
        let mut state = self.lock();
        state.ensure_alive()?;
        let Some(view) = state.view() else {
            return Ok(false);
        };

        let closes = view.details.as_ref().is_some_and(|d| d.close_label == text);
        let opens_panel = view.panels.contains_key(text);

        if closes && state.open_detail.is_some() {
            state.open_detail = None;
            Ok(true)
        } else if opens_panel {
            state.panel = Some(text.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn fill_nth(&self, selector: &str, index: usize, value: &str) -> Result<bool> {
        let mut state = self.lock();
        state.ensure_alive()?;
        match state.login_slot(selector, index) {
            Some(slot) => {
                // select-all then type: the previous value is replaced
                state.typed.insert(slot, value.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn submit_nth(&self, selector: &str, index: usize) -> Result<bool> {
        let mut state = self.lock();
        state.ensure_alive()?;
        if !state.is_submit(selector, index) {
            return Ok(false);
        }

        state.logins += 1;
        let username = state.typed.get(&0).cloned().unwrap_or_default();
        let password = state.typed.get(&1).cloned().unwrap_or_default();

        if username == state.site.username && password == state.site.password {
            state.authenticated = true;
            state.url = state.site.home_url();
        } else {
            state.url = format!("{}?error=1", state.site.login_url());
        }
        Ok(true)
    }
}

/// Driver handing out the same scripted page on every launch
pub struct ScriptedDriver {
    page: Arc<ScriptedPage>,
    launches: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_next: AtomicBool,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl ScriptedDriver {
    pub fn new(site: ScriptedSite) -> Self {
        Self::with_page(Arc::new(ScriptedPage::new(site)))
    }

    pub fn with_page(page: Arc<ScriptedPage>) -> Self {
        Self {
            page,
            launches: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_next: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    pub fn page(&self) -> Arc<ScriptedPage> {
        Arc::clone(&self.page)
    }

    /// Successful launches so far
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make the next launch fail
    pub fn fail_next_launch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Simulate the current browser process crashing
    pub fn disconnect(&self) {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(connected) = current.as_ref() {
            connected.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn launch(&self) -> Result<Box<dyn BrowserProcess>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BrowserError::Initialization(
                "scripted launch failure".to_string(),
            ));
        }

        self.launches.fetch_add(1, Ordering::SeqCst);
        self.page.reset_session();

        let connected = Arc::new(AtomicBool::new(true));
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&connected));

        Ok(Box::new(ScriptedProcess {
            page: Arc::clone(&self.page),
            connected,
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct ScriptedProcess {
    page: Arc<ScriptedPage>,
    connected: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserProcess for ScriptedProcess {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open_page(&self) -> Result<Arc<dyn PortalPage>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrowserError::Disconnected("scripted browser is gone".to_string()));
        }
        Ok(self.page.clone())
    }

    async fn close(self: Box<Self>) {
        self.connected.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
