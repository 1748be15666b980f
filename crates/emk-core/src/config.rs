//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. emk-gateway.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Default config file looked up in the working directory
pub const CONFIG_FILE: &str = "emk-gateway.toml";

/// Main configuration for emk-gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Portal endpoints and extraction limits
    pub portal: PortalConfig,

    /// Portal login
    pub credentials: Credential,

    /// Browser launch settings
    pub browser: BrowserConfig,

    /// Refresh trigger
    pub refresh: RefreshConfig,

    /// Settle delays after navigation
    pub settle: SettleConfig,
}

/// Portal endpoints, all under one base host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub login_path: String,
    pub homework_path: String,
    pub messages_path: String,
    /// Upper bound on records kept per feed
    pub max_records: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://evrensel.k12net.com".to_string(),
            login_path: "/Login.aspx".to_string(),
            homework_path: "/SPTS.Web/WebParts/Assignment/#/".to_string(),
            messages_path: "/SPTS.Web/".to_string(),
            max_records: 20,
        }
    }
}

impl PortalConfig {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn login_url(&self) -> String {
        self.url(&self.login_path)
    }

    pub fn homework_url(&self) -> String {
        self.url(&self.homework_path)
    }

    pub fn messages_url(&self) -> String {
        self.url(&self.messages_path)
    }

    /// Whether `url` is the login page (the portal bounces expired sessions there)
    pub fn is_login_url(&self, url: &str) -> bool {
        url.contains(&self.login_path)
    }
}

/// Portal username/password
///
/// A missing value is an empty string; the login then fails instead of the
/// process refusing to start.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() || self.password.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// How long a browser session lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Launch a fresh browser for every refresh and close it afterwards
    #[default]
    PerCall,
    /// Keep one logged-in browser alive across refreshes
    Persistent,
}

impl SessionMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "per_call" | "per-call" | "percall" => Some(Self::PerCall),
            "persistent" => Some(Self::Persistent),
            _ => None,
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chromium executable; `None` lets the driver search for one
    pub executable_path: Option<String>,
    /// Whether to run in headless mode
    pub headless: bool,
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout: u64,
    /// Element wait timeout in seconds
    pub element_timeout: u64,
    /// Seconds between liveness probes of a running browser
    pub watchdog_interval: u64,
    /// Session lifetime
    pub session_mode: SessionMode,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable_path: Some("/usr/bin/chromium".to_string()),
            headless: true,
            width: 1280,
            height: 800,
            navigation_timeout: 30,
            element_timeout: 10,
            watchdog_interval: 5,
            session_mode: SessionMode::PerCall,
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval.max(1))
    }
}

/// Refresh trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Whether the background scheduler runs at all
    pub enabled: bool,
    /// Fixed interval between refreshes, in seconds
    pub interval_secs: u64,
    /// cron expression; takes precedence over `interval_secs` when set
    pub cron: Option<String>,
    /// Run one refresh as soon as the scheduler starts
    pub on_startup: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30 * 60,
            cron: None,
            on_startup: true,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Fixed waits after navigation-complete, in milliseconds
///
/// The portal renders client-side after the network goes quiet, so every
/// navigation is followed by one of these bounded waits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub login_ms: u64,
    pub homework_ms: u64,
    pub messages_ms: u64,
    /// After opening a homework detail view
    pub detail_ms: u64,
    /// After closing a homework detail view
    pub close_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            login_ms: 2000,
            homework_ms: 4000,
            messages_ms: 3000,
            detail_ms: 1500,
            close_ms: 800,
        }
    }
}

impl SettleConfig {
    /// No waits at all; used against scripted pages
    pub fn none() -> Self {
        Self {
            login_ms: 0,
            homework_ms: 0,
            messages_ms: 0,
            detail_ms: 0,
            close_ms: 0,
        }
    }

    pub fn login(&self) -> Duration {
        Duration::from_millis(self.login_ms)
    }

    pub fn homework(&self) -> Duration {
        Duration::from_millis(self.homework_ms)
    }

    pub fn messages(&self) -> Duration {
        Duration::from_millis(self.messages_ms)
    }

    pub fn detail(&self) -> Duration {
        Duration::from_millis(self.detail_ms)
    }

    pub fn close(&self) -> Duration {
        Duration::from_millis(self.close_ms)
    }
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 文字列から設定を読み込む（環境変数展開あり、上書きなし）
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換され、
    /// その後に環境変数で上書きされます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// `./emk-gateway.toml` があればそれを使い、なければ環境変数のみ。
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// 環境変数で設定を上書きする
    fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("K12_BASE_URL") {
            if !base_url.is_empty() {
                self.portal.base_url = base_url;
            }
        }
        if let Ok(max) = std::env::var("K12_MAX_RECORDS") {
            if let Ok(n) = max.parse() {
                self.portal.max_records = n;
            }
        }

        if let Ok(username) = std::env::var("K12_USERNAME") {
            self.credentials.username = username;
        }
        if let Ok(password) = std::env::var("K12_PASSWORD") {
            self.credentials.password = password;
        }

        // Only use a non-empty executable path
        if let Ok(path) = std::env::var("CHROME_EXECUTABLE_PATH") {
            if !path.is_empty() {
                self.browser.executable_path = Some(path);
            }
        }
        if let Ok(headless) = std::env::var("BROWSER_HEADLESS") {
            self.browser.headless = headless.to_lowercase() != "false";
        }
        if let Ok(mode) = std::env::var("BROWSER_SESSION_MODE") {
            if let Some(mode) = SessionMode::parse(&mode) {
                self.browser.session_mode = mode;
            }
        }

        if let Ok(enabled) = std::env::var("REFRESH_ENABLED") {
            self.refresh.enabled = enabled.to_lowercase() != "false";
        }
        if let Ok(secs) = std::env::var("REFRESH_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                self.refresh.interval_secs = s;
            }
        }
        if let Ok(cron) = std::env::var("REFRESH_CRON") {
            if !cron.is_empty() {
                self.refresh.cron = Some(cron);
            }
        }
    }

    fn validate(&self) -> crate::Result<()> {
        if !self.portal.base_url.starts_with("http://")
            && !self.portal.base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "portal.base_url must be an http(s) URL: {}",
                self.portal.base_url
            )));
        }
        if self.portal.max_records == 0 {
            return Err(Error::Config("portal.max_records must be at least 1".to_string()));
        }
        if self.credentials.is_empty() {
            tracing::warn!("K12_USERNAME or K12_PASSWORD is empty; portal login will fail");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.portal.login_url(), "https://evrensel.k12net.com/Login.aspx");
        assert_eq!(
            config.portal.homework_url(),
            "https://evrensel.k12net.com/SPTS.Web/WebParts/Assignment/#/"
        );
        assert_eq!(config.portal.max_records, 20);
        assert_eq!(config.browser.session_mode, SessionMode::PerCall);
        assert_eq!((config.browser.width, config.browser.height), (1280, 800));
        assert_eq!(config.settle.homework(), Duration::from_secs(4));
    }

    #[test]
    fn test_is_login_url() {
        let portal = PortalConfig::default();
        assert!(portal.is_login_url("https://evrensel.k12net.com/Login.aspx?ReturnUrl=%2f"));
        assert!(!portal.is_login_url("https://evrensel.k12net.com/SPTS.Web/"));
    }

    #[test]
    fn test_credential_debug_redacts_password() {
        let credential = Credential::new("student", "hunter2");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("student"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_parse_toml_sections() {
        let toml = r#"
[portal]
base_url = "https://school.example.com/"
max_records = 5

[browser]
session_mode = "persistent"
headless = false

[refresh]
interval_secs = 600
cron = "0 */15 * * * *"

[settle]
homework_ms = 100
"#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.portal.login_url(), "https://school.example.com/Login.aspx");
        assert_eq!(config.portal.max_records, 5);
        assert_eq!(config.browser.session_mode, SessionMode::Persistent);
        assert!(!config.browser.headless);
        assert_eq!(config.refresh.interval(), Duration::from_secs(600));
        assert_eq!(config.refresh.cron.as_deref(), Some("0 */15 * * * *"));
        assert_eq!(config.settle.homework_ms, 100);
        // untouched sections keep their defaults
        assert_eq!(config.settle.messages_ms, 3000);
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test-local variable name, not read elsewhere
        unsafe { std::env::set_var("EMK_TEST_EXPAND_USER", "veli") };
        let expanded = Config::expand_env_vars("username = \"${EMK_TEST_EXPAND_USER}\"");
        assert_eq!(expanded, "username = \"veli\"");

        let missing = Config::expand_env_vars("x${EMK_TEST_DOES_NOT_EXIST}y");
        assert_eq!(missing, "xy");
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[portal]\nbase_url = \"https://portal.example.org\"").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert!(config.portal.base_url.starts_with("https://"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[portal]\nbase_url = \"ftp://portal\"").unwrap();

        let result = Config::from_toml_file(file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_session_mode_parse() {
        assert_eq!(SessionMode::parse("Persistent"), Some(SessionMode::Persistent));
        assert_eq!(SessionMode::parse("per-call"), Some(SessionMode::PerCall));
        assert_eq!(SessionMode::parse("sometimes"), None);
    }

    #[test]
    fn test_browser_config_durations() {
        let config = BrowserConfig {
            navigation_timeout: 60,
            element_timeout: 5,
            watchdog_interval: 0,
            ..Default::default()
        };

        assert_eq!(config.navigation_timeout(), Duration::from_secs(60));
        assert_eq!(config.element_timeout(), Duration::from_secs(5));
        assert_eq!(config.watchdog_interval(), Duration::from_secs(1));
    }
}
