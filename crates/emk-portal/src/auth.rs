//! Portal login
//!
//! The login form is located by fixed ids first and by position second,
//! because some portal variants render the inputs without ids.

use std::time::Duration;

use tracing::{debug, info, warn};

use emk_browser::PortalPage;
use emk_core::{Credential, PortalConfig};

use crate::error::{PortalError, Result};

const USERNAME_FIELD: &str = "#username";
const PASSWORD_FIELD: &str = "#password";
const SUBMIT_BUTTON: &str = "#loginButton";

/// Text-like inputs in document order; the first is the username, the
/// second the password
const POSITIONAL_INPUTS: &str =
    "input[type=\"text\"], input[type=\"password\"], input[type=\"email\"], input:not([type])";
const POSITIONAL_SUBMIT: &str = "button[type=\"submit\"], input[type=\"submit\"]";

/// Logs in to the portal and guards navigations against expired sessions
pub struct Authenticator {
    portal: PortalConfig,
    credential: Credential,
    settle: Duration,
}

impl Authenticator {
    pub fn new(portal: PortalConfig, credential: Credential, settle: Duration) -> Self {
        Self {
            portal,
            credential,
            settle,
        }
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    /// Fill and submit the login form
    ///
    /// Succeeds when the page has left the login address after submitting.
    /// Safe to call again on a page whose session has expired.
    pub async fn login(&self, page: &dyn PortalPage) -> Result<()> {
        info!("Logging in to portal");

        page.goto(&self.portal.login_url()).await?;
        tokio::time::sleep(self.settle).await;

        self.fill_credentials(page).await?;

        let submitted = page.submit_nth(SUBMIT_BUTTON, 0).await?
            || page.submit_nth(POSITIONAL_SUBMIT, 0).await?;
        if !submitted {
            return Err(PortalError::LoginFormNotFound(
                "no submit control on the login page".to_string(),
            ));
        }

        let url = page.url().await?;
        if self.portal.is_login_url(&url) {
            return Err(PortalError::Authentication(
                "portal stayed on the login page after submit".to_string(),
            ));
        }

        info!("Portal login succeeded");
        Ok(())
    }

    async fn fill_credentials(&self, page: &dyn PortalPage) -> Result<()> {
        let Credential { username, password } = &self.credential;

        if page.fill_nth(USERNAME_FIELD, 0, username).await? {
            if page.fill_nth(PASSWORD_FIELD, 0, password).await? {
                debug!("Filled login form by id");
                return Ok(());
            }
            warn!("Username field found by id but password field was not");
        }

        if page.fill_nth(POSITIONAL_INPUTS, 0, username).await?
            && page.fill_nth(POSITIONAL_INPUTS, 1, password).await?
        {
            debug!("Filled login form by position");
            return Ok(());
        }

        Err(PortalError::LoginFormNotFound(
            "no username/password inputs on the login page".to_string(),
        ))
    }

    /// Navigate to an authenticated view and let it settle
    ///
    /// If the portal bounces to the login page, log in once and retry the
    /// navigation once. A second bounce is an authentication error.
    pub async fn open_view(&self, page: &dyn PortalPage, url: &str, settle: Duration) -> Result<()> {
        page.goto(url).await?;
        tokio::time::sleep(settle).await;

        if !self.portal.is_login_url(&page.url().await?) {
            return Ok(());
        }

        warn!("Session expired; logging in again before {}", url);
        self.login(page).await?;

        page.goto(url).await?;
        tokio::time::sleep(settle).await;

        if self.portal.is_login_url(&page.url().await?) {
            return Err(PortalError::Authentication(format!(
                "redirected to the login page again after re-login: {}",
                url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emk_browser::testing::{LoginForm, ScriptedPage, ScriptedSite, ScriptedView};

    const VIEW: &str = "/SPTS.Web/";

    fn portal() -> PortalConfig {
        PortalConfig {
            base_url: "https://portal.test".to_string(),
            ..Default::default()
        }
    }

    fn authenticator(password: &str) -> Authenticator {
        Authenticator::new(
            portal(),
            Credential::new("student", password),
            Duration::ZERO,
        )
    }

    fn page(form: LoginForm) -> ScriptedPage {
        ScriptedPage::new(
            ScriptedSite::default()
                .form(form)
                .view(VIEW, ScriptedView::new().with("table tr", &["row"])),
        )
    }

    #[tokio::test]
    async fn test_login_by_id() {
        let page = page(LoginForm::Ids);
        authenticator("secret").login(&page).await.unwrap();
        assert!(page.is_authenticated());
        assert_eq!(page.logins(), 1);
    }

    #[tokio::test]
    async fn test_login_positional_fallback() {
        let page = page(LoginForm::Positional);
        authenticator("secret").login(&page).await.unwrap();
        assert!(page.is_authenticated());
    }

    #[tokio::test]
    async fn test_wrong_password_is_authentication_error() {
        let page = page(LoginForm::Ids);
        let err = authenticator("wrong").login(&page).await.unwrap_err();
        assert!(matches!(err, PortalError::Authentication(_)));
        assert!(err.requires_teardown());
    }

    #[tokio::test]
    async fn test_empty_credential_fails_without_panic() {
        let page = page(LoginForm::Ids);
        let auth = Authenticator::new(portal(), Credential::default(), Duration::ZERO);
        assert!(matches!(
            auth.login(&page).await,
            Err(PortalError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_form() {
        let page = page(LoginForm::Missing);
        let err = authenticator("secret").login(&page).await.unwrap_err();
        assert!(matches!(err, PortalError::LoginFormNotFound(_)));
    }

    #[tokio::test]
    async fn test_login_is_repeatable() {
        let page = page(LoginForm::Ids);
        let auth = authenticator("secret");
        auth.login(&page).await.unwrap();
        auth.login(&page).await.unwrap();
        assert_eq!(page.logins(), 2);
        assert!(page.is_authenticated());
    }

    #[tokio::test]
    async fn test_open_view_relogs_once_on_bounce() {
        let page = page(LoginForm::Ids);
        let auth = authenticator("secret");
        auth.login(&page).await.unwrap();
        page.expire_sessions(1);

        auth.open_view(&page, "https://portal.test/SPTS.Web/", Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(page.logins(), 2);
        assert_eq!(page.url().await.unwrap(), "https://portal.test/SPTS.Web/");
        assert_eq!(
            page.history(),
            vec![
                "https://portal.test/Login.aspx".to_string(),
                "https://portal.test/SPTS.Web/".to_string(),
                "https://portal.test/Login.aspx".to_string(),
                "https://portal.test/SPTS.Web/".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_view_gives_up_after_one_retry() {
        let page = page(LoginForm::Ids);
        let auth = authenticator("secret");
        auth.login(&page).await.unwrap();
        page.expire_sessions(5);

        let err = auth
            .open_view(&page, "https://portal.test/SPTS.Web/", Duration::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, PortalError::Authentication(_)));
        // initial login + exactly one re-login
        assert_eq!(page.logins(), 2);
        assert_eq!(page.history().len(), 4);
    }
}
