//! Page-level primitives
//!
//! Everything the authenticator and the extractors do to the portal goes
//! through this trait. Selectors are CSS; texts are the trimmed visible text
//! (`innerText`) of the matched elements, in document order.

use async_trait::async_trait;

use crate::error::Result;

/// One open browser page
#[async_trait]
pub trait PortalPage: Send + Sync {
    /// Navigate to `url` and wait until the navigation completes
    async fn goto(&self, url: &str) -> Result<()>;

    /// Current page URL
    async fn url(&self) -> Result<String>;

    /// Visible text of every element matching `selector`
    async fn texts(&self, selector: &str) -> Result<Vec<String>>;

    /// Visible text of the first element matching `selector`
    async fn text(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.texts(selector).await?.into_iter().next())
    }

    /// Number of elements matching `selector`
    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(self.texts(selector).await?.len())
    }

    /// Click the `index`-th match of `selector`; `false` when there is none
    async fn click_nth(&self, selector: &str, index: usize) -> Result<bool>;

    /// Click the first match of `selector` whose visible text equals `text`
    async fn click_text(&self, selector: &str, text: &str) -> Result<bool>;

    /// Select the contents of the `index`-th matching input and type `value`
    /// over it; `false` when there is no such input
    async fn fill_nth(&self, selector: &str, index: usize, value: &str) -> Result<bool>;

    /// Click the `index`-th match of `selector` and wait for the navigation
    /// it triggers; `false` when there is no such element
    async fn submit_nth(&self, selector: &str, index: usize) -> Result<bool>;
}
