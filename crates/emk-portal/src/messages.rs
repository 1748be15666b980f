//! Messages feed
//!
//! The inbox is not a separate address: the portal home has to be opened
//! and its `Mesajlar` navigation entry clicked.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use emk_browser::PortalPage;
use emk_core::{Feed, PortalConfig, SettleConfig};

use crate::auth::Authenticator;
use crate::error::Result;
use crate::extractor::{FeedExtractor, finalize_records};
use crate::tiers::SelectorTiers;

const NAV_ELEMENTS: &str = "a, button, div";
const NAV_LABEL: &str = "Mesajlar";

const TIERS: SelectorTiers = SelectorTiers {
    patterns: &[".list-item", "[class*=\"mesaj\"]", "[class*=\"message\"]"],
    min_row_len: 10,
    container: "[class*=\"message-list\"]",
};

/// Extracts the messages feed
pub struct MessagesExtractor {
    url: String,
    settle: SettleConfig,
    max_records: usize,
}

impl MessagesExtractor {
    pub fn new(portal: &PortalConfig, settle: SettleConfig) -> Self {
        Self {
            url: portal.messages_url(),
            settle,
            max_records: portal.max_records,
        }
    }
}

#[async_trait]
impl FeedExtractor for MessagesExtractor {
    fn feed(&self) -> Feed {
        Feed::Messages
    }

    async fn extract(&self, page: &dyn PortalPage, auth: &Authenticator) -> Result<Vec<String>> {
        auth.open_view(page, &self.url, self.settle.messages()).await?;

        if page.click_text(NAV_ELEMENTS, NAV_LABEL).await? {
            debug!("Opened the messages panel");
            tokio::time::sleep(self.settle.messages()).await;
        } else {
            warn!("No '{}' navigation entry; reading the current view", NAV_LABEL);
        }

        let records = match TIERS.select(page).await? {
            Some((tier, rows)) => {
                debug!("Message rows taken from {:?}", tier);
                rows
            }
            None => Vec::new(),
        };

        let records = finalize_records(Feed::Messages, records, self.max_records);
        info!("Extracted {} message records", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emk_browser::testing::{ScriptedPage, ScriptedSite, ScriptedView};
    use emk_core::Credential;
    use std::time::Duration;

    const MESSAGES_PATH: &str = "/SPTS.Web/";

    fn portal() -> PortalConfig {
        PortalConfig {
            base_url: "https://portal.test".to_string(),
            ..Default::default()
        }
    }

    async fn extract(view: ScriptedView) -> Vec<String> {
        let page = ScriptedPage::new(ScriptedSite::default().view(MESSAGES_PATH, view));
        let auth = Authenticator::new(portal(), Credential::new("student", "secret"), Duration::ZERO);
        auth.login(&page).await.unwrap();

        MessagesExtractor::new(&portal(), SettleConfig::none())
            .extract(&page, &auth)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_rows_from_messages_panel() {
        let view = ScriptedView::new()
            .with(".list-item", &["Duyuru: ana sayfa"])
            .with_panel(
                NAV_LABEL,
                ".list-item",
                &["Okul Müdürlüğü\nVeli toplantısı\n18.10.2026", "Rehberlik\tSınav takvimi"],
            );

        let records = extract(view).await;

        assert_eq!(
            records,
            vec![
                "Okul Müdürlüğü | Veli toplantısı | 18.10.2026".to_string(),
                "Rehberlik | Sınav takvimi".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_without_navigation_entry() {
        let view = ScriptedView::new().with("table tr", &["Gezi izin formu hakkında"]);
        assert_eq!(extract(view).await, vec!["Gezi izin formu hakkında".to_string()]);
    }

    #[tokio::test]
    async fn test_truncated_to_max_records() {
        let rows: Vec<String> = (0..25).map(|i| format!("Veli mesajı {}", i)).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let view = ScriptedView::new().with_panel(NAV_LABEL, "[class*=\"message\"]", &rows);

        let records = extract(view).await;

        assert_eq!(records.len(), 20);
        assert_eq!(records[0], "Veli mesajı 0");
    }

    #[tokio::test]
    async fn test_navigation_labels_are_not_messages() {
        let view = ScriptedView::new().with_panel(
            NAV_LABEL,
            ".list-item",
            &["Gelen", "Giden", "Taslaklar", "Rehberlik\tSınav takvimi"],
        );

        assert_eq!(extract(view).await, vec!["Rehberlik | Sınav takvimi".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_inbox_yields_sentinel() {
        let view = ScriptedView::new().with_panel(NAV_LABEL, ".list-item", &[]);
        assert_eq!(extract(view).await, vec!["Mesaj bulunamadı.".to_string()]);
    }
}
