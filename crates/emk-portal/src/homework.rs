//! Homework feed
//!
//! The assignment view lists one `li .homework-title` entry per assignment.
//! Each entry opens a detail dialog whose text is parsed label by label.
//! When the list is missing the generic tiers are used instead and rows are
//! kept as the portal renders them.

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use emk_browser::PortalPage;
use emk_core::{Feed, PortalConfig, SettleConfig};

use crate::auth::Authenticator;
use crate::error::{PortalError, Result};
use crate::extractor::{FeedExtractor, finalize_records};
use crate::matcher::{FieldPattern, LabelRule};
use crate::tiers::SelectorTiers;

const SUMMARY_ITEMS: &str = "li .homework-title";
const DETAIL_SURFACES: [&str; 3] = [".modal", "[class*=\"modal\"]", "[class*=\"detail\"]"];
const CLOSE_BUTTON: &str = "button";
const CLOSE_LABEL: &str = "Kapat";

const TIERS: SelectorTiers = SelectorTiers {
    patterns: &[
        "[class*=\"homework\"] li",
        "[class*=\"assignment\"] li",
        "[class*=\"odev\"]",
    ],
    min_row_len: 10,
    container: "[class*=\"assignment\"]",
};

struct HomeworkFields {
    title: FieldPattern,
    subject: FieldPattern,
    description: FieldPattern,
    due: FieldPattern,
    teacher: FieldPattern,
}

static FIELDS: LazyLock<HomeworkFields> = LazyLock::new(|| HomeworkFields {
    title: FieldPattern::new(
        "title",
        &[LabelRule::NextLine("Başlık"), LabelRule::SameLine("Başlık")],
    ),
    subject: FieldPattern::new(
        "subject",
        &[LabelRule::NextLine("Ders"), LabelRule::SameLine("Ders")],
    ),
    // the description may wrap over several lines before the start date
    description: FieldPattern::new(
        "description",
        &[
            LabelRule::Until {
                label: "Açıklama",
                boundary: "Başlama Tarihi",
            },
            LabelRule::NextLine("Açıklama"),
            LabelRule::SameLine("Açıklama"),
        ],
    ),
    due: FieldPattern::new(
        "due",
        &[LabelRule::NextLine("Son Tarih"), LabelRule::SameLine("Son Tarih")],
    ),
    teacher: FieldPattern::new(
        "teacher",
        &[LabelRule::NextLine("Öğretmen"), LabelRule::SameLine("Öğretmen")],
    ),
});

/// One assignment as read from its detail dialog; missing fields are empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HomeworkRecord {
    pub subject: String,
    pub title: String,
    pub description: String,
    pub due: String,
    pub teacher: String,
}

impl HomeworkRecord {
    /// Parse the rendered text of a detail dialog
    pub fn parse(text: &str) -> Self {
        let fields = &*FIELDS;
        let find = |pattern: &FieldPattern| {
            let value = pattern.find(text).unwrap_or_default();
            if value.is_empty() {
                debug!("Homework field '{}' not found", pattern.name());
            }
            value
        };

        Self {
            subject: find(&fields.subject),
            title: find(&fields.title),
            description: find(&fields.description),
            due: find(&fields.due),
            teacher: find(&fields.teacher),
        }
    }
}

impl fmt::Display for HomeworkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ders: {} | Başlık: {} | Açıklama: {} | Son Tarih: {} | Öğretmen: {}",
            self.subject, self.title, self.description, self.due, self.teacher
        )
    }
}

/// Extracts the homework feed
pub struct HomeworkExtractor {
    url: String,
    settle: SettleConfig,
    max_records: usize,
}

impl HomeworkExtractor {
    pub fn new(portal: &PortalConfig, settle: SettleConfig) -> Self {
        Self {
            url: portal.homework_url(),
            settle,
            max_records: portal.max_records,
        }
    }

    async fn walk_details(&self, page: &dyn PortalPage, count: usize) -> Result<Vec<String>> {
        let titles = page.texts(SUMMARY_ITEMS).await?;
        let count = count.min(self.max_records);
        let mut records = Vec::with_capacity(count);

        for index in 0..count {
            let mut record = match self.read_detail(page, index).await {
                Ok(record) => record,
                Err(PortalError::Browser(e)) if !e.is_process_failure() => {
                    warn!("Homework item {} could not be read: {}", index, e);
                    HomeworkRecord::default()
                }
                Err(e) => return Err(e),
            };

            if record.title.is_empty() {
                if let Some(title) = titles.get(index) {
                    record.title = title.trim().to_string();
                }
            }
            records.push(record.to_string());
        }

        Ok(records)
    }

    async fn read_detail(&self, page: &dyn PortalPage, index: usize) -> Result<HomeworkRecord> {
        if !page.click_nth(SUMMARY_ITEMS, index).await? {
            warn!("Homework item {} disappeared before it could be opened", index);
            return Ok(HomeworkRecord::default());
        }
        tokio::time::sleep(self.settle.detail()).await;

        let mut text = None;
        for surface in DETAIL_SURFACES {
            if let Some(found) = page.text(surface).await?.filter(|t| !t.trim().is_empty()) {
                text = Some(found);
                break;
            }
        }

        let record = match text {
            Some(text) => HomeworkRecord::parse(&text),
            None => {
                warn!("No detail view appeared for homework item {}", index);
                HomeworkRecord::default()
            }
        };

        if page.click_text(CLOSE_BUTTON, CLOSE_LABEL).await? {
            tokio::time::sleep(self.settle.close()).await;
        }
        Ok(record)
    }
}

#[async_trait]
impl FeedExtractor for HomeworkExtractor {
    fn feed(&self) -> Feed {
        Feed::Homework
    }

    async fn extract(&self, page: &dyn PortalPage, auth: &Authenticator) -> Result<Vec<String>> {
        auth.open_view(page, &self.url, self.settle.homework()).await?;

        let count = page.count(SUMMARY_ITEMS).await?;
        let records = if count > 0 {
            debug!("Found {} homework entries", count);
            self.walk_details(page, count).await?
        } else {
            match TIERS.select(page).await? {
                Some((tier, rows)) => {
                    debug!("Homework rows taken from {:?}", tier);
                    rows
                }
                None => Vec::new(),
            }
        };

        let records = finalize_records(Feed::Homework, records, self.max_records);
        info!("Extracted {} homework records", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emk_browser::BrowserError;
    use emk_browser::testing::{ScriptedPage, ScriptedSite, ScriptedView};
    use emk_core::Credential;
    use std::time::Duration;

    const HOMEWORK_PATH: &str = "/SPTS.Web/WebParts/Assignment/#/";

    fn portal() -> PortalConfig {
        PortalConfig {
            base_url: "https://portal.test".to_string(),
            ..Default::default()
        }
    }

    fn detail(subject: &str, due: Option<&str>) -> String {
        let mut text = format!(
            "Başlık\n{} ödevi\nDers\n{}\nAçıklama\nKitap alıştırmaları\nsayfa 12\nBaşlama Tarihi\n13.10.2026\n",
            subject, subject
        );
        if let Some(due) = due {
            text.push_str(&format!("Son Tarih\n{}\n", due));
        }
        text.push_str("Öğretmen\nAyşe Yılmaz\nKapat");
        text
    }

    async fn extract(view: ScriptedView, max_records: usize) -> Vec<String> {
        let page = ScriptedPage::new(ScriptedSite::default().view(HOMEWORK_PATH, view));
        let auth = Authenticator::new(portal(), Credential::new("student", "secret"), Duration::ZERO);
        auth.login(&page).await.unwrap();

        let portal = PortalConfig {
            max_records,
            ..portal()
        };
        HomeworkExtractor::new(&portal, SettleConfig::none())
            .extract(&page, &auth)
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_detail() {
        let record = HomeworkRecord::parse(&detail("Fizik", Some("20.10.2026")));
        assert_eq!(
            record,
            HomeworkRecord {
                subject: "Fizik".to_string(),
                title: "Fizik ödevi".to_string(),
                description: "Kitap alıştırmaları sayfa 12".to_string(),
                due: "20.10.2026".to_string(),
                teacher: "Ayşe Yılmaz".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_same_line_labels() {
        let record = HomeworkRecord::parse("Ders: Kimya\nSon Tarih: 01.11.2026");
        assert_eq!(record.subject, "Kimya");
        assert_eq!(record.due, "01.11.2026");
        assert_eq!(record.teacher, "");
    }

    #[test]
    fn test_record_format() {
        let record = HomeworkRecord {
            subject: "Tarih".to_string(),
            title: "Okuma".to_string(),
            ..Default::default()
        };
        assert_eq!(
            record.to_string(),
            "Ders: Tarih | Başlık: Okuma | Açıklama:  | Son Tarih:  | Öğretmen: "
        );
    }

    #[tokio::test]
    async fn test_detail_walk_with_missing_due_date() {
        let details = vec![
            Some(detail("Fizik", Some("20.10.2026"))),
            Some(detail("Kimya", Some("21.10.2026"))),
            Some(detail("Biyoloji", None)),
            Some(detail("Tarih", Some("23.10.2026"))),
            Some(detail("Coğrafya", Some("24.10.2026"))),
        ];
        let view = ScriptedView::new().with_details(SUMMARY_ITEMS, ".modal", CLOSE_LABEL, details);

        let records = extract(view, 20).await;

        assert_eq!(records.len(), 5);
        assert!(records[0].starts_with("Ders: Fizik | Başlık: Fizik ödevi"));
        assert!(records[2].contains("| Son Tarih:  |"));
        assert!(records[3].contains("Son Tarih: 23.10.2026"));
    }

    #[tokio::test]
    async fn test_missing_detail_keeps_item_with_summary_title() {
        let details = vec![Some(detail("Fizik", Some("20.10.2026"))), None];
        let view = ScriptedView::new().with_details(
            SUMMARY_ITEMS,
            "[class*=\"detail\"]",
            CLOSE_LABEL,
            details,
        );

        let records = extract(view, 20).await;

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1],
            "Ders:  | Başlık: Ödev 2 | Açıklama:  | Son Tarih:  | Öğretmen: "
        );
    }

    #[tokio::test]
    async fn test_connection_loss_aborts_detail_walk() {
        let details = (0..3).map(|_| Some(detail("Fizik", None))).collect();
        let view = ScriptedView::new().with_details(SUMMARY_ITEMS, ".modal", CLOSE_LABEL, details);
        let page = ScriptedPage::new(ScriptedSite::default().view(HOMEWORK_PATH, view));
        let auth = Authenticator::new(portal(), Credential::new("student", "secret"), Duration::ZERO);
        auth.login(&page).await.unwrap();
        page.crash_after_opening(1);

        let err = HomeworkExtractor::new(&portal(), SettleConfig::none())
            .extract(&page, &auth)
            .await
            .unwrap_err();

        assert!(matches!(err, PortalError::Browser(BrowserError::Disconnected(_))));
        assert!(err.requires_teardown());
    }

    #[tokio::test]
    async fn test_detail_walk_is_truncated() {
        let details = (0..4).map(|_| Some(detail("Fizik", None))).collect();
        let view = ScriptedView::new().with_details(SUMMARY_ITEMS, ".modal", CLOSE_LABEL, details);

        let records = extract(view, 3).await;
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_tier_fallback() {
        let view = ScriptedView::new().with(
            "[class*=\"assignment\"] li",
            &["Matematik\tProblemler 1-10\t25.10.2026"],
        );

        let records = extract(view, 20).await;
        assert_eq!(records, vec!["Matematik | Problemler 1-10 | 25.10.2026".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_view_yields_sentinel() {
        let records = extract(ScriptedView::new(), 20).await;
        assert_eq!(records, vec!["Ödev bulunamadı.".to_string()]);
    }

    #[tokio::test]
    async fn test_bounce_relogs_once() {
        let view = ScriptedView::new().with("[class*=\"odev\"]", &["Resim: Doğa çizimi"]);
        let page = ScriptedPage::new(ScriptedSite::default().view(HOMEWORK_PATH, view));
        let auth = Authenticator::new(portal(), Credential::new("student", "secret"), Duration::ZERO);
        auth.login(&page).await.unwrap();
        page.expire_sessions(1);

        let records = HomeworkExtractor::new(&portal(), SettleConfig::none())
            .extract(&page, &auth)
            .await
            .unwrap();

        assert_eq!(records, vec!["Resim: Doğa çizimi".to_string()]);
        assert_eq!(page.logins(), 2);
    }
}
