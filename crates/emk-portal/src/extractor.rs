//! Feed extractor trait

use async_trait::async_trait;

use emk_browser::PortalPage;
use emk_core::Feed;

use crate::auth::Authenticator;
use crate::error::Result;

/// Scrapes one feed from an authenticated page
///
/// Implementations navigate on their own (through `Authenticator::open_view`,
/// so an expired session is re-established once) and return at least one
/// record: when nothing is found the feed's empty sentinel is returned.
#[async_trait]
pub trait FeedExtractor: Send + Sync {
    fn feed(&self) -> Feed;

    async fn extract(&self, page: &dyn PortalPage, auth: &Authenticator) -> Result<Vec<String>>;
}

/// Cap `records` at `max` and substitute the empty sentinel for no records
pub fn finalize_records(feed: Feed, mut records: Vec<String>, max: usize) -> Vec<String> {
    records.truncate(max);
    if records.is_empty() {
        records.push(feed.empty_sentinel().to_string());
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_truncates() {
        let records: Vec<String> = (0..30).map(|i| format!("row {}", i)).collect();
        let records = finalize_records(Feed::Messages, records, 20);
        assert_eq!(records.len(), 20);
        assert_eq!(records[19], "row 19");
    }

    #[test]
    fn test_finalize_empty_gives_sentinel() {
        assert_eq!(
            finalize_records(Feed::Homework, Vec::new(), 20),
            vec!["Ödev bulunamadı.".to_string()]
        );
    }
}
