//! Feed cache
//!
//! Holds the latest scrape of every feed. Reads never block on a scrape:
//! they clone whatever the refresh controller stored last.
//!
//! Per feed the cache moves through
//! `Empty → Refreshing → Ready | FailedReady`, and from either of the last
//! two back to `Refreshing` on the next refresh.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::feed::Feed;

/// Refresh state of one feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    /// No refresh has completed yet
    Empty,
    /// A refresh is in flight; the previous records stay readable
    Refreshing,
    /// Records come from the most recent successful extraction
    Ready,
    /// Records hold a single diagnostic from the most recent failure
    FailedReady,
}

/// Stored value for one feed
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Records from the last completed refresh attempt
    pub records: Vec<String>,
    /// Time of the last successful refresh
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Current state
    pub state: FeedState,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            refreshed_at: None,
            state: FeedState::Empty,
        }
    }
}

/// Point-in-time copy of one feed, handed to consumers
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub feed: Feed,
    pub records: Vec<String>,
    pub as_of: Option<DateTime<Utc>>,
    pub state: FeedState,
}

impl FeedSnapshot {
    /// True when the records describe a failed refresh
    pub fn is_failed(&self) -> bool {
        self.state == FeedState::FailedReady
    }

    /// Render the snapshot as a plain-text prompt section
    pub fn render(&self) -> String {
        let as_of = match self.as_of {
            Some(at) => format!("(güncellendi: {})", at.format("%Y-%m-%d %H:%M UTC")),
            None => "(henüz güncellenmedi)".to_string(),
        };

        let mut out = format!("=== {} ===\n{}\n", self.feed.heading(), as_of);
        out.push_str(&self.records.join("\n"));
        out
    }
}

/// Shared cache of scraped feeds
///
/// Cloning is cheap; all clones see the same entries.
#[derive(Debug, Clone)]
pub struct FeedCache {
    entries: Arc<RwLock<HashMap<Feed, CacheEntry>>>,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedCache {
    /// Create a cache with every feed in the `Empty` state
    pub fn new() -> Self {
        let entries = Feed::ALL
            .iter()
            .map(|feed| (*feed, CacheEntry::default()))
            .collect();

        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Read one feed without waiting for any refresh
    ///
    /// Before the first refresh attempt completes the snapshot carries the
    /// feed's placeholder record.
    pub fn read(&self, feed: Feed) -> FeedSnapshot {
        let entries = self.read_guard();
        let entry = entries.get(&feed).cloned().unwrap_or_default();

        let records = if entry.records.is_empty() {
            vec![feed.placeholder().to_string()]
        } else {
            entry.records
        };

        FeedSnapshot {
            feed,
            records,
            as_of: entry.refreshed_at,
            state: entry.state,
        }
    }

    /// Read every feed, in prompt order
    pub fn read_all(&self) -> Vec<FeedSnapshot> {
        Feed::ALL.iter().map(|feed| self.read(*feed)).collect()
    }

    /// Render every feed as prompt sections separated by blank lines
    pub fn render(&self) -> String {
        self.read_all()
            .iter()
            .map(FeedSnapshot::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Mark a refresh as started
    pub fn mark_refreshing(&self, feed: Feed) {
        let mut entries = self.write_guard();
        entries.entry(feed).or_default().state = FeedState::Refreshing;
    }

    /// Store a successful extraction, replacing the previous records
    ///
    /// An empty list is stored as the feed's sentinel record.
    pub fn complete(&self, feed: Feed, records: Vec<String>, at: DateTime<Utc>) {
        let records = if records.is_empty() {
            vec![feed.empty_sentinel().to_string()]
        } else {
            records
        };

        debug!(feed = %feed, count = records.len(), "Cache entry replaced");

        let mut entries = self.write_guard();
        let entry = entries.entry(feed).or_default();
        entry.records = records;
        entry.refreshed_at = Some(at);
        entry.state = FeedState::Ready;
    }

    /// Store a failed refresh as one diagnostic record
    ///
    /// The timestamp of the last successful refresh is kept.
    pub fn fail(&self, feed: Feed, message: &str) {
        debug!(feed = %feed, "Cache entry replaced by diagnostic");

        let mut entries = self.write_guard();
        let entry = entries.entry(feed).or_default();
        entry.records = vec![format!("Hata: {}", message)];
        entry.state = FeedState::FailedReady;
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<Feed, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<Feed, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_empty_read_returns_placeholder() {
        let cache = FeedCache::new();
        for feed in Feed::ALL {
            let snapshot = cache.read(feed);
            assert_eq!(snapshot.state, FeedState::Empty);
            assert_eq!(snapshot.records, vec![feed.placeholder().to_string()]);
            assert!(snapshot.as_of.is_none());
        }
    }

    #[test]
    fn test_complete_replaces_records() {
        let cache = FeedCache::new();
        let first = Utc::now();
        cache.complete(Feed::Homework, vec!["a".into(), "b".into()], first);

        let second = first + Duration::minutes(30);
        cache.complete(Feed::Homework, vec!["c".into()], second);

        let snapshot = cache.read(Feed::Homework);
        assert_eq!(snapshot.records, vec!["c".to_string()]);
        assert_eq!(snapshot.as_of, Some(second));
        assert_eq!(snapshot.state, FeedState::Ready);
    }

    #[test]
    fn test_fail_keeps_timestamp() {
        let cache = FeedCache::new();
        let at = Utc::now();
        cache.complete(Feed::Messages, vec!["m1".into(), "m2".into()], at);

        cache.mark_refreshing(Feed::Messages);
        cache.fail(Feed::Messages, "Navigation failed: timeout");

        let snapshot = cache.read(Feed::Messages);
        assert!(snapshot.is_failed());
        assert_eq!(snapshot.as_of, Some(at));
        assert_eq!(
            snapshot.records,
            vec!["Hata: Navigation failed: timeout".to_string()]
        );
    }

    #[test]
    fn test_complete_with_no_records_stores_sentinel() {
        let cache = FeedCache::new();
        cache.complete(Feed::Messages, Vec::new(), Utc::now());
        assert_eq!(
            cache.read(Feed::Messages).records,
            vec!["Mesaj bulunamadı.".to_string()]
        );
    }

    #[test]
    fn test_refreshing_keeps_previous_records_readable() {
        let cache = FeedCache::new();
        cache.complete(Feed::Homework, vec!["old".into()], Utc::now());
        cache.mark_refreshing(Feed::Homework);

        let snapshot = cache.read(Feed::Homework);
        assert_eq!(snapshot.state, FeedState::Refreshing);
        assert_eq!(snapshot.records, vec!["old".to_string()]);
    }

    #[test]
    fn test_render_sections() {
        let cache = FeedCache::new();
        cache.complete(Feed::Homework, vec!["Ders: Fizik".into()], Utc::now());

        let text = cache.render();
        assert!(text.contains("=== ÖDEVLER ==="));
        assert!(text.contains("Ders: Fizik"));
        assert!(text.contains("=== MESAJLAR ==="));
        assert!(text.contains("(henüz güncellenmedi)"));
    }
}
