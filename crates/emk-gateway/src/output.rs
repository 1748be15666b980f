//! `--once` output formats

use chrono::{DateTime, Utc};
use serde::Serialize;

use emk_core::{FeedCache, FeedSnapshot};

/// JSON document printed by `--once --json`
#[derive(Debug, Serialize)]
pub struct CacheReport {
    pub generated_at: DateTime<Utc>,
    pub feeds: Vec<FeedSnapshot>,
}

impl CacheReport {
    pub fn from_cache(cache: &FeedCache) -> Self {
        Self {
            generated_at: Utc::now(),
            feeds: cache.read_all(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emk_core::Feed;
    use serde_json::Value;

    #[test]
    fn test_report_json_shape() {
        let cache = FeedCache::new();
        cache.complete(Feed::Messages, vec!["Veli toplantısı".to_string()], Utc::now());
        cache.fail(Feed::Homework, "Authentication failed: rejected");

        let json = CacheReport::from_cache(&cache).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        let feeds = value["feeds"].as_array().unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0]["feed"], "homework");
        assert_eq!(feeds[0]["state"], "failed_ready");
        assert_eq!(feeds[0]["as_of"], Value::Null);
        assert_eq!(feeds[0]["records"][0], "Hata: Authentication failed: rejected");
        assert_eq!(feeds[1]["feed"], "messages");
        assert_eq!(feeds[1]["state"], "ready");
        assert!(feeds[1]["as_of"].is_string());
    }
}
