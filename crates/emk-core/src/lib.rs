//! emk-core: EMK Gateway Core Library
//!
//! Configuration, the portal feed catalogue and the feed cache that the
//! chat layer reads when it assembles a prompt.

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;

pub use cache::{CacheEntry, FeedCache, FeedSnapshot, FeedState};
pub use config::{
    BrowserConfig, Config, Credential, PortalConfig, RefreshConfig,
    SessionMode, SettleConfig,
};
pub use error::{Error, Result};
pub use feed::Feed;
