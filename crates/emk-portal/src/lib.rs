//! emk-portal: Portal login and feed extraction
//!
//! Drives the school portal through an open `PortalPage`:
//!
//! - `Authenticator` fills and submits the login form, and re-logs in once
//!   when a view bounces back to the login page
//! - `HomeworkExtractor` walks the assignment list detail by detail
//! - `MessagesExtractor` opens the inbox and reads its rows
//!
//! Both extractors fall back through `SelectorTiers` and never return an
//! empty list.

pub mod auth;
pub mod error;
pub mod extractor;
pub mod homework;
pub mod matcher;
pub mod messages;
pub mod tiers;

pub use auth::Authenticator;
pub use error::{PortalError, Result};
pub use extractor::{FeedExtractor, finalize_records};
pub use homework::{HomeworkExtractor, HomeworkRecord};
pub use matcher::{FieldPattern, LabelRule};
pub use messages::MessagesExtractor;
pub use tiers::{SelectorTiers, Tier};
