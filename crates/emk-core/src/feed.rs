//! Portal feeds
//!
//! Each feed is one view of the portal that is scraped into a list of
//! single-line text records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scraped portal feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    /// Assignments (ödevler)
    Homework,
    /// Inbox messages (mesajlar)
    Messages,
}

impl Feed {
    /// All feeds, in prompt order
    pub const ALL: [Feed; 2] = [Feed::Homework, Feed::Messages];

    /// Stable feed name used in logs and JSON output
    pub fn name(&self) -> &'static str {
        match self {
            Feed::Homework => "homework",
            Feed::Messages => "messages",
        }
    }

    /// Section heading used when the feed is rendered into a prompt
    pub fn heading(&self) -> &'static str {
        match self {
            Feed::Homework => "ÖDEVLER",
            Feed::Messages => "MESAJLAR",
        }
    }

    /// Sentinel record returned when every extraction tier came back empty
    pub fn empty_sentinel(&self) -> &'static str {
        match self {
            Feed::Homework => "Ödev bulunamadı.",
            Feed::Messages => "Mesaj bulunamadı.",
        }
    }

    /// Placeholder served before the first refresh attempt finishes
    pub fn placeholder(&self) -> &'static str {
        match self {
            Feed::Homework => "Ödev bilgisi henüz yüklenmedi.",
            Feed::Messages => "Mesaj bilgisi henüz yüklenmedi.",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
