//! Tiered row selection
//!
//! Portal markup shifts between releases, so each feed lists several ways
//! to find its rows. Tiers run in order and the first one that yields any
//! text wins:
//!
//! 1. feed-specific row selectors, one at a time
//! 2. every `table tr` in the document
//! 3. the lines of one named container element
//!
//! Rows from the first two tiers are kept only when their text is longer
//! than `min_row_len`, which drops navigation labels that share a class
//! with real rows.

use tracing::debug;

use emk_browser::PortalPage;

use crate::error::Result;
use crate::matcher::single_line;

/// Which tier produced the rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Patterns,
    TableRows,
    Container,
}

/// Ordered selection strategies for one feed
#[derive(Debug, Clone)]
pub struct SelectorTiers {
    /// Row selectors tried one by one
    pub patterns: &'static [&'static str],
    /// Selector and table rows must be longer than this (in chars)
    pub min_row_len: usize,
    /// Container whose text is split into lines as a last resort
    pub container: &'static str,
}

const TABLE_ROWS: &str = "table tr";

impl SelectorTiers {
    /// Run the tiers; `None` when all of them came back empty
    pub async fn select(&self, page: &dyn PortalPage) -> Result<Option<(Tier, Vec<String>)>> {
        for pattern in self.patterns {
            let rows = rows(page.texts(pattern).await?, self.min_row_len);
            if !rows.is_empty() {
                debug!(pattern = %pattern, count = rows.len(), "Rows matched by pattern");
                return Ok(Some((Tier::Patterns, rows)));
            }
        }

        let rows = rows(page.texts(TABLE_ROWS).await?, self.min_row_len);
        if !rows.is_empty() {
            debug!(count = rows.len(), "Rows matched by table scan");
            return Ok(Some((Tier::TableRows, rows)));
        }

        if let Some(text) = page.text(self.container).await? {
            let lines: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            if !lines.is_empty() {
                debug!(container = %self.container, count = lines.len(), "Rows read from container");
                return Ok(Some((Tier::Container, lines)));
            }
        }

        Ok(None)
    }
}

/// Flatten element texts longer than `min_len` to single-line rows
///
/// Cell boundaries (tabs, newlines) become ` | `.
fn rows(texts: Vec<String>, min_len: usize) -> Vec<String> {
    texts
        .iter()
        .filter(|text| text.trim().chars().count() > min_len)
        .map(|text| {
            text.split(['\n', '\t'])
                .map(single_line)
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .filter(|row| !row.is_empty())
        .collect()
}
