//! Label-anchored text matching
//!
//! Detail views are read from their rendered text, where each value sits
//! next to a fixed label. A `FieldPattern` tries its rules in order and
//! returns the first non-empty match.

use regex::Regex;

/// One way a labelled value can appear in rendered text
#[derive(Debug, Clone, Copy)]
pub enum LabelRule {
    /// Label alone on a line, value on the following line
    NextLine(&'static str),
    /// `Label: value` on a single line
    SameLine(&'static str),
    /// Every line after the label up to the `boundary` label, joined with
    /// spaces
    Until {
        label: &'static str,
        boundary: &'static str,
    },
}

impl LabelRule {
    fn compile(&self) -> Option<Regex> {
        let pattern = match self {
            Self::NextLine(label) => format!(
                r"(?m)^[ \t]*{}[ \t]*:?[ \t]*\n\s*([^\n]+)",
                regex::escape(label)
            ),
            Self::SameLine(label) => format!(
                r"(?m)^[ \t]*{}[ \t]*:[ \t]*(\S[^\n]*)",
                regex::escape(label)
            ),
            Self::Until { label, boundary } => format!(
                r"(?ms)^[ \t]*{}[ \t]*:?[ \t]*\n(.*?)\n[ \t]*{}",
                regex::escape(label),
                regex::escape(boundary)
            ),
        };

        Regex::new(&pattern).ok()
    }
}

/// Ordered fallback rules for one field
#[derive(Debug)]
pub struct FieldPattern {
    name: &'static str,
    rules: Vec<Regex>,
}

impl FieldPattern {
    pub fn new(name: &'static str, rules: &[LabelRule]) -> Self {
        Self {
            name,
            rules: rules.iter().filter_map(LabelRule::compile).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// First non-empty value any rule finds, flattened to one line
    pub fn find(&self, text: &str) -> Option<String> {
        self.rules
            .iter()
            .filter_map(|rule| rule.captures(text))
            .filter_map(|caps| caps.get(1).map(|m| single_line(m.as_str())))
            .find(|value| !value.is_empty())
    }
}

/// Collapse every run of whitespace, newlines included, to one space
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = "Ödev Detayı\nBaşlık\nKuvvet ve Hareket\nDers\nFizik\nAçıklama\nSayfa 42-45 arası\nçözülecek.\n\nBaşlama Tarihi\n10.10.2026\nSon Tarih\n17.10.2026\nÖğretmen\nAyşe Yılmaz\nKapat";

    #[test]
    fn test_next_line() {
        let pattern = FieldPattern::new("subject", &[LabelRule::NextLine("Ders")]);
        assert_eq!(pattern.find(DETAIL).as_deref(), Some("Fizik"));
    }

    #[test]
    fn test_until_boundary_spans_lines() {
        let pattern = FieldPattern::new(
            "description",
            &[LabelRule::Until {
                label: "Açıklama",
                boundary: "Başlama Tarihi",
            }],
        );
        assert_eq!(
            pattern.find(DETAIL).as_deref(),
            Some("Sayfa 42-45 arası çözülecek.")
        );
    }

    #[test]
    fn test_label_must_start_line() {
        // only "Son Tarih" and "Başlama Tarihi" lines exist
        let pattern = FieldPattern::new("due", &[LabelRule::NextLine("Tarih")]);
        assert_eq!(pattern.find(DETAIL), None);
    }

    #[test]
    fn test_fallback_order() {
        let text = "Öğretmen: Mehmet Demir";
        let pattern = FieldPattern::new(
            "teacher",
            &[LabelRule::NextLine("Öğretmen"), LabelRule::SameLine("Öğretmen")],
        );
        assert_eq!(pattern.find(text).as_deref(), Some("Mehmet Demir"));
    }

    #[test]
    fn test_missing_label() {
        let pattern = FieldPattern::new("due", &[LabelRule::NextLine("Son Tarih")]);
        assert_eq!(pattern.find("Başlık\nDeneme"), None);
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("  a\n\n b\tc "), "a b c");
    }
}
