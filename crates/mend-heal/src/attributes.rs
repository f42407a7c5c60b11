//! Attribute re-matching against the live snapshot
//!
//! When fragment hints fail, scan the snapshot for elements with the same
//! tag as the broken locator and rebuild a locator from whatever stable
//! attributes the live page actually carries.

use crate::probe::PageElement;
use regex::Regex;
use std::sync::OnceLock;

fn leading_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-zA-Z][a-zA-Z0-9]*)").unwrap())
}

/// A rebuilt locator candidate with its confidence
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttributeCandidate {
    pub locator: String,
    pub confidence: f64,
}

/// Tag name encoded at the start of a locator, if any
pub(crate) fn leading_tag(locator: &str) -> Option<String> {
    leading_tag_re()
        .captures(locator)
        .map(|c| c[1].to_lowercase())
}

/// Rebuild locator candidates from stable attributes of same-tag elements.
///
/// Candidates are ordered by attribute stability: the test identifier
/// first, then name, then type, then a text match as the weakest rebuild.
pub(crate) fn candidates(broken: &str, snapshot: &[PageElement]) -> Vec<AttributeCandidate> {
    let tag = leading_tag(broken);
    let mut result = Vec::new();

    for element in snapshot {
        if let Some(ref tag) = tag {
            if &element.tag != tag {
                continue;
            }
        }

        let prefix = tag.as_deref().unwrap_or(&element.tag);

        if let Some(ref test_id) = element.test_id {
            result.push(AttributeCandidate {
                locator: format!("{}[data-testid=\"{}\"]", prefix, test_id),
                confidence: 0.75,
            });
        }
        if let Some(ref name) = element.name_attr {
            result.push(AttributeCandidate {
                locator: format!("{}[name=\"{}\"]", prefix, name),
                confidence: 0.72,
            });
        }
        if let Some(ref type_attr) = element.type_attr {
            result.push(AttributeCandidate {
                locator: format!("{}[type=\"{}\"]", prefix, type_attr),
                confidence: 0.7,
            });
        }
        if let Some(ref text) = element.text {
            let text = text.trim();
            if !text.is_empty() {
                result.push(AttributeCandidate {
                    locator: format!("{}:has-text(\"{}\")", prefix, text),
                    confidence: 0.7,
                });
            }
        }
    }

    result.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    result.dedup_by(|a, b| a.locator == b.locator);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_tag() {
        assert_eq!(leading_tag("button.old-class"), Some("button".to_string()));
        assert_eq!(leading_tag("input[name=\"qty\"]"), Some("input".to_string()));
        assert_eq!(leading_tag("#save"), None);
        assert_eq!(leading_tag(".card"), None);
    }

    #[test]
    fn test_same_tag_filter() {
        let snapshot = vec![
            PageElement::new("button").with_text("Submit Order"),
            PageElement::new("a").with_text("Cancel"),
        ];

        let candidates = candidates("button.old-class", &snapshot);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].locator, "button:has-text(\"Submit Order\")");
        assert!((0.7..=0.75).contains(&candidates[0].confidence));
    }

    #[test]
    fn test_stable_attributes_outrank_text() {
        let snapshot = vec![PageElement::new("input")
            .with_test_id("qty-input")
            .with_name("quantity")
            .with_type("number")];

        let candidates = candidates("input.qty", &snapshot);
        assert_eq!(candidates[0].locator, "input[data-testid=\"qty-input\"]");
        assert_eq!(candidates[1].locator, "input[name=\"quantity\"]");
        assert_eq!(candidates[2].locator, "input[type=\"number\"]");
    }

    #[test]
    fn test_no_tag_considers_all_elements() {
        let snapshot = vec![
            PageElement::new("button").with_test_id("save"),
            PageElement::new("input").with_name("qty"),
        ];

        let candidates = candidates("#gone", &snapshot);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_empty_snapshot_yields_nothing() {
        assert!(candidates("button.x", &[]).is_empty());
    }
}
