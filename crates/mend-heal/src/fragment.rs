//! Fragment hints embedded in a broken locator
//!
//! A broken locator often still carries usable hints: a quoted text
//! fragment, an id token, a class token, an aria-label value. Each hint is
//! retried as a standalone, more tolerant locator before any live-page
//! scanning happens.

use regex::Regex;
use std::sync::OnceLock;

fn quoted_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).unwrap())
}

fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([A-Za-z][\w-]*)").unwrap())
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.([A-Za-z][\w-]*)").unwrap())
}

fn aria_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\[aria-label\s*=\s*["']([^"']+)["']\]"#).unwrap())
}

/// One hint recovered from a broken locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorFragment {
    /// `#id` token
    Id(String),
    /// `[aria-label="…"]` value
    AriaLabel(String),
    /// Quoted text fragment
    Text(String),
    /// `.class` token
    Class(String),
}

impl LocatorFragment {
    /// How much to trust a match found through this fragment kind.
    /// Ids are the most stable hint, bare class tokens the least.
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Id(_) => 0.9,
            Self::AriaLabel(_) => 0.85,
            Self::Text(_) => 0.8,
            Self::Class(_) => 0.7,
        }
    }

    /// Standalone tolerant locator for this fragment
    pub fn as_locator(&self) -> String {
        match self {
            Self::Id(id) => format!("#{}", id),
            Self::AriaLabel(label) => format!("[aria-label=\"{}\"]", label),
            Self::Text(text) => format!("text=\"{}\"", text),
            Self::Class(class) => format!(".{}", class),
        }
    }
}

/// Parse every fragment hint out of a broken locator, strongest first.
pub fn parse_fragments(locator: &str) -> Vec<LocatorFragment> {
    let mut fragments = Vec::new();

    for captures in id_re().captures_iter(locator) {
        fragments.push(LocatorFragment::Id(captures[1].to_string()));
    }

    // Aria-label values before generic quoted text so the same quotes are
    // not reported twice
    let mut aria_values = Vec::new();
    for captures in aria_label_re().captures_iter(locator) {
        let value = captures[1].to_string();
        aria_values.push(value.clone());
        fragments.push(LocatorFragment::AriaLabel(value));
    }

    for captures in quoted_text_re().captures_iter(locator) {
        let value = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        if !value.is_empty() && !aria_values.contains(&value) {
            fragments.push(LocatorFragment::Text(value));
        }
    }

    for captures in class_re().captures_iter(locator) {
        fragments.push(LocatorFragment::Class(captures[1].to_string()));
    }

    fragments.sort_by(|a, b| {
        b.confidence()
            .partial_cmp(&a.confidence())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fragments
}

/// Move fragments whose standalone locator matches a known anti-pattern to
/// the back of the candidate order, keeping relative order otherwise.
pub fn deprioritize_anti_patterns(
    fragments: Vec<LocatorFragment>,
    anti_patterns: &[String],
) -> Vec<LocatorFragment> {
    let (clean, tainted): (Vec<_>, Vec<_>) = fragments.into_iter().partition(|f| {
        let locator = f.as_locator();
        !anti_patterns.iter().any(|p| locator.contains(p.as_str()))
    });

    clean.into_iter().chain(tainted).collect()
}
