//! Ordinal adjustment for positional locators
//!
//! A locator that encodes a position (`:nth-of-type(3)`) often breaks
//! because an element was inserted or removed nearby. Probing neighboring
//! ordinals and the first/last modifiers recovers those cheaply.

use regex::Regex;
use std::sync::OnceLock;

fn ordinal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":nth-(of-type|child)\((\d+)\)").unwrap())
}

/// A shifted positional candidate with its confidence
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PositionalCandidate {
    pub locator: String,
    pub confidence: f64,
}

/// Neighboring-ordinal candidates for a positional locator, or empty when
/// the locator encodes no ordinal.
///
/// Immediate neighbors (±1) are the most likely fix, then ±2, then the
/// first/last modifiers.
pub(crate) fn candidates(broken: &str) -> Vec<PositionalCandidate> {
    let Some(captures) = ordinal_re().captures(broken) else {
        return Vec::new();
    };

    let axis = captures[1].to_string();
    let ordinal: i64 = match captures[2].parse() {
        Ok(n) => n,
        Err(_) => return Vec::new(),
    };
    let matched = captures.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();

    let mut result = Vec::new();

    for (delta, confidence) in [(-1, 0.65), (1, 0.65), (-2, 0.62), (2, 0.62)] {
        let shifted = ordinal + delta;
        if shifted < 1 {
            continue;
        }
        let replacement = format!(":nth-{}({})", axis, shifted);
        result.push(PositionalCandidate {
            locator: broken.replace(&matched, &replacement),
            confidence,
        });
    }

    for modifier in ["first", "last"] {
        let replacement = match axis.as_str() {
            "of-type" => format!(":{}-of-type", modifier),
            _ => format!(":{}-child", modifier),
        };
        result.push(PositionalCandidate {
            locator: broken.replace(&matched, &replacement),
            confidence: 0.6,
        });
    }

    result
}
