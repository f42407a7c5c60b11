//! JSON recovery from free-form service completions
//!
//! The service answers in prose more often than it should: fenced code
//! blocks, leading commentary, single-quoted strings, unquoted keys,
//! truncated tails. Extraction is a bounded, explicit pipeline (locate a
//! candidate span, apply a fixed set of repairs, parse strictly) rather
//! than ad hoc string munging at call sites. When no valid span can be
//! recovered the caller gets a descriptive error and takes its fallback.

use mend_core::{MendError, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap())
}

fn unquoted_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)\s*:"#).unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

/// Extract a JSON object or array from a service completion.
///
/// Tolerates surrounding prose, fenced code blocks, and minor quoting
/// errors. Fails with [`MendError::ResponseParse`] when nothing parseable
/// can be recovered.
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();

    // Cheapest case first: the completion is already JSON
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Ok(value);
        }
    }

    // Fenced code block
    if let Some(captures) = fence_re().captures(trimmed) {
        let inner = captures[1].trim();
        if let Some(value) = parse_with_repairs(inner) {
            return Ok(value);
        }
    }

    // Balanced span scan over the raw text
    if let Some(span) = balanced_span(trimmed) {
        if let Some(value) = parse_with_repairs(&span) {
            return Ok(value);
        }
    }

    Err(MendError::ResponseParse(format!(
        "No JSON object or array could be recovered from a {}-char completion starting with: {:?}",
        trimmed.len(),
        trimmed.chars().take(60).collect::<String>()
    )))
}

/// Extract and deserialize into a strict shape.
pub fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|e| {
        MendError::ResponseParse(format!(
            "Recovered JSON did not match the expected {} shape: {}",
            std::any::type_name::<T>(),
            e
        ))
    })
}

/// Locate the first balanced `{…}`/`[…]` span. A span left unclosed at end
/// of input (truncated completion) is closed with the missing brackets.
fn balanced_span(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let mut depth_stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth_stack.push(ch),
            '}' | ']' if !in_string => {
                depth_stack.pop();
                if depth_stack.is_empty() {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }

    // Truncated: close whatever is still open, innermost first
    let mut span = text[start..].trim_end().to_string();
    if in_string {
        span.push('"');
    }
    // A dangling comma before the forced closers would re-break the parse
    while span.ends_with(',') {
        span.pop();
    }
    for open in depth_stack.iter().rev() {
        span.push(if *open == '{' { '}' } else { ']' });
    }
    Some(span)
}

/// Try the candidate raw, then under each bounded repair combination.
fn parse_with_repairs(candidate: &str) -> Option<Value> {
    let attempts = [
        candidate.to_string(),
        structural_repairs(candidate),
        structural_repairs(&candidate.replace('\'', "\"")),
    ];

    attempts.iter().find_map(|attempt| {
        serde_json::from_str::<Value>(attempt)
            .ok()
            .filter(|v| v.is_object() || v.is_array())
    })
}

/// Quote unquoted keys and drop trailing commas.
fn structural_repairs(s: &str) -> String {
    let keyed = unquoted_key_re().replace_all(s, "$1\"$2\":");
    trailing_comma_re().replace_all(&keyed, "$1").to_string()
}
