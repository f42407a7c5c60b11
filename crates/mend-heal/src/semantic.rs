//! Semantic fallback: ask the language-model service for a replacement
//!
//! Last resort of the cascade. The service sees the broken locator, the
//! route, and a compact description of the visible elements, and answers
//! with a primary suggestion plus ordered alternatives. Every suggestion
//! is verified against the live page before it is accepted.

use crate::probe::{PageElement, PageProbe};
use mend_core::Result;
use mend_llm::{parse_response, ChatMessage, SemanticClient};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Replacement proposed by the semantic service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealSuggestion {
    /// Primary replacement locator
    pub suggestion: String,
    /// Service-reported confidence
    #[serde(default)]
    pub confidence: f64,
    /// Why the service believes this matches
    #[serde(default)]
    pub rationale: String,
    /// Ordered fallback locators
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// Build the healing prompt from the broken locator and page state.
pub(crate) fn build_prompt(
    broken: &str,
    route: &str,
    snapshot: &[PageElement],
    max_elements: usize,
) -> String {
    let mut elements = String::new();
    for element in snapshot.iter().take(max_elements) {
        elements.push_str("- ");
        elements.push_str(&element.describe());
        elements.push('\n');
    }

    format!(
        "A UI test locator no longer matches anything on the page.\n\n\
         Broken locator: `{broken}`\n\
         Route: {route}\n\n\
         Visible interactive elements:\n{elements}\n\
         Suggest a replacement locator for the element the broken locator most \
         likely targeted. Respond with JSON only:\n\
         {{\"suggestion\": \"...\", \"confidence\": 0.0, \"rationale\": \"...\", \
         \"alternatives\": [\"...\"]}}"
    )
}

/// Parse a service completion into a suggestion.
pub(crate) fn parse_suggestion(completion: &str) -> Result<HealSuggestion> {
    parse_response(completion)
}

/// Ask the service for a replacement and verify its suggestions in order.
/// Returns the first suggestion that resolves to a visible element.
pub(crate) async fn resolve(
    client: &SemanticClient,
    probe: &dyn PageProbe,
    broken: &str,
    route: &str,
    snapshot: &[PageElement],
    max_elements: usize,
    probe_timeout: Duration,
) -> Result<Option<(String, f64)>> {
    let prompt = build_prompt(broken, route, snapshot, max_elements);
    let completion = client.complete(&[ChatMessage::user(prompt)]).await?;
    let parsed = parse_suggestion(&completion)?;

    debug!(
        "Semantic suggestion for `{}`: `{}` ({} alternatives): {}",
        broken,
        parsed.suggestion,
        parsed.alternatives.len(),
        parsed.rationale
    );

    let confidence = parsed.confidence.clamp(0.0, 1.0);

    if probe.is_visible(&parsed.suggestion, probe_timeout).await {
        return Ok(Some((parsed.suggestion, confidence)));
    }

    for alternative in &parsed.alternatives {
        if probe.is_visible(alternative, probe_timeout).await {
            return Ok(Some((alternative.clone(), confidence)));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_caps_elements() {
        let snapshot: Vec<PageElement> = (0..40)
            .map(|i| PageElement::new("button").with_text(format!("Button {}", i)))
            .collect();

        let prompt = build_prompt("button.gone", "/orders", &snapshot, 20);
        assert!(prompt.contains("Button 19"));
        assert!(!prompt.contains("Button 20"));
    }

    #[test]
    fn test_prompt_carries_context() {
        let snapshot = vec![PageElement::new("button").with_text("Submit Order")];
        let prompt = build_prompt("button.gone", "/orders/new", &snapshot, 20);

        assert!(prompt.contains("button.gone"));
        assert!(prompt.contains("/orders/new"));
        assert!(prompt.contains("Submit Order"));
    }

    #[test]
    fn test_parse_suggestion_from_fenced_completion() {
        let completion = "Looking at the page, the best match is:\n```json\n\
            {\"suggestion\": \"[data-testid=\\\"submit\\\"]\", \"confidence\": 0.82, \
             \"rationale\": \"same role and text\", \"alternatives\": [\"button[type=\\\"submit\\\"]\"]}\n```";

        let parsed = parse_suggestion(completion).unwrap();
        assert_eq!(parsed.suggestion, "[data-testid=\"submit\"]");
        assert!((parsed.confidence - 0.82).abs() < 1e-9);
        assert_eq!(parsed.alternatives.len(), 1);
    }

    #[test]
    fn test_parse_suggestion_defaults() {
        let parsed = parse_suggestion(r##"{"suggestion": "#save"}"##).unwrap();
        assert_eq!(parsed.suggestion, "#save");
        assert!(parsed.alternatives.is_empty());
    }

    #[test]
    fn test_unparseable_completion_errors() {
        assert!(parse_suggestion("no elements matched, sorry").is_err());
    }
}
