//! Observation ingestion for the reliability model
//!
//! The recorder is the only component that flushes the model during a run.
//! Statistical updates are direct and unconditional; the semantic pattern
//! extraction is a non-fatal enhancement that degrades to the statistics
//! alone when the service is unavailable.

use crate::store::ModelStore;
use mend_core::fail_open::fail_open;
use mend_core::{ElementObservation, Result};
use mend_llm::{parse_response, ChatMessage, SemanticClient};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// How many distinct visible texts a route signature samples
const SIGNATURE_SAMPLE_SIZE: usize = 5;

/// Pattern fragments suggested by the semantic service
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PatternSuggestion {
    common_patterns: Vec<String>,
    anti_patterns: Vec<String>,
}

/// Ingests interaction outcomes and keeps the reliability model current.
pub struct ObservationRecorder {
    store: Arc<ModelStore>,
    semantic: Option<Arc<SemanticClient>>,
}

impl ObservationRecorder {
    /// Create a recorder backed by the given store, statistics-only.
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self {
            store,
            semantic: None,
        }
    }

    /// Enable semantic pattern extraction on top of the direct updates.
    pub fn with_semantic_client(mut self, client: Arc<SemanticClient>) -> Self {
        self.semantic = Some(client);
        self
    }

    /// Record a batch of observations from a single route visit.
    ///
    /// Updates every locator's reliability score, refreshes the route
    /// signature, optionally asks the service for pattern fragments
    /// (fail-open), and flushes the model for crash-safety.
    pub async fn observe_route(
        &self,
        route: &str,
        observations: &[ElementObservation],
    ) -> Result<()> {
        debug!(
            "Recording {} observations for route {}",
            observations.len(),
            route
        );

        for obs in observations {
            self.store
                .update_selector_reliability(&obs.locator, obs.succeeded)
                .await;

            if !obs.succeeded {
                self.store
                    .record_element_behavior(&obs.locator, &format!("failed_{}", obs.interaction))
                    .await;
            }
        }

        let signature = derive_signature(observations);
        if !signature.is_empty() {
            self.store.set_route_signature(route, signature).await;
        }

        if let Some(ref client) = self.semantic {
            fail_open("pattern_extraction", || {
                self.extract_patterns(client, route, observations)
            })
            .await;
        }

        self.store.save().await
    }

    /// Record one test execution outcome and flush.
    pub async fn record_test_result(&self, test: &str, passed: bool) -> Result<()> {
        let rate = self.store.update_test_stability(test, passed).await;
        info!("Test {} {} (stability now {:.2})", test, if passed { "passed" } else { "failed" }, rate);
        self.store.save().await
    }

    /// Fraction of a route's remembered signature texts missing from the
    /// current batch. 0.0 means no drift (or no stored signature yet).
    pub async fn signature_drift(&self, route: &str, observations: &[ElementObservation]) -> f64 {
        let Some(stored) = self.store.route_signature(route).await else {
            return 0.0;
        };
        if stored.is_empty() {
            return 0.0;
        }

        let current: Vec<&str> = observations
            .iter()
            .filter_map(|o| o.visible_text.as_deref())
            .collect();

        let missing = stored
            .iter()
            .filter(|text| !current.iter().any(|c| c == text))
            .count();

        missing as f64 / stored.len() as f64
    }

    async fn extract_patterns(
        &self,
        client: &SemanticClient,
        route: &str,
        observations: &[ElementObservation],
    ) -> Result<()> {
        let mut summary = String::new();
        for obs in observations {
            summary.push_str(&format!(
                "- {} {} on `{}` (text: {:?}): {}\n",
                obs.interaction,
                obs.element_type,
                obs.locator,
                obs.visible_text.as_deref().unwrap_or(""),
                if obs.succeeded { "ok" } else { "FAILED" }
            ));
        }

        let prompt = format!(
            "These element interactions were observed on route {route}:\n\n{summary}\n\
             Identify locator fragments that predict success or failure. Respond with \
             JSON only: {{\"commonPatterns\": [\"...\"], \"antiPatterns\": [\"...\"]}}. \
             Use short fragments (an attribute name, a class token, a pseudo-selector), \
             not full locators. Empty arrays are fine."
        );

        let completion = client.complete(&[ChatMessage::user(prompt)]).await?;
        let suggestion: PatternSuggestion = parse_response(&completion)?;

        for fragment in &suggestion.common_patterns {
            self.store.record_pattern(fragment, false).await;
        }
        for fragment in &suggestion.anti_patterns {
            self.store.record_pattern(fragment, true).await;
        }

        debug!(
            "Recorded {} common and {} anti pattern fragments for {}",
            suggestion.common_patterns.len(),
            suggestion.anti_patterns.len(),
            route
        );
        Ok(())
    }
}

/// First few distinct non-empty visible texts, in observation order.
fn derive_signature(observations: &[ElementObservation]) -> Vec<String> {
    let mut sample: Vec<String> = Vec::new();

    for obs in observations {
        let Some(text) = obs.visible_text.as_deref() else {
            continue;
        };
        let text = text.trim();
        if text.is_empty() || sample.iter().any(|s| s == text) {
            continue;
        }
        sample.push(text.to_string());
        if sample.len() == SIGNATURE_SAMPLE_SIZE {
            break;
        }
    }

    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_core::InteractionKind;
    use tempfile::tempdir;

    fn obs(locator: &str, text: Option<&str>, succeeded: bool) -> ElementObservation {
        let mut o = ElementObservation::new(locator, "button", InteractionKind::Click, succeeded);
        if let Some(t) = text {
            o = o.with_text(t);
        }
        o
    }

    #[tokio::test]
    async fn test_observe_route_updates_and_flushes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        let store = Arc::new(ModelStore::load(&path).await);
        let recorder = ObservationRecorder::new(store.clone());

        recorder
            .observe_route(
                "/orders",
                &[
                    obs("#save", Some("Save"), true),
                    obs("button.legacy", Some("Submit Order"), false),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.selector_reliability("#save").await, Some(0.6));
        assert_eq!(store.selector_reliability("button.legacy").await, Some(0.3));

        // Flushed to disk
        assert!(path.exists());
        let reloaded = ModelStore::load(&path).await;
        assert_eq!(reloaded.selector_reliability("#save").await, Some(0.6));
    }

    #[tokio::test]
    async fn test_signature_samples_distinct_texts() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ModelStore::load(dir.path().join("model.json")).await);
        let recorder = ObservationRecorder::new(store.clone());

        let batch: Vec<ElementObservation> = vec![
            obs("#a", Some("Orders"), true),
            obs("#b", Some("Orders"), true),
            obs("#c", None, true),
            obs("#d", Some("Picking"), true),
            obs("#e", Some("Packing"), true),
            obs("#f", Some("Inventory"), true),
            obs("#g", Some("Shipping"), true),
            obs("#h", Some("Returns"), true),
        ];
        recorder.observe_route("/wms", &batch).await.unwrap();

        let signature = store.route_signature("/wms").await.unwrap();
        assert_eq!(
            signature,
            vec!["Orders", "Picking", "Packing", "Inventory", "Shipping"]
        );
    }

    #[tokio::test]
    async fn test_signature_drift() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ModelStore::load(dir.path().join("model.json")).await);
        let recorder = ObservationRecorder::new(store.clone());

        recorder
            .observe_route(
                "/orders",
                &[obs("#a", Some("Orders"), true), obs("#b", Some("Picking"), true)],
            )
            .await
            .unwrap();

        // Same texts: no drift
        let drift = recorder
            .signature_drift(
                "/orders",
                &[obs("#a", Some("Orders"), true), obs("#b", Some("Picking"), true)],
            )
            .await;
        assert!(drift.abs() < 1e-9);

        // One of two remembered texts gone
        let drift = recorder
            .signature_drift("/orders", &[obs("#a", Some("Orders"), true)])
            .await;
        assert!((drift - 0.5).abs() < 1e-9);

        // Unknown route: no drift by definition
        let drift = recorder.signature_drift("/unknown", &[]).await;
        assert!(drift.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_test_result_updates_stability() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ModelStore::load(dir.path().join("model.json")).await);
        let recorder = ObservationRecorder::new(store.clone());

        recorder.record_test_result("orders_smoke", true).await.unwrap();
        assert_eq!(store.test_stability("orders_smoke").await, Some(0.6));

        recorder.record_test_result("orders_smoke", false).await.unwrap();
        assert_eq!(store.test_stability("orders_smoke").await, Some(0.48));
    }

    #[tokio::test]
    async fn test_semantic_failure_is_non_fatal() {
        use mend_core::config::ServiceConfig;

        let dir = tempdir().unwrap();
        let store = Arc::new(ModelStore::load(dir.path().join("model.json")).await);

        // Nothing listens here; extraction must fail open
        let config = ServiceConfig {
            api_url: "http://127.0.0.1:9/v1/messages".to_string(),
            min_call_interval_ms: 0,
            max_retries: 0,
            initial_backoff_secs: 0,
            ..ServiceConfig::default()
        };
        let client = Arc::new(SemanticClient::new(config).with_api_key("test-key"));
        let recorder = ObservationRecorder::new(store.clone()).with_semantic_client(client);

        recorder
            .observe_route("/orders", &[obs("#save", Some("Save"), true)])
            .await
            .unwrap();

        // Direct statistical update still applied
        assert_eq!(store.selector_reliability("#save").await, Some(0.6));
    }
}
