//! The healing cascade

use crate::attributes;
use crate::fragment::{deprioritize_anti_patterns, parse_fragments};
use crate::positional;
use crate::probe::{PageElement, PageProbe};
use crate::semantic;
use mend_core::config::CascadeConfig;
use mend_model::ModelStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use mend_llm::SemanticClient;

/// Cascade entries for one broken locator before it is recorded as an
/// anti-pattern candidate
const ANTI_PATTERN_THRESHOLD: u32 = 2;

/// Which cascade step produced a replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealMethod {
    DirectRetry,
    Fragment,
    AttributeMatch,
    Positional,
    Semantic,
}

impl std::fmt::Display for HealMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectRetry => write!(f, "direct_retry"),
            Self::Fragment => write!(f, "fragment"),
            Self::AttributeMatch => write!(f, "attribute_match"),
            Self::Positional => write!(f, "positional"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// A verified replacement locator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealedLocator {
    /// Replacement that currently resolves to a visible element
    pub locator: String,
    /// Confidence in the replacement, in [0,1]
    pub confidence: f64,
    /// Strategy that found it
    pub method: HealMethod,
}

/// Context for one resolution attempt
#[derive(Debug, Clone, Default)]
pub struct HealContext {
    /// Route the interaction happened on
    pub route: String,
}

impl HealContext {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
        }
    }
}

/// Walks the healing cascade for broken locators.
///
/// Holds two caches with deliberately different lifetimes: the in-session
/// resolution cache (dies with this engine) and the shared durable model
/// (anti-patterns in, reliability updates out).
pub struct HealingEngine {
    store: Arc<ModelStore>,
    semantic: Option<Arc<SemanticClient>>,
    config: CascadeConfig,
    /// Successful resolutions for this run, keyed by the broken locator
    cache: Mutex<HashMap<String, HealedLocator>>,
    /// How often each broken locator has entered the cascade this run
    entries: Mutex<HashMap<String, u32>>,
}

impl HealingEngine {
    /// Create an engine without the semantic fallback step.
    pub fn new(store: Arc<ModelStore>, config: CascadeConfig) -> Self {
        Self {
            store,
            semantic: None,
            config,
            cache: Mutex::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Enable the semantic fallback step.
    pub fn with_semantic_client(mut self, client: Arc<SemanticClient>) -> Self {
        self.semantic = Some(client);
        self
    }

    /// Find a replacement for a broken locator.
    ///
    /// Never errors: every internal failure is treated as that step's miss.
    /// `None` means the whole cascade was exhausted and the caller should
    /// record an ordinary interaction failure.
    pub async fn resolve(
        &self,
        broken: &str,
        probe: &dyn PageProbe,
        ctx: &HealContext,
    ) -> Option<HealedLocator> {
        if let Some(hit) = self.cache.lock().await.get(broken) {
            debug!("Healing cache hit for `{}` -> `{}`", broken, hit.locator);
            return Some(hit.clone());
        }

        self.note_cascade_entry(broken).await;

        let probe_timeout = Duration::from_millis(self.config.probe_timeout_ms);

        // Step 1: direct retry after a short visibility wait
        let retry_wait = Duration::from_millis(self.config.retry_wait_ms);
        if probe.is_visible(broken, retry_wait).await {
            debug!("Locator `{}` recovered on direct retry", broken);
            return self
                .accept(broken, broken.to_string(), 0.95, HealMethod::DirectRetry)
                .await;
        }

        // Step 2: fragments embedded in the broken locator
        let anti_patterns = self.store.anti_patterns().await;
        let fragments = deprioritize_anti_patterns(parse_fragments(broken), &anti_patterns);
        for fragment in fragments {
            let candidate = fragment.as_locator();
            if candidate == broken {
                continue;
            }
            if probe.is_visible(&candidate, probe_timeout).await {
                return self
                    .accept(broken, candidate, fragment.confidence(), HealMethod::Fragment)
                    .await;
            }
        }

        // The remaining steps need the live snapshot
        let snapshot = self.snapshot_or_empty(probe).await;

        // Step 3: attribute re-matching against same-tag elements
        for candidate in attributes::candidates(broken, &snapshot) {
            if candidate.locator == broken {
                continue;
            }
            if probe.is_visible(&candidate.locator, probe_timeout).await {
                return self
                    .accept(
                        broken,
                        candidate.locator,
                        candidate.confidence,
                        HealMethod::AttributeMatch,
                    )
                    .await;
            }
        }

        // Step 4: neighboring ordinals for positional locators
        for candidate in positional::candidates(broken) {
            if probe.is_visible(&candidate.locator, probe_timeout).await {
                return self
                    .accept(
                        broken,
                        candidate.locator,
                        candidate.confidence,
                        HealMethod::Positional,
                    )
                    .await;
            }
        }

        // Step 5: semantic fallback, only once everything cheaper failed
        if let Some(ref client) = self.semantic {
            match semantic::resolve(
                client,
                probe,
                broken,
                &ctx.route,
                &snapshot,
                self.config.max_snapshot_elements,
                probe_timeout,
            )
            .await
            {
                Ok(Some((locator, confidence))) => {
                    return self
                        .accept(broken, locator, confidence, HealMethod::Semantic)
                        .await;
                }
                Ok(None) => {
                    debug!("Semantic suggestions for `{}` did not verify", broken);
                }
                Err(e) => {
                    warn!("Semantic fallback failed for `{}`: {}", broken, e);
                }
            }
        }

        info!("Locator `{}` is unresolved after the full cascade", broken);
        None
    }

    /// Number of successful resolutions cached this run
    pub async fn cached_resolutions(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn note_cascade_entry(&self, broken: &str) {
        let count = {
            let mut entries = self.entries.lock().await;
            let count = entries.entry(broken.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if count == ANTI_PATTERN_THRESHOLD {
            debug!(
                "Locator `{}` entered the cascade {} times; recording as anti-pattern",
                broken, count
            );
            self.store.record_pattern(broken, true).await;
        }
    }

    async fn snapshot_or_empty(&self, probe: &dyn PageProbe) -> Vec<PageElement> {
        match probe.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Snapshot failed; skipping snapshot-based strategies: {}", e);
                Vec::new()
            }
        }
    }

    async fn accept(
        &self,
        broken: &str,
        locator: String,
        confidence: f64,
        method: HealMethod,
    ) -> Option<HealedLocator> {
        info!(
            "Healed `{}` -> `{}` via {} (confidence {:.2})",
            broken, locator, method, confidence
        );

        self.store.update_selector_reliability(&locator, true).await;

        let healed = HealedLocator {
            locator,
            confidence,
            method,
        };
        self.cache
            .lock()
            .await
            .insert(broken.to_string(), healed.clone());
        Some(healed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mend_core::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Probe backed by a fixed set of visible locators
    struct FakeProbe {
        visible: Vec<String>,
        elements: Vec<PageElement>,
        visibility_checks: AtomicUsize,
        snapshot_calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(visible: &[&str], elements: Vec<PageElement>) -> Self {
            Self {
                visible: visible.iter().map(|s| s.to_string()).collect(),
                elements,
                visibility_checks: AtomicUsize::new(0),
                snapshot_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageProbe for FakeProbe {
        async fn snapshot(&self) -> Result<Vec<PageElement>> {
            self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.elements.clone())
        }

        async fn is_visible(&self, locator: &str, _timeout: Duration) -> bool {
            self.visibility_checks.fetch_add(1, Ordering::SeqCst);
            self.visible.iter().any(|v| v == locator)
        }
    }

    async fn engine(dir: &tempfile::TempDir) -> (HealingEngine, Arc<ModelStore>) {
        let store = Arc::new(ModelStore::load(dir.path().join("model.json")).await);
        let engine = HealingEngine::new(store.clone(), CascadeConfig::default());
        (engine, store)
    }

    #[tokio::test]
    async fn test_direct_retry_wins_for_transient_breakage() {
        let dir = tempdir().unwrap();
        let (engine, _) = engine(&dir).await;
        let probe = FakeProbe::new(&["#save"], vec![]);

        let healed = engine
            .resolve("#save", &probe, &HealContext::new("/orders"))
            .await
            .unwrap();

        assert_eq!(healed.method, HealMethod::DirectRetry);
        assert_eq!(healed.locator, "#save");
    }

    #[tokio::test]
    async fn test_fragment_resolution_skips_snapshot() {
        let dir = tempdir().unwrap();
        let (engine, store) = engine(&dir).await;

        // The id embedded in the broken locator still exists on the page
        let probe = FakeProbe::new(&["#order-total"], vec![]);

        let healed = engine
            .resolve(
                "div#order-total.stale-class",
                &probe,
                &HealContext::new("/orders"),
            )
            .await
            .unwrap();

        assert_eq!(healed.method, HealMethod::Fragment);
        assert_eq!(healed.locator, "#order-total");
        assert!((healed.confidence - 0.9).abs() < 1e-9);

        // Cheaper strategies resolved it: the snapshot was never taken
        assert_eq!(probe.snapshot_calls.load(Ordering::SeqCst), 0);

        // The winning locator got a positive reliability update
        assert_eq!(store.selector_reliability("#order-total").await, Some(0.6));
    }

    #[tokio::test]
    async fn test_attribute_match_scenario() {
        // A pure class selector breaks on a page that has a button with
        // text "Submit Order" and no matching class: fragments cannot fire,
        // attribute re-matching must.
        let dir = tempdir().unwrap();
        let (engine, _) = engine(&dir).await;

        let probe = FakeProbe::new(
            &["button:has-text(\"Submit Order\")"],
            vec![PageElement::new("button").with_text("Submit Order")],
        );

        let healed = engine
            .resolve("button.old-class", &probe, &HealContext::new("/orders"))
            .await
            .unwrap();

        assert_eq!(healed.method, HealMethod::AttributeMatch);
        assert_eq!(healed.locator, "button:has-text(\"Submit Order\")");
        assert!((0.7..=0.75).contains(&healed.confidence));
    }

    #[tokio::test]
    async fn test_positional_adjustment() {
        let dir = tempdir().unwrap();
        let (engine, _) = engine(&dir).await;
        let probe = FakeProbe::new(&["li:nth-of-type(4)"], vec![]);

        let healed = engine
            .resolve("li:nth-of-type(3)", &probe, &HealContext::new("/picking"))
            .await
            .unwrap();

        assert_eq!(healed.method, HealMethod::Positional);
        assert_eq!(healed.locator, "li:nth-of-type(4)");
        assert!((0.6..=0.65).contains(&healed.confidence));
    }

    #[tokio::test]
    async fn test_exhausted_cascade_returns_none() {
        let dir = tempdir().unwrap();
        let (engine, _) = engine(&dir).await;
        let probe = FakeProbe::new(&[], vec![]);

        let healed = engine
            .resolve("button.gone", &probe, &HealContext::new("/orders"))
            .await;

        assert!(healed.is_none());
    }

    #[tokio::test]
    async fn test_successful_resolution_is_cached() {
        let dir = tempdir().unwrap();
        let (engine, _) = engine(&dir).await;
        let probe = FakeProbe::new(&["#order-total"], vec![]);
        let ctx = HealContext::new("/orders");

        engine.resolve("#order-total.stale", &probe, &ctx).await.unwrap();
        let checks_after_first = probe.visibility_checks.load(Ordering::SeqCst);

        let healed = engine.resolve("#order-total.stale", &probe, &ctx).await.unwrap();
        assert_eq!(healed.locator, "#order-total");

        // Cache hit: no further probing
        assert_eq!(
            probe.visibility_checks.load(Ordering::SeqCst),
            checks_after_first
        );
        assert_eq!(engine.cached_resolutions().await, 1);
    }

    #[tokio::test]
    async fn test_repeated_entries_record_anti_pattern() {
        let dir = tempdir().unwrap();
        let (engine, store) = engine(&dir).await;
        let probe = FakeProbe::new(&[], vec![]);
        let ctx = HealContext::new("/orders");

        assert!(engine.resolve("button.gone", &probe, &ctx).await.is_none());
        assert!(!store.matches_anti_pattern("button.gone").await);

        assert!(engine.resolve("button.gone", &probe, &ctx).await.is_none());
        assert!(store.matches_anti_pattern("button.gone").await);
    }

    #[tokio::test]
    async fn test_unreachable_semantic_service_degrades_to_none() {
        use mend_core::config::ServiceConfig;

        let dir = tempdir().unwrap();
        let store = Arc::new(ModelStore::load(dir.path().join("model.json")).await);
        let config = ServiceConfig {
            api_url: "http://127.0.0.1:9/v1/messages".to_string(),
            min_call_interval_ms: 0,
            max_retries: 0,
            initial_backoff_secs: 0,
            ..ServiceConfig::default()
        };
        let client = Arc::new(SemanticClient::new(config).with_api_key("test-key"));
        let engine = HealingEngine::new(store, CascadeConfig::default())
            .with_semantic_client(client);

        let probe = FakeProbe::new(&[], vec![PageElement::new("button").with_text("Save")]);
        let healed = engine
            .resolve("button.gone", &probe, &HealContext::new("/orders"))
            .await;

        // Service failure is this step's failure, not an error
        assert!(healed.is_none());
    }
}
