//! Durable storage for the reliability model

use crate::model::ReliabilityModel;
use mend_core::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Shared handle to the reliability model and its backing file.
///
/// Loading is fail-open: a missing or corrupt file yields an empty model so
/// a test run never hard-fails on model corruption. Saving writes a temp
/// file and renames it over the target, so a crash mid-write leaves the
/// previous model intact.
///
/// Concurrent runs writing to the same file race with last-writer-wins
/// semantics; that is a documented limitation, not a serializability
/// guarantee.
pub struct ModelStore {
    path: PathBuf,
    model: RwLock<ReliabilityModel>,
}

impl ModelStore {
    /// Load the model from `path`, or start empty when the file is missing
    /// or unreadable.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let model = Self::read_model(&path).await;

        Self {
            path,
            model: RwLock::new(model),
        }
    }

    async fn read_model(path: &Path) -> ReliabilityModel {
        match fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<ReliabilityModel>(&content) {
                Ok(model) => {
                    info!(
                        "Loaded reliability model from {:?} ({} locators, {} tests)",
                        path,
                        model.selector_reliability.len(),
                        model.test_success_rates.len()
                    );
                    model
                }
                Err(e) => {
                    warn!(
                        "Reliability model at {:?} is corrupt ({}); starting empty",
                        path, e
                    );
                    ReliabilityModel::default()
                }
            },
            Err(e) => {
                debug!("No reliability model at {:?} ({}); starting empty", path, e);
                ReliabilityModel::default()
            }
        }
    }

    /// Flush the in-memory model to disk (write-temp-then-rename).
    pub async fn save(&self) -> Result<()> {
        let content = {
            let model = self.model.read().await;
            serde_json::to_string_pretty(&*model)?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!("Flushed reliability model to {:?}", self.path);
        Ok(())
    }

    /// Apply one interaction outcome to a locator's reliability score
    pub async fn update_selector_reliability(&self, locator: &str, success: bool) -> f64 {
        self.model
            .write()
            .await
            .update_selector_reliability(locator, success)
    }

    /// Apply one execution outcome to a test's stability score
    pub async fn update_test_stability(&self, test: &str, passed: bool) -> f64 {
        self.model.write().await.update_test_stability(test, passed)
    }

    /// Record a locator fragment as a common or anti pattern
    pub async fn record_pattern(&self, fragment: &str, is_anti: bool) {
        self.model.write().await.record_pattern(fragment, is_anti);
    }

    /// Tag a locator with an observed behavior
    pub async fn record_element_behavior(&self, locator: &str, behavior: &str) {
        self.model
            .write()
            .await
            .record_element_behavior(locator, behavior);
    }

    /// Replace a route's signature sample
    pub async fn set_route_signature(&self, route: &str, sample_texts: Vec<String>) {
        self.model
            .write()
            .await
            .set_route_signature(route, sample_texts);
    }

    /// Current reliability score for a locator
    pub async fn selector_reliability(&self, locator: &str) -> Option<f64> {
        self.model.read().await.selector_reliability(locator)
    }

    /// Current stability score for a test
    pub async fn test_stability(&self, test: &str) -> Option<f64> {
        self.model.read().await.test_stability(test)
    }

    /// Whether a locator contains any known anti-pattern fragment
    pub async fn matches_anti_pattern(&self, locator: &str) -> bool {
        self.model.read().await.matches_anti_pattern(locator)
    }

    /// Known anti-pattern fragments
    pub async fn anti_patterns(&self) -> Vec<String> {
        self.model.read().await.anti_patterns.clone()
    }

    /// Stored signature sample for a route
    pub async fn route_signature(&self, route: &str) -> Option<Vec<String>> {
        self.model.read().await.route_signatures.get(route).cloned()
    }

    /// Cloned copy of the full model (for reporting)
    pub async fn snapshot(&self) -> ReliabilityModel {
        self.model.read().await.clone()
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = ModelStore::load(dir.path().join("model.json")).await;

        let model = store.snapshot().await;
        assert!(model.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        tokio::fs::write(&path, "{ not json at all").await.unwrap();

        let store = ModelStore::load(&path).await;
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        tokio::fs::write(&path, r##"{"selectorReliability": {"#a""##)
            .await
            .unwrap();

        let store = ModelStore::load(&path).await;
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");

        let store = ModelStore::load(&path).await;
        store.update_selector_reliability("#save", true).await;
        store.update_test_stability("orders_smoke", false).await;
        store.record_pattern("nth-of-type", true).await;
        store
            .set_route_signature("/orders", vec!["Submit Order".to_string()])
            .await;
        store.save().await.unwrap();

        let reloaded = ModelStore::load(&path).await;
        assert_eq!(reloaded.selector_reliability("#save").await, Some(0.6));
        assert_eq!(reloaded.test_stability("orders_smoke").await, Some(0.4));
        assert!(reloaded.matches_anti_pattern("li:nth-of-type(2)").await);
        assert_eq!(
            reloaded.route_signature("/orders").await.unwrap(),
            vec!["Submit Order"]
        );
    }

    #[tokio::test]
    async fn test_stale_temp_file_does_not_affect_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");

        let store = ModelStore::load(&path).await;
        store.update_selector_reliability("#a", true).await;
        store.save().await.unwrap();

        // A crash between write and rename leaves a temp file behind; the
        // next load must still read the intact model
        tokio::fs::write(path.with_extension("json.tmp"), "{ partial garbage")
            .await
            .unwrap();

        let reloaded = ModelStore::load(&path).await;
        assert_eq!(reloaded.selector_reliability("#a").await, Some(0.6));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");

        let store = ModelStore::load(&path).await;
        store.update_selector_reliability("#a", true).await;
        store.save().await.unwrap();
        store.save().await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
