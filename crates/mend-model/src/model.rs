//! The persisted reliability model and its fixed update rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Score assigned to a locator or test seen for the first time
const INITIAL_SCORE: f64 = 0.5;

/// Additive reward for a successful locator interaction
const SELECTOR_REWARD: f64 = 0.1;

/// Subtractive penalty for a failed locator interaction
const SELECTOR_PENALTY: f64 = 0.2;

/// EMA weight for test stability updates
const STABILITY_ALPHA: f64 = 0.2;

/// Durable statistical model of locator and test behavior.
///
/// Serialized shape matches the documented model file: camelCase keys, all
/// maps optional so partially-written files still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReliabilityModel {
    /// Route -> sample of visible element texts the route "should" contain
    pub route_signatures: HashMap<String, Vec<String>>,
    /// Locator -> observed behavior tag
    pub element_behaviors: HashMap<String, String>,
    /// Locator fragments that historically resolved well
    pub common_patterns: Vec<String>,
    /// Locator fragments historically associated with healing failures
    pub anti_patterns: Vec<String>,
    /// Locator -> reliability score in [0,1]
    pub selector_reliability: HashMap<String, f64>,
    /// Test name -> success rate in [0,1]
    pub test_success_rates: HashMap<String, f64>,
    /// When the model was last mutated
    pub last_updated: Option<DateTime<Utc>>,
}

impl ReliabilityModel {
    /// Whether the model carries no learned state at all
    pub fn is_empty(&self) -> bool {
        self.route_signatures.is_empty()
            && self.element_behaviors.is_empty()
            && self.common_patterns.is_empty()
            && self.anti_patterns.is_empty()
            && self.selector_reliability.is_empty()
            && self.test_success_rates.is_empty()
    }

    /// Apply one interaction outcome to a locator's reliability score.
    ///
    /// Success adds 0.1, failure subtracts 0.2; unseen locators start at
    /// 0.5. The score is clamped to [0,1] at update time. Entries are never
    /// deleted: a stale locator decays toward 0 through repeated failures.
    pub fn update_selector_reliability(&mut self, locator: &str, success: bool) -> f64 {
        let score = self
            .selector_reliability
            .entry(locator.to_string())
            .or_insert(INITIAL_SCORE);

        *score = if success {
            (*score + SELECTOR_REWARD).min(1.0)
        } else {
            (*score - SELECTOR_PENALTY).max(0.0)
        };

        self.last_updated = Some(Utc::now());
        *score
    }

    /// Apply one execution outcome to a test's stability score.
    ///
    /// Exponential moving average with weight 0.2: a pass moves the rate a
    /// fifth of the way toward 1, a failure scales it by 0.8. Unseen tests
    /// start at 0.5.
    pub fn update_test_stability(&mut self, test: &str, passed: bool) -> f64 {
        let rate = self
            .test_success_rates
            .entry(test.to_string())
            .or_insert(INITIAL_SCORE);

        *rate = if passed {
            (*rate + (1.0 - *rate) * STABILITY_ALPHA).clamp(0.0, 1.0)
        } else {
            (*rate * (1.0 - STABILITY_ALPHA)).clamp(0.0, 1.0)
        };

        self.last_updated = Some(Utc::now());
        *rate
    }

    /// Record a locator fragment as a common or anti pattern (deduplicated)
    pub fn record_pattern(&mut self, fragment: &str, is_anti: bool) {
        let list = if is_anti {
            &mut self.anti_patterns
        } else {
            &mut self.common_patterns
        };

        if !list.iter().any(|p| p == fragment) {
            list.push(fragment.to_string());
            self.last_updated = Some(Utc::now());
        }
    }

    /// Tag a locator with an observed behavior
    pub fn record_element_behavior(&mut self, locator: &str, behavior: &str) {
        self.element_behaviors
            .insert(locator.to_string(), behavior.to_string());
        self.last_updated = Some(Utc::now());
    }

    /// Replace a route's signature sample
    pub fn set_route_signature(&mut self, route: &str, sample_texts: Vec<String>) {
        self.route_signatures.insert(route.to_string(), sample_texts);
        self.last_updated = Some(Utc::now());
    }

    /// Current reliability score for a locator, if it has been observed
    pub fn selector_reliability(&self, locator: &str) -> Option<f64> {
        self.selector_reliability.get(locator).copied()
    }

    /// Current stability score for a test, if it has been observed
    pub fn test_stability(&self, test: &str) -> Option<f64> {
        self.test_success_rates.get(test).copied()
    }

    /// Whether a locator contains any known anti-pattern fragment
    pub fn matches_anti_pattern(&self, locator: &str) -> bool {
        self.anti_patterns.iter().any(|p| locator.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_rules_match_documented_values() {
        let mut model = ReliabilityModel::default();

        // First success from the 0.5 initial score
        assert!((model.update_selector_reliability("#a", true) - 0.6).abs() < 1e-9);
        // Then a failure
        assert!((model.update_selector_reliability("#a", false) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_stability_rules_match_documented_values() {
        let mut model = ReliabilityModel::default();

        // 0.5 + 0.5 * 0.2 = 0.6
        assert!((model.update_test_stability("t", true) - 0.6).abs() < 1e-9);
        // 0.6 * 0.8 = 0.48
        assert!((model.update_test_stability("t", false) - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let mut model = ReliabilityModel::default();

        for _ in 0..50 {
            let s = model.update_selector_reliability("#a", true);
            assert!((0.0..=1.0).contains(&s));
        }
        assert!((model.selector_reliability("#a").unwrap() - 1.0).abs() < 1e-9);

        for _ in 0..50 {
            let s = model.update_selector_reliability("#a", false);
            assert!((0.0..=1.0).contains(&s));
        }
        assert!(model.selector_reliability("#a").unwrap().abs() < 1e-9);

        for _ in 0..100 {
            let r = model.update_test_stability("t", true);
            assert!((0.0..=1.0).contains(&r));
        }
        for _ in 0..100 {
            let r = model.update_test_stability("t", false);
            assert!((0.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn test_entries_survive_decay() {
        let mut model = ReliabilityModel::default();
        for _ in 0..10 {
            model.update_selector_reliability("button.stale", false);
        }
        // Decayed to zero but never deleted
        assert_eq!(model.selector_reliability("button.stale"), Some(0.0));
    }

    #[test]
    fn test_pattern_dedup() {
        let mut model = ReliabilityModel::default();
        model.record_pattern("data-testid", false);
        model.record_pattern("data-testid", false);
        model.record_pattern("nth-of-type", true);
        model.record_pattern("nth-of-type", true);

        assert_eq!(model.common_patterns.len(), 1);
        assert_eq!(model.anti_patterns.len(), 1);
    }

    #[test]
    fn test_anti_pattern_matching() {
        let mut model = ReliabilityModel::default();
        model.record_pattern("nth-of-type", true);

        assert!(model.matches_anti_pattern("li:nth-of-type(3)"));
        assert!(!model.matches_anti_pattern("#order-total"));
    }

    #[test]
    fn test_camel_case_wire_format() {
        let mut model = ReliabilityModel::default();
        model.update_selector_reliability("#a", true);
        model.set_route_signature("/orders", vec!["Submit Order".to_string()]);

        let json = serde_json::to_value(&model).unwrap();
        assert!(json.get("selectorReliability").is_some());
        assert!(json.get("routeSignatures").is_some());
        assert!(json.get("testSuccessRates").is_some());
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn test_partial_file_loads() {
        let model: ReliabilityModel =
            serde_json::from_str(r##"{"selectorReliability": {"#a": 0.7}}"##).unwrap();
        assert_eq!(model.selector_reliability("#a"), Some(0.7));
        assert!(model.anti_patterns.is_empty());
    }
}
