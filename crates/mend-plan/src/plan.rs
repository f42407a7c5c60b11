//! Execution plan shapes, validation, and JSON export

use mend_core::{MendError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A test placed in the sequential phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTest {
    /// Test name
    pub test: String,
    /// 1-based execution order within the sequential phase
    pub order: usize,
}

/// A group of mutually independent tests run concurrently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelShard {
    /// Tests in this shard
    pub tests: Vec<String>,
    /// 1-based execution order among shards (after the sequential phase)
    pub order: usize,
}

/// The concrete sequential/parallel/skip assignment for one run.
///
/// Serializable so a separate execution step can reuse a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Tests run one at a time, in order
    pub sequential: Vec<ScheduledTest>,
    /// Shards run after the sequential phase, each internally concurrent
    pub parallel_shards: Vec<ParallelShard>,
    /// Tests not run at all (filtered, unmet dependencies, over budget)
    pub skipped: Vec<String>,
    /// Estimated wall-clock duration of the scheduled tests
    #[serde(rename = "estimatedDurationSeconds")]
    pub estimated_duration_secs: u64,
    /// `shards / (shards + sequential tests)`; 0 for all-sequential plans
    pub parallelization_ratio: f64,
}

impl ExecutionPlan {
    /// Every scheduled test name (sequential and sharded), in run order
    pub fn scheduled_tests(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sequential.iter().map(|t| t.test.as_str()).collect();
        for shard in &self.parallel_shards {
            names.extend(shard.tests.iter().map(String::as_str));
        }
        names
    }

    /// Recompute the parallelization ratio from the current assignment
    pub fn recompute_ratio(&mut self) {
        let shards = self.parallel_shards.len();
        let sequential = self.sequential.len();
        self.parallelization_ratio = if shards + sequential == 0 {
            0.0
        } else {
            shards as f64 / (shards + sequential) as f64
        };
    }

    /// Check that skipped, sequential, and sharded tests exactly partition
    /// the eligible set: no test silently dropped, none duplicated.
    pub fn validate_partition(&self, eligible: &[String]) -> Result<()> {
        let mut seen = BTreeSet::new();

        let all = self
            .scheduled_tests()
            .into_iter()
            .map(str::to_string)
            .chain(self.skipped.iter().cloned());

        for name in all {
            if !seen.insert(name.clone()) {
                return Err(MendError::InvalidPlan(format!(
                    "test {} appears more than once",
                    name
                )));
            }
        }

        let expected: BTreeSet<String> = eligible.iter().cloned().collect();
        if seen != expected {
            let missing: Vec<&String> = expected.difference(&seen).collect();
            let unexpected: Vec<&String> = seen.difference(&expected).collect();
            return Err(MendError::InvalidPlan(format!(
                "plan does not partition the eligible set (missing: {:?}, unexpected: {:?})",
                missing, unexpected
            )));
        }

        Ok(())
    }

    /// Serialize for reuse by a separate execution step
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a previously exported plan
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Resource constraints and filters for one planning invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConstraints {
    /// Total wall-clock budget in seconds
    pub available_time_secs: u64,
    /// Maximum tests per parallel shard
    pub parallel_capacity: usize,
    /// Tests below this priority are skipped
    pub min_priority: u32,
    /// Skip tests whose stability falls below `min_stability`
    pub skip_flaky: bool,
    /// Stability threshold applied when `skip_flaky` is set
    pub min_stability: f64,
}

impl PlanConstraints {
    pub fn new(available_time_secs: u64, parallel_capacity: usize) -> Self {
        Self {
            available_time_secs,
            parallel_capacity,
            min_priority: 0,
            skip_flaky: false,
            min_stability: 0.3,
        }
    }

    pub fn with_min_priority(mut self, min_priority: u32) -> Self {
        self.min_priority = min_priority;
        self
    }

    pub fn skipping_flaky(mut self, min_stability: f64) -> Self {
        self.skip_flaky = true;
        self.min_stability = min_stability;
        self
    }
}
