//! Plan construction with service bin-packing and deterministic fallback

use crate::plan::{ExecutionPlan, ParallelShard, PlanConstraints, ScheduledTest};
use mend_core::{Result, TestSpec};
use mend_llm::{parse_response, ChatMessage, SemanticClient};
use mend_model::ModelStore;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stability assumed for tests that have never been observed
const DEFAULT_STABILITY: f64 = 0.5;

/// Service-side plan layout shape
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceLayout {
    #[serde(default)]
    sequential: Vec<String>,
    #[serde(default)]
    parallel_shards: Vec<Vec<String>>,
    #[serde(default)]
    skipped: Vec<String>,
    #[serde(default)]
    estimated_duration_seconds: u64,
}

/// Builds execution plans from the test catalogue and current stability.
pub struct Planner {
    store: Arc<ModelStore>,
    semantic: Option<Arc<SemanticClient>>,
}

impl Planner {
    /// Create a planner that always uses the deterministic fallback.
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self {
            store,
            semantic: None,
        }
    }

    /// Enable service-backed plan optimization.
    pub fn with_semantic_client(mut self, client: Arc<SemanticClient>) -> Self {
        self.semantic = Some(client);
        self
    }

    /// Build a plan for `tests` under `constraints`.
    ///
    /// Filtered-out tests land in `skipped`, never silently dropped: the
    /// plan's skipped, sequential, and sharded tests always exactly
    /// partition the input catalogue.
    pub async fn create_execution_plan(
        &self,
        tests: &[TestSpec],
        constraints: &PlanConstraints,
    ) -> ExecutionPlan {
        let (eligible, mut pre_skipped) = self.filter(tests, constraints).await;

        debug!(
            "Planning {} eligible tests ({} filtered out)",
            eligible.len(),
            pre_skipped.len()
        );

        if eligible.is_empty() {
            let mut plan = ExecutionPlan {
                skipped: pre_skipped,
                ..ExecutionPlan::default()
            };
            plan.recompute_ratio();
            return plan;
        }

        if let Some(ref client) = self.semantic {
            match self.plan_via_service(client, &eligible, constraints).await {
                Ok(mut plan) => {
                    plan.skipped.append(&mut pre_skipped);
                    plan.recompute_ratio();
                    info!(
                        "Service plan: {} sequential, {} shards, {} skipped",
                        plan.sequential.len(),
                        plan.parallel_shards.len(),
                        plan.skipped.len()
                    );
                    return plan;
                }
                Err(e) => {
                    warn!("Service planning failed ({}); using fallback order", e);
                }
            }
        }

        let mut plan = fallback_plan(&eligible, constraints);
        plan.skipped.append(&mut pre_skipped);
        plan.recompute_ratio();
        info!(
            "Fallback plan: {} sequential, {} skipped",
            plan.sequential.len(),
            plan.skipped.len()
        );
        plan
    }

    /// Split the catalogue into eligible tests and pre-skipped names.
    async fn filter(
        &self,
        tests: &[TestSpec],
        constraints: &PlanConstraints,
    ) -> (Vec<PlannedTest>, Vec<String>) {
        let mut eligible = Vec::new();
        let mut skipped = Vec::new();

        for test in tests {
            if test.priority < constraints.min_priority {
                debug!("Skipping {} (priority below threshold)", test.name);
                skipped.push(test.name.clone());
                continue;
            }

            let stability = self
                .store
                .test_stability(&test.name)
                .await
                .unwrap_or(DEFAULT_STABILITY);

            if constraints.skip_flaky && stability < constraints.min_stability {
                debug!(
                    "Skipping {} (stability {:.2} below {:.2})",
                    test.name, stability, constraints.min_stability
                );
                skipped.push(test.name.clone());
                continue;
            }

            eligible.push(PlannedTest {
                spec: test.clone(),
                stability,
            });
        }

        (eligible, skipped)
    }

    async fn plan_via_service(
        &self,
        client: &SemanticClient,
        eligible: &[PlannedTest],
        constraints: &PlanConstraints,
    ) -> Result<ExecutionPlan> {
        let mut test_summary = String::new();
        for entry in eligible {
            test_summary.push_str(&format!(
                "- {} (duration: {}s, priority: {}, stability: {:.2}, depends on: [{}])\n",
                entry.spec.name,
                entry.spec.estimated_duration_secs,
                entry.spec.priority,
                entry.stability,
                entry.spec.depends_on.join(", ")
            ));
        }

        let prompt = format!(
            "Schedule these UI tests:\n{test_summary}\n\
             Budget: {} seconds total, up to {} tests per parallel shard.\n\
             Tests with dependencies must run sequentially after their dependencies; \
             mutually independent tests may share a parallel shard; tests that do not \
             fit the budget are skipped. Every listed test must appear exactly once \
             across sequential, parallelShards, and skipped. Respond with JSON only:\n\
             {{\"sequential\": [\"...\"], \"parallelShards\": [[\"...\"]], \
             \"skipped\": [\"...\"], \"estimatedDurationSeconds\": 0}}",
            constraints.available_time_secs, constraints.parallel_capacity
        );

        let completion = client.complete(&[ChatMessage::user(prompt)]).await?;
        let layout: ServiceLayout = parse_response(&completion)?;

        let plan = ExecutionPlan {
            sequential: layout
                .sequential
                .into_iter()
                .enumerate()
                .map(|(i, test)| ScheduledTest { test, order: i + 1 })
                .collect(),
            parallel_shards: layout
                .parallel_shards
                .into_iter()
                .enumerate()
                .map(|(i, tests)| ParallelShard {
                    tests,
                    order: i + 1,
                })
                .collect(),
            skipped: layout.skipped,
            estimated_duration_secs: layout.estimated_duration_seconds,
            parallelization_ratio: 0.0,
        };

        let eligible_names: Vec<String> =
            eligible.iter().map(|e| e.spec.name.clone()).collect();
        plan.validate_partition(&eligible_names)?;
        validate_dependency_order(&plan, eligible)?;

        for shard in &plan.parallel_shards {
            if shard.tests.len() > constraints.parallel_capacity {
                return Err(mend_core::MendError::InvalidPlan(format!(
                    "shard {} exceeds parallel capacity {}",
                    shard.order, constraints.parallel_capacity
                )));
            }
        }

        Ok(plan)
    }
}

struct PlannedTest {
    spec: TestSpec,
    stability: f64,
}

/// Reject plans that run a test before one of its dependencies.
///
/// Run order is the sequential phase first, then shards by order. A
/// dependency placed in `skipped` leaves its dependents unrunnable, so the
/// dependent must be skipped too.
fn validate_dependency_order(plan: &ExecutionPlan, eligible: &[PlannedTest]) -> Result<()> {
    let deps: HashMap<&str, &[String]> = eligible
        .iter()
        .map(|e| (e.spec.name.as_str(), e.spec.depends_on.as_slice()))
        .collect();

    // Position of every scheduled test in the combined run order
    let mut position: HashMap<&str, usize> = HashMap::new();
    for (i, name) in plan.scheduled_tests().iter().enumerate() {
        position.insert(name, i);
    }
    // Shard members run concurrently: give every member of one shard the
    // position of its first member
    let mut offset = plan.sequential.len();
    for shard in &plan.parallel_shards {
        for test in &shard.tests {
            position.insert(test.as_str(), offset);
        }
        offset += shard.tests.len().max(1);
    }

    for (name, &pos) in &position {
        let Some(test_deps) = deps.get(name) else {
            continue;
        };
        for dep in test_deps.iter() {
            if !deps.contains_key(dep.as_str()) {
                // Dependency outside the eligible set; nothing to order
                continue;
            }
            match position.get(dep.as_str()) {
                Some(&dep_pos) if dep_pos < pos => {}
                Some(_) => {
                    return Err(mend_core::MendError::InvalidPlan(format!(
                        "{} runs before its dependency {}",
                        name, dep
                    )));
                }
                None => {
                    return Err(mend_core::MendError::InvalidPlan(format!(
                        "{} is scheduled but its dependency {} is skipped",
                        name, dep
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Deterministic always-available plan: priority descending, then duration
/// ascending, everything sequential, dependency order preserved, budget
/// overruns skipped.
fn fallback_plan(eligible: &[PlannedTest], constraints: &PlanConstraints) -> ExecutionPlan {
    let eligible_names: BTreeSet<&str> =
        eligible.iter().map(|e| e.spec.name.as_str()).collect();

    let mut pool: Vec<&PlannedTest> = eligible.iter().collect();
    pool.sort_by(|a, b| {
        b.spec
            .priority
            .cmp(&a.spec.priority)
            .then_with(|| {
                a.spec
                    .estimated_duration_secs
                    .cmp(&b.spec.estimated_duration_secs)
            })
            .then_with(|| a.spec.name.cmp(&b.spec.name))
    });

    let mut sequential = Vec::new();
    let mut skipped = Vec::new();
    let mut placed: BTreeSet<&str> = BTreeSet::new();
    let mut used_secs: u64 = 0;

    let mut progress = true;
    while progress {
        progress = false;

        for (index, entry) in pool.iter().enumerate() {
            // A dependency outside the eligible set can never be satisfied
            let unmeetable = entry
                .spec
                .depends_on
                .iter()
                .any(|dep| !eligible_names.contains(dep.as_str()));
            if unmeetable {
                debug!(
                    "Skipping {} (dependency outside the eligible set)",
                    entry.spec.name
                );
                skipped.push(entry.spec.name.clone());
                pool.remove(index);
                progress = true;
                break;
            }

            let ready = entry
                .spec
                .depends_on
                .iter()
                .all(|dep| placed.contains(dep.as_str()));
            if !ready {
                continue;
            }

            if used_secs + entry.spec.estimated_duration_secs > constraints.available_time_secs {
                debug!("Skipping {} (over time budget)", entry.spec.name);
                skipped.push(entry.spec.name.clone());
            } else {
                used_secs += entry.spec.estimated_duration_secs;
                placed.insert(entry.spec.name.as_str());
                sequential.push(ScheduledTest {
                    test: entry.spec.name.clone(),
                    order: sequential.len() + 1,
                });
            }
            pool.remove(index);
            progress = true;
            break;
        }
    }

    // Anything left is in a dependency cycle or behind a skipped dependency
    for entry in pool {
        debug!("Skipping {} (unsatisfiable dependencies)", entry.spec.name);
        skipped.push(entry.spec.name.clone());
    }

    ExecutionPlan {
        sequential,
        parallel_shards: Vec::new(),
        skipped,
        estimated_duration_secs: used_secs,
        parallelization_ratio: 0.0,
    }
}
