//! Test-impact ranking with a deterministic fallback

use mend_core::{ChangeRecord, ImpactLevel, Result, TestImpact, TestSpec};
use mend_llm::{parse_response, ChatMessage, SemanticClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ranked impact of a change set on a test catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    /// Overall risk of the change set, in [0,1]
    pub risk_score: f64,
    /// Impacted tests, highest priority first
    pub impacted: Vec<TestImpact>,
}

impl ImpactReport {
    fn empty() -> Self {
        Self {
            risk_score: 0.0,
            impacted: Vec::new(),
        }
    }
}

/// Service-side ranking shape
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceRanking {
    #[serde(default)]
    risk_score: f64,
    #[serde(default)]
    impacted_tests: Vec<ServiceImpact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceImpact {
    test_name: String,
    #[serde(default)]
    impact_level: Option<ImpactLevel>,
    #[serde(default)]
    affected_feature_tags: Vec<String>,
    #[serde(default)]
    reason: String,
}

/// Ranks tests by how likely a change set breaks them.
///
/// The semantic service does the ranking when available; otherwise a
/// deterministic coverage-tag intersection rule guarantees the analyzer
/// never blocks progress.
pub struct ImpactAnalyzer {
    semantic: Option<Arc<SemanticClient>>,
}

impl ImpactAnalyzer {
    /// Create an analyzer that always uses the deterministic rule.
    pub fn new() -> Self {
        Self { semantic: None }
    }

    /// Enable service-backed ranking.
    pub fn with_semantic_client(mut self, client: Arc<SemanticClient>) -> Self {
        self.semantic = Some(client);
        self
    }

    /// Rank the catalogue against a change set.
    pub async fn analyze_and_prioritize(
        &self,
        changes: &[ChangeRecord],
        catalogue: &[TestSpec],
    ) -> ImpactReport {
        if changes.is_empty() || catalogue.is_empty() {
            return ImpactReport::empty();
        }

        if let Some(ref client) = self.semantic {
            match self.rank_via_service(client, changes, catalogue).await {
                Ok(report) => return report,
                Err(e) => {
                    warn!("Service ranking failed ({}); using deterministic rule", e);
                }
            }
        }

        fallback_rank(changes, catalogue)
    }

    async fn rank_via_service(
        &self,
        client: &SemanticClient,
        changes: &[ChangeRecord],
        catalogue: &[TestSpec],
    ) -> Result<ImpactReport> {
        let mut change_summary = String::new();
        for change in changes {
            change_summary.push_str(&format!(
                "- {} {} (language: {}, features: {})\n",
                change.kind,
                change.path.display(),
                change.language.as_deref().unwrap_or("unknown"),
                change.feature_tags.join(", ")
            ));
        }

        let mut test_summary = String::new();
        for test in catalogue {
            test_summary.push_str(&format!(
                "- {} (covers: {})\n",
                test.name,
                test.coverage_tags.join(", ")
            ));
        }

        let prompt = format!(
            "These source files changed:\n{change_summary}\n\
             Test catalogue with declared coverage:\n{test_summary}\n\
             Rank which tests the changes most likely affect. Respond with JSON only:\n\
             {{\"riskScore\": 0.0, \"impactedTests\": [{{\"testName\": \"...\", \
             \"impactLevel\": \"critical|high|medium|low\", \
             \"affectedFeatureTags\": [\"...\"], \"reason\": \"...\"}}]}}"
        );

        let completion = client.complete(&[ChatMessage::user(prompt)]).await?;
        let ranking: ServiceRanking = parse_response(&completion)?;

        let known: BTreeSet<&str> = catalogue.iter().map(|t| t.name.as_str()).collect();

        let impacted: Vec<TestImpact> = ranking
            .impacted_tests
            .into_iter()
            .filter(|entry| {
                let keep = known.contains(entry.test_name.as_str());
                if !keep {
                    debug!("Dropping unknown test {} from service ranking", entry.test_name);
                }
                keep
            })
            .map(|entry| {
                let impact = entry.impact_level.unwrap_or_default();
                TestImpact {
                    priority: priority_for(impact),
                    test_name: entry.test_name,
                    impact,
                    affected_tags: entry.affected_feature_tags,
                    reason: entry.reason,
                }
            })
            .collect();

        Ok(ImpactReport {
            risk_score: ranking.risk_score.clamp(0.0, 1.0),
            impacted,
        })
    }
}

impl Default for ImpactAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn priority_for(impact: ImpactLevel) -> u32 {
    match impact {
        ImpactLevel::Critical => 40,
        ImpactLevel::High => 30,
        ImpactLevel::Medium => 20,
        ImpactLevel::Low => 10,
    }
}

/// Deterministic rule: a test is impacted iff its coverage tags intersect
/// the union of detected feature tags, with priority 10 per shared tag.
fn fallback_rank(changes: &[ChangeRecord], catalogue: &[TestSpec]) -> ImpactReport {
    let changed_tags: BTreeSet<&str> = changes
        .iter()
        .flat_map(|c| c.feature_tags.iter().map(String::as_str))
        .collect();

    let mut impacted = Vec::new();
    for test in catalogue {
        let shared: Vec<String> = test
            .coverage_tags
            .iter()
            .filter(|tag| changed_tags.contains(tag.as_str()))
            .cloned()
            .collect();

        if shared.is_empty() {
            continue;
        }

        let impact = match shared.len() {
            1 => ImpactLevel::Medium,
            2 => ImpactLevel::High,
            _ => ImpactLevel::Critical,
        };

        impacted.push(TestImpact {
            test_name: test.name.clone(),
            impact,
            reason: format!("coverage tags intersect changed features: {}", shared.join(", ")),
            priority: 10 * shared.len() as u32,
            affected_tags: shared,
        });
    }

    impacted.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.test_name.cmp(&b.test_name))
    });

    // More files and broader feature spread mean more risk
    let risk_score = (changes.len() as f64 * 0.1 + changed_tags.len() as f64 * 0.05).min(1.0);

    ImpactReport {
        risk_score,
        impacted,
    }
}
