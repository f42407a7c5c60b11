//! Change detection and test-impact analysis
//!
//! Maps source changes to the tests most likely affected. Detection
//! prefers a version-control diff between the last-seen revision marker
//! and the current one; without a repository it falls back to a persisted
//! path -> modification-time map. Ranking prefers the semantic service and
//! falls back to a deterministic coverage-tag intersection rule, so the
//! analyzer never blocks a run on service unavailability.

mod analyze;
mod detect;
mod vcs;

pub use analyze::{ImpactAnalyzer, ImpactReport};
pub use detect::ChangeDetector;
pub use vcs::{GitBackend, VcsBackend};
