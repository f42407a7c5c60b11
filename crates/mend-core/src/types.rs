//! Core type definitions shared across the Mend crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of interaction attempted against a page element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Click,
    Fill,
    Select,
    Hover,
    Navigate,
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Click => write!(f, "click"),
            Self::Fill => write!(f, "fill"),
            Self::Select => write!(f, "select"),
            Self::Hover => write!(f, "hover"),
            Self::Navigate => write!(f, "navigate"),
        }
    }
}

impl std::str::FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "click" => Ok(Self::Click),
            "fill" => Ok(Self::Fill),
            "select" => Ok(Self::Select),
            "hover" => Ok(Self::Hover),
            "navigate" => Ok(Self::Navigate),
            _ => Err(format!("Invalid interaction kind: {}", s)),
        }
    }
}

/// One observed interaction outcome during a crawl
///
/// Ephemeral: observation batches feed the reliability model and are not
/// persisted beyond the aggregates derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementObservation {
    /// Locator used for the interaction
    pub locator: String,
    /// Element tag or widget type (e.g. "button", "input")
    pub element_type: String,
    /// Visible text at interaction time, if any
    pub visible_text: Option<String>,
    /// What was attempted
    pub interaction: InteractionKind,
    /// Whether the interaction succeeded
    pub succeeded: bool,
    /// When the interaction was observed
    pub observed_at: DateTime<Utc>,
}

impl ElementObservation {
    pub fn new(
        locator: impl Into<String>,
        element_type: impl Into<String>,
        interaction: InteractionKind,
        succeeded: bool,
    ) -> Self {
        Self {
            locator: locator.into(),
            element_type: element_type.into(),
            visible_text: None,
            interaction,
            succeeded,
            observed_at: Utc::now(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.visible_text = Some(text.into());
        self
    }
}

/// Kind of change detected for a source path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// One changed source path with derived classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Repository-relative path
    pub path: PathBuf,
    /// What happened to the path
    pub kind: ChangeKind,
    /// Language tag derived from the file extension
    pub language: Option<String>,
    /// Domain feature tags derived from path segments and content keywords
    pub feature_tags: Vec<String>,
}

impl ChangeRecord {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            language: None,
            feature_tags: Vec::new(),
        }
    }
}

/// Categorical estimate of how likely a change breaks a test
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Critical = 0,
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for ImpactLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Invalid impact level: {}", s)),
        }
    }
}

/// A test judged affected by a set of changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestImpact {
    /// Test name from the catalogue
    pub test_name: String,
    /// Estimated severity of the impact
    pub impact: ImpactLevel,
    /// Feature tags shared between the change set and the test
    pub affected_tags: Vec<String>,
    /// Human-readable rationale
    pub reason: String,
    /// Ranking priority (higher runs earlier)
    pub priority: u32,
}

/// Catalogue entry describing one runnable test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique test name
    pub name: String,
    /// Estimated wall-clock duration in seconds
    pub estimated_duration_secs: u64,
    /// Names of tests that must run before this one
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Scheduling priority (higher is more important)
    pub priority: u32,
    /// Declared coverage tags for impact matching
    #[serde(default)]
    pub coverage_tags: Vec<String>,
}

impl TestSpec {
    pub fn new(name: impl Into<String>, estimated_duration_secs: u64, priority: u32) -> Self {
        Self {
            name: name.into(),
            estimated_duration_secs,
            depends_on: Vec::new(),
            priority,
            coverage_tags: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.coverage_tags = tags;
        self
    }
}
