//! Unified error types for Mend

use thiserror::Error;

/// Unified error type for all Mend operations
#[derive(Error, Debug)]
pub enum MendError {
    // Reliability store errors
    #[error("Model store error: {0}")]
    Store(String),

    // Healing errors
    #[error("Healing error: {0}")]
    Heal(String),

    #[error("Page probe error: {0}")]
    Probe(String),

    // Change analysis errors
    #[error("Change detection error: {0}")]
    ChangeDetection(String),

    #[error("VCS error: {0}")]
    Vcs(String),

    #[error("Impact analysis error: {0}")]
    Impact(String),

    // Planning errors
    #[error("Planning error: {0}")]
    Plan(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    // Semantic service errors
    #[error("Service error: {0}")]
    Api(String),

    #[error("Service rate limit: {0}")]
    ApiLimit(String),

    #[error("Unparseable service response: {0}")]
    ResponseParse(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl MendError {
    /// Whether this error represents a transient service condition worth
    /// retrying (rate limits, timeouts, connection resets).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ApiLimit(_))
    }
}

/// Result type alias using MendError
pub type Result<T> = std::result::Result<T, MendError>;
