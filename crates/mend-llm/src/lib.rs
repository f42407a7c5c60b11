//! Semantic-service client for Mend
//!
//! One client instance is shared by every service consumer (selector
//! healing, impact ranking, plan optimization). The service enforces strict
//! concurrency limits, so the client is deliberately conservative: a single
//! in-flight call, a minimum delay between successive calls, and bounded
//! exponential backoff on recognized transient conditions only.
//!
//! All throttle and breaker state is instance-scoped. Two independent runs
//! instantiating their own clients do not cross-talk.

mod breaker;
mod client;
mod extract;
mod types;

pub use breaker::{BreakerState, CircuitBreaker};
pub use client::SemanticClient;
pub use extract::{extract_json, parse_response};
pub use types::{ChatMessage, Usage};
