//! # mend-core
//!
//! Core types for the Mend test-resilience engine.
//!
//! Mend is the self-improving backbone of a UI-test harness: it heals broken
//! element locators, learns which locators and tests are reliable across
//! runs, maps source changes to the tests they endanger, and schedules test
//! execution under time and concurrency budgets.
//!
//! ## Core Paradigm
//!
//! - The browser driver is an external collaborator; Mend only consumes page
//!   snapshots and interaction outcomes.
//! - The reliability model is the single source of truth for scores.
//! - Every external-service path has a deterministic fallback; a degraded
//!   run beats an aborted run.

pub mod config;
pub mod fail_open;

mod error;
mod types;

pub use config::MendConfig;
pub use error::{MendError, Result};
pub use types::*;
