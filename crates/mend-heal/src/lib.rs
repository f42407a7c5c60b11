//! Selector healing for the Mend resilience engine
//!
//! When a locator stops matching, the [`HealingEngine`] walks an ordered
//! cascade of replacement strategies, cheapest first:
//!
//! 1. Direct retry after a short visibility wait (transient timing)
//! 2. Fragments embedded in the broken locator (quoted text, id, class,
//!    aria-label) retried as tolerant standalone locators
//! 3. Attribute re-matching against the live snapshot
//! 4. Ordinal adjustment for positional locators
//! 5. Semantic fallback through the language-model service
//!
//! Each step verifies its candidate against the live page before winning,
//! so the semantic service is only consulted when every cheaper strategy
//! has failed. Resolution never errors: exhausting the cascade returns
//! `None` and the caller records an ordinary interaction failure.

mod attributes;
mod engine;
mod fragment;
mod positional;
mod probe;
mod semantic;

pub use engine::{HealContext, HealMethod, HealedLocator, HealingEngine};
pub use fragment::LocatorFragment;
pub use probe::{PageElement, PageProbe};
pub use semantic::HealSuggestion;
