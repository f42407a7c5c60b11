//! Circuit breaker for semantic-service protection
//!
//! Unthrottled retry bursts against the service were the dominant failure
//! mode this engine exists to avoid; the breaker stops a run from hammering
//! an endpoint that is already refusing work.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation, calls allowed
    Closed,
    /// Too many failures, calls rejected immediately
    Open,
    /// Cooldown elapsed, one probe call allowed
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerInner {
    failures: u32,
    last_failure: Option<Instant>,
}

/// Per-client circuit breaker.
///
/// State is instance-scoped: every [`crate::SemanticClient`] owns its own
/// breaker, so independent runs cannot trip each other.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` consecutive failures
    /// and half-opens `cooldown` after the last one.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner::default()),
            threshold,
            cooldown,
        }
    }

    /// Current breaker state
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock().unwrap();

        if inner.failures < self.threshold {
            return BreakerState::Closed;
        }

        match inner.last_failure {
            Some(at) if at.elapsed() >= self.cooldown => BreakerState::HalfOpen,
            _ => BreakerState::Open,
        }
    }

    /// Whether a call may proceed (closed or half-open)
    pub fn can_execute(&self) -> bool {
        self.state() != BreakerState::Open
    }

    /// Record a successful call, closing the circuit
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures = 0;
        inner.last_failure = None;
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
    }

    /// Consecutive failure count (for logging)
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failures
    }

    /// Time remaining until an open circuit half-opens; zero otherwise
    pub fn time_until_retry(&self) -> Duration {
        let inner = self.inner.lock().unwrap();

        if inner.failures < self.threshold {
            return Duration::ZERO;
        }

        match inner.last_failure {
            Some(at) => self.cooldown.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_initial_state_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_success_resets() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);

        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(50));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        sleep(Duration::from_millis(80));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_half_open_recovers_on_success() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(50));

        cb.record_failure();
        cb.record_failure();
        sleep(Duration::from_millis(80));
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_instances_are_independent() {
        let a = CircuitBreaker::new(1, Duration::from_secs(60));
        let b = CircuitBreaker::new(1, Duration::from_secs(60));

        a.record_failure();
        assert!(!a.can_execute());
        assert!(b.can_execute());
    }

    #[test]
    fn test_time_until_retry_counts_down() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(2));
        cb.record_failure();

        let remaining = cb.time_until_retry();
        assert!(remaining > Duration::ZERO);
        assert!(remaining <= Duration::from_secs(2));
    }
}
