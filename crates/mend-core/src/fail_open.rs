//! Fail-open utilities for graceful degradation
//!
//! Wraps operations that must never abort a test run: model persistence,
//! pattern extraction, signature refreshes. A failure is logged and turned
//! into `None` so the caller continues on the degraded path.
//!
//! DO NOT use fail-open for:
//! - Interaction execution (the caller needs the real outcome)
//! - Plan invariant validation (correctness)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open.
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Examples of appropriate use:
/// - Model flushes after a route observation
/// - Semantic pattern extraction
/// - Route signature refreshes
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like [`fail_open`] but retries with linear backoff before giving up.
///
/// Retries the operation up to `max_retries` times; the delay is
/// `100ms * attempt`.
pub async fn fail_open_with_retries<F, Fut, T>(
    operation_name: &str,
    mut f: F,
    max_retries: usize,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_retries {
        match f().await {
            Ok(val) => return Some(val),
            Err(e) => {
                if attempt == max_retries {
                    warn!(
                        "{} failed after {} retries (fail-open): {}",
                        operation_name, max_retries, e
                    );
                    return None;
                }
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_retries, e
                );
                let delay_ms = 100 * attempt as u64;
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MendError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, MendError>(7) }).await;
        assert_eq!(result, Some(7));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(MendError::Other("boom".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_with_retries_recovers() {
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "test_op",
            || {
                attempts += 1;
                async move {
                    if attempts < 3 {
                        Err(MendError::Other("transient".to_string()))
                    } else {
                        Ok(attempts)
                    }
                }
            },
            5,
        )
        .await;
        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn test_fail_open_with_retries_exhausts() {
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "test_op",
            || {
                attempts += 1;
                async move { Err::<i32, _>(MendError::Other("persistent".to_string())) }
            },
            3,
        )
        .await;
        assert_eq!(result, None);
        assert_eq!(attempts, 3);
    }
}
