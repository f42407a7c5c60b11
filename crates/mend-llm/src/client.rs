//! Throttled client for the semantic service
//!
//! Key design: the service has strict concurrency limits, so every call
//! goes through a per-instance gate that enforces one in-flight request and
//! a minimum delay between successive requests. Retries apply only to
//! recognized transient conditions (rate limits, server errors, timeouts,
//! connection resets); anything else propagates immediately so the caller
//! can take its deterministic fallback.

use crate::breaker::CircuitBreaker;
use crate::types::{ChatMessage, ServiceRequest, ServiceResponse};
use mend_core::config::ServiceConfig;
use mend_core::{MendError, Result};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the semantic service shared by healing, impact ranking, and
/// plan optimization.
///
/// All throttle, retry, and breaker state lives on the instance.
pub struct SemanticClient {
    http: reqwest::Client,
    config: ServiceConfig,
    api_key: Option<String>,
    breaker: CircuitBreaker,
    /// Completion time of the most recent request. Held across the whole
    /// request so at most one call is in flight per instance.
    gate: Mutex<Option<Instant>>,
}

impl SemanticClient {
    /// Create a client from service configuration
    pub fn new(config: ServiceConfig) -> Self {
        let breaker = CircuitBreaker::new(
            config.breaker_threshold,
            Duration::from_secs(config.breaker_cooldown_secs),
        );

        Self {
            http: reqwest::Client::new(),
            config,
            api_key: None,
            breaker,
            gate: Mutex::new(None),
        }
    }

    /// Provide an explicit API key instead of reading the environment
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.config.api_key_env).map_err(|_| {
            MendError::Api(format!(
                "No API key: set {} or configure one explicitly",
                self.config.api_key_env
            ))
        })
    }

    /// Send an ordered list of role-tagged messages, returning the service's
    /// text completion.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if !self.breaker.can_execute() {
            let wait = self.breaker.time_until_retry();
            return Err(MendError::ApiLimit(format!(
                "Circuit breaker is open after repeated service failures; retry in {}s",
                wait.as_secs()
            )));
        }

        let api_key = self.resolve_api_key()?;

        let request = ServiceRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: messages.to_vec(),
        };

        // Holding the gate for the full call enforces one in-flight request.
        let mut gate = self.gate.lock().await;

        if let Some(last_call) = *gate {
            let min_interval = Duration::from_millis(self.config.min_call_interval_ms);
            let elapsed = last_call.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }

        let mut retries = 0;
        let mut backoff_secs = self.config.initial_backoff_secs;

        loop {
            tracing::debug!("Sending service request (attempt {})", retries + 1);

            let outcome = self
                .http
                .post(&self.config.api_url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            *gate = Some(Instant::now());

            let response = match outcome {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if retries >= self.config.max_retries {
                        self.breaker.record_failure();
                        return Err(MendError::Api(format!(
                            "Service unreachable after {} retries: {}",
                            retries, e
                        )));
                    }
                    retries += 1;
                    tracing::warn!(
                        "Transient send failure ({}). Waiting {}s before retry {}/{}",
                        e,
                        backoff_secs,
                        retries,
                        self.config.max_retries
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(self.config.max_backoff_secs);
                    continue;
                }
                Err(e) => {
                    self.breaker.record_failure();
                    return Err(MendError::Api(format!("Failed to send request: {}", e)));
                }
            };

            let status = response.status();

            // Rate limit: honor retry-after, otherwise exponential backoff
            if status.as_u16() == 429 {
                if retries >= self.config.max_retries {
                    self.breaker.record_failure();
                    let body = response.text().await.unwrap_or_else(|_| "Unknown".to_string());
                    return Err(MendError::ApiLimit(format!(
                        "Rate limit exceeded after {} retries. Last error: {}",
                        retries, body
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                retries += 1;
                tracing::warn!(
                    "Rate limited (429). Waiting {}s before retry {}/{}",
                    wait_secs,
                    retries,
                    self.config.max_retries
                );
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(self.config.max_backoff_secs);
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|_| "Unknown".to_string());

                // Server errors are transient; everything else is not
                if status.is_server_error() && retries < self.config.max_retries {
                    retries += 1;
                    tracing::warn!(
                        "Server error ({}). Waiting {}s before retry {}/{}",
                        status,
                        backoff_secs,
                        retries,
                        self.config.max_retries
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(self.config.max_backoff_secs);
                    continue;
                }

                self.breaker.record_failure();
                tracing::error!(
                    "Service error {} (breaker failures: {})",
                    status,
                    self.breaker.failure_count()
                );
                return Err(MendError::Api(format!(
                    "Service error {}: {}",
                    status, body
                )));
            }

            let parsed: ServiceResponse = response
                .json()
                .await
                .map_err(|e| MendError::Api(format!("Failed to parse response: {}", e)))?;

            let text = parsed
                .content
                .first()
                .ok_or_else(|| MendError::Api("No content in response".to_string()))?
                .text
                .clone();

            self.breaker.record_success();

            if let Some(ref usage) = parsed.usage {
                tracing::info!(
                    "Service call complete ({} chars, {} input tokens, {} output tokens)",
                    text.len(),
                    usage.input_tokens,
                    usage.output_tokens
                );
            } else {
                tracing::info!("Service call complete ({} chars)", text.len());
            }

            return Ok(text);
        }
    }

    /// Breaker state, exposed for observability
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> ServiceConfig {
        ServiceConfig {
            // Nothing listens on the discard port
            api_url: "http://127.0.0.1:9/v1/messages".to_string(),
            min_call_interval_ms: 0,
            max_retries: 0,
            initial_backoff_secs: 0,
            breaker_threshold: 2,
            breaker_cooldown_secs: 60,
            ..ServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_is_an_error() {
        let config = ServiceConfig {
            api_key_env: "MEND_TEST_NO_SUCH_KEY".to_string(),
            ..unreachable_config()
        };
        let client = SemanticClient::new(config);

        let result = client.complete(&[ChatMessage::user("hello")]).await;
        assert!(matches!(result, Err(MendError::Api(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_without_panicking() {
        let client = SemanticClient::new(unreachable_config()).with_api_key("test-key");

        let result = client.complete(&[ChatMessage::user("hello")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_breaker_opens_after_repeated_failures() {
        let client = SemanticClient::new(unreachable_config()).with_api_key("test-key");
        let messages = [ChatMessage::user("hello")];

        let _ = client.complete(&messages).await;
        let _ = client.complete(&messages).await;

        // Threshold is 2: the third call must be rejected by the breaker
        let result = client.complete(&messages).await;
        assert!(matches!(result, Err(MendError::ApiLimit(_))));
    }

    #[tokio::test]
    async fn test_min_interval_is_enforced() {
        let config = ServiceConfig {
            min_call_interval_ms: 200,
            breaker_threshold: 10,
            ..unreachable_config()
        };
        let client = SemanticClient::new(config).with_api_key("test-key");
        let messages = [ChatMessage::user("hello")];

        let _ = client.complete(&messages).await;
        let start = Instant::now();
        let _ = client.complete(&messages).await;

        assert!(start.elapsed() >= Duration::from_millis(150));
    }
}
