//! Completion client for the configured GPTS model.
//!
//! Wraps a provider behind the [`CompletionProvider`] trait and adds the
//! retry policy: transient failures (rate limits, network errors, 5xx) are
//! retried with exponential backoff up to a fixed attempt budget, while
//! invalid requests surface immediately. Delays go through the [`Delay`]
//! trait so tests can substitute an instrumented no-op.

pub mod openai;

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config;
use crate::metrics::{ErrorCategory, Metrics};

/// Errors that can occur during completion calls
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Rate limit exceeded (429), optionally with a server-provided wait time
    #[error("rate limit exceeded: {message} (wait: {wait_secs:?}s)")]
    RateLimited {
        /// Retry-After duration in seconds, if provided by the server
        wait_secs: Option<u64>,
        /// Error message from the server
        message: String,
    },
    /// Error during network communication, including per-attempt timeouts
    #[error("network error: {0}")]
    Network(String),
    /// The request cannot succeed as given; never retried
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Server-side error returned by the provider's API
    #[error("API error: {0}")]
    Api(String),
    /// Any other unexpected error
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CompletionError {
    /// Metrics partition for this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::Network(_) => ErrorCategory::Network,
            Self::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            Self::Api(_) => ErrorCategory::Api,
            Self::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Network(_) | Self::Api(_)
        )
    }
}

/// Interface to the model endpoint; one implementation per backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for a single user prompt
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Sleep seam for the retry loop.
#[async_trait::async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Production delay backed by the tokio timer.
pub struct TokioDelay;

#[async_trait::async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt budget and backoff tunables for [`CompletionClient`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the initial call
    pub max_attempts: u32,
    /// Delay before the first retry; doubled per subsequent attempt
    pub base_delay: Duration,
    /// Per-attempt timeout
    pub request_timeout: Duration,
}

impl RetryPolicy {
    /// Build the policy from environment overrides with documented defaults
    /// (3 attempts, 1s base delay, 60s per-attempt timeout).
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_attempts: config::get_llm_max_attempts(),
            base_delay: Duration::from_millis(config::get_llm_base_delay_ms()),
            request_timeout: Duration::from_secs(config::get_llm_request_timeout_secs()),
        }
    }
}

/// Completion client with bounded retry and error classification.
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    metrics: Arc<Metrics>,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
}

impl CompletionClient {
    #[must_use]
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        metrics: Arc<Metrics>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            metrics,
            policy,
            delay: Arc::new(TokioDelay),
        }
    }

    /// Replace the sleep implementation (tests substitute a recording no-op).
    #[must_use]
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Relay a prompt to the model, retrying transient failures.
    ///
    /// Every attempt records its elapsed time and outcome category on the
    /// metrics recorder. Exhausting the attempt budget returns the last
    /// classification.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::InvalidRequest` for empty prompts without
    /// calling the provider, or the classified provider error once retries
    /// are exhausted.
    pub async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(CompletionError::InvalidRequest(
                "empty prompt".to_string(),
            ));
        }

        for attempt in 1..=self.policy.max_attempts {
            let start = Instant::now();
            let result = match tokio::time::timeout(
                self.policy.request_timeout,
                self.provider.complete(prompt),
            )
            .await
            {
                Ok(res) => res,
                Err(_) => Err(CompletionError::Network(format!(
                    "request timed out after {}s",
                    self.policy.request_timeout.as_secs()
                ))),
            };
            let elapsed = start.elapsed();

            match result {
                Ok(text) => {
                    self.metrics.record_attempt(elapsed, None);
                    if attempt > 1 {
                        info!(attempt, "completion retry succeeded");
                    }
                    debug!(
                        duration_ms = elapsed.as_millis(),
                        reply_chars = text.chars().count(),
                        "received completion"
                    );
                    return Ok(text);
                }
                Err(e) => {
                    self.metrics.record_attempt(elapsed, Some(e.category()));
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        duration_ms = elapsed.as_millis(),
                        error = %e,
                        "completion attempt failed"
                    );

                    if attempt < self.policy.max_attempts {
                        if let Some(backoff) = self.retry_delay(&e, attempt) {
                            debug!(backoff_ms = backoff.as_millis(), "retrying completion");
                            self.delay.wait(backoff).await;
                            continue;
                        }
                    }

                    return Err(e);
                }
            }
        }

        // The loop always returns; this only guards against max_attempts == 0.
        Err(CompletionError::Unknown(
            "retry loop exhausted without an attempt".to_string(),
        ))
    }

    /// Delay before the next attempt, or `None` if the error is terminal.
    fn retry_delay(&self, error: &CompletionError, attempt: u32) -> Option<Duration> {
        if !error.is_retryable() {
            return None;
        }
        // A server-provided wait time wins over our own backoff schedule
        if let CompletionError::RateLimited {
            wait_secs: Some(secs),
            ..
        } = error
        {
            return Some(Duration::from_secs(secs + 1));
        }
        Some(self.policy.base_delay * 2u32.pow(attempt - 1))
    }
}
