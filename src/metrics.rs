//! Process-wide request counters for the status endpoint.
//!
//! Counters are plain atomic increments; nothing here is persisted, so the
//! numbers reset on every restart. The recorder is passed around as
//! `Arc<Metrics>` rather than accessed as a global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Failure categories tracked separately in the snapshot.
///
/// These mirror the completion error taxonomy plus the inbound-side
/// failure modes that never reach the completion client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// HTTP 429 / quota exhaustion on the model endpoint
    RateLimited,
    /// Connectivity failures and per-attempt timeouts
    Network,
    /// Requests the model endpoint rejects as unprocessable
    InvalidRequest,
    /// Server-side (5xx) failures on the model endpoint
    Api,
    /// Anything that does not classify
    Unknown,
}

#[derive(Default)]
struct ErrorCounters {
    rate_limited: AtomicU64,
    network: AtomicU64,
    invalid_request: AtomicU64,
    api: AtomicU64,
    unknown: AtomicU64,
}

impl ErrorCounters {
    fn bump(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::RateLimited => &self.rate_limited,
            ErrorCategory::Network => &self.network,
            ErrorCategory::InvalidRequest => &self.invalid_request,
            ErrorCategory::Api => &self.api,
            ErrorCategory::Unknown => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Request/error/latency counters shared by all handlers.
pub struct Metrics {
    started: Instant,
    requests_total: AtomicU64,
    completions_total: AtomicU64,
    completion_attempts: AtomicU64,
    completion_latency_ms: AtomicU64,
    errors: ErrorCounters,
    malformed_updates: AtomicU64,
    empty_messages: AtomicU64,
    send_failures: AtomicU64,
    unauthorized_hits: AtomicU64,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests_total: AtomicU64::new(0),
            completions_total: AtomicU64::new(0),
            completion_attempts: AtomicU64::new(0),
            completion_latency_ms: AtomicU64::new(0),
            errors: ErrorCounters::default(),
            malformed_updates: AtomicU64::new(0),
            empty_messages: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            unauthorized_hits: AtomicU64::new(0),
        }
    }

    /// Record one inbound message accepted for processing.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completion attempt and its elapsed time.
    ///
    /// `error` is `None` for a successful attempt; failed attempts are
    /// partitioned by category.
    pub fn record_attempt(&self, elapsed: Duration, error: Option<ErrorCategory>) {
        self.completion_attempts.fetch_add(1, Ordering::Relaxed);
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.completion_latency_ms.fetch_add(ms, Ordering::Relaxed);
        match error {
            None => {
                self.completions_total.fetch_add(1, Ordering::Relaxed);
            }
            Some(category) => self.errors.bump(category),
        }
    }

    /// Record a webhook body that did not parse as a Telegram update.
    pub fn record_malformed_update(&self) {
        self.malformed_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message with no usable text (empty, whitespace, media-only).
    pub fn record_empty_message(&self) {
        self.empty_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reply that could not be delivered to the chat.
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a webhook call with a wrong token path.
    pub fn record_unauthorized(&self) {
        self.unauthorized_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time view for the status endpoint.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempts = self.completion_attempts.load(Ordering::Relaxed);
        let latency_ms = self.completion_latency_ms.load(Ordering::Relaxed);
        let errors = ErrorBreakdown {
            rate_limited: self.errors.rate_limited.load(Ordering::Relaxed),
            network: self.errors.network.load(Ordering::Relaxed),
            invalid_request: self.errors.invalid_request.load(Ordering::Relaxed),
            api: self.errors.api.load(Ordering::Relaxed),
            unknown: self.errors.unknown.load(Ordering::Relaxed),
        };
        let failed_attempts = errors.total();
        MetricsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            completions_total: self.completions_total.load(Ordering::Relaxed),
            completion_attempts: attempts,
            error_rate: ratio(failed_attempts, attempts),
            avg_completion_latency_ms: ratio(latency_ms, attempts),
            completion_errors: errors,
            malformed_updates: self.malformed_updates.load(Ordering::Relaxed),
            empty_messages: self.empty_messages.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            unauthorized_hits: self.unauthorized_hits.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Per-category failed completion attempts.
#[derive(Debug, Serialize)]
pub struct ErrorBreakdown {
    pub rate_limited: u64,
    pub network: u64,
    pub invalid_request: u64,
    pub api: u64,
    pub unknown: u64,
}

impl ErrorBreakdown {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.rate_limited + self.network + self.invalid_request + self.api + self.unknown
    }
}

/// Serializable view returned by `GET /status`.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub requests_total: u64,
    pub completions_total: u64,
    pub completion_attempts: u64,
    pub error_rate: f64,
    pub avg_completion_latency_ms: f64,
    pub completion_errors: ErrorBreakdown,
    pub malformed_updates: u64,
    pub empty_messages: u64,
    pub send_failures: u64,
    pub unauthorized_hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_partition_by_category() {
        let metrics = Metrics::new();
        for _ in 0..5 {
            metrics.record_request();
        }
        metrics.record_attempt(Duration::from_millis(10), None);
        metrics.record_attempt(Duration::from_millis(20), Some(ErrorCategory::RateLimited));
        metrics.record_attempt(Duration::from_millis(30), Some(ErrorCategory::RateLimited));
        metrics.record_attempt(Duration::from_millis(40), Some(ErrorCategory::Network));

        let snap = metrics.snapshot();
        assert_eq!(snap.requests_total, 5);
        assert_eq!(snap.completions_total, 1);
        assert_eq!(snap.completion_attempts, 4);
        assert_eq!(snap.completion_errors.rate_limited, 2);
        assert_eq!(snap.completion_errors.network, 1);
        assert_eq!(snap.completion_errors.invalid_request, 0);
        assert_eq!(snap.completion_errors.total(), 3);
    }

    #[test]
    fn test_latency_and_error_rate_are_averages() {
        let metrics = Metrics::new();
        metrics.record_attempt(Duration::from_millis(100), None);
        metrics.record_attempt(Duration::from_millis(300), Some(ErrorCategory::Api));

        let snap = metrics.snapshot();
        assert!((snap.avg_completion_latency_ms - 200.0).abs() < f64::EPSILON);
        assert!((snap.error_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_snapshot_has_no_nan() {
        let snap = Metrics::new().snapshot();
        assert!((snap.error_rate - 0.0).abs() < f64::EPSILON);
        assert!((snap.avg_completion_latency_ms - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_inbound_side_counters() {
        let metrics = Metrics::new();
        metrics.record_malformed_update();
        metrics.record_empty_message();
        metrics.record_empty_message();
        metrics.record_send_failure();
        metrics.record_unauthorized();

        let snap = metrics.snapshot();
        assert_eq!(snap.malformed_updates, 1);
        assert_eq!(snap.empty_messages, 2);
        assert_eq!(snap.send_failures, 1);
        assert_eq!(snap.unauthorized_hits, 1);
    }
}
