//! When to resend a record-store request, and how long to wait first.
//!
//! Reads, patches and deletes are resent after throttling, gateway errors and
//! transport failures. Record creation is not idempotent: a `POST` is resent
//! only when the store cannot have acted on it, i.e. it answered 429 or the
//! connection was never established.

use rand::Rng;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway statuses after which an idempotent request is resent.
const GATEWAY_STATUSES: [StatusCode; 3] = [
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Longest `Retry-After` the connector agrees to sleep through.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Resend budget of the record-store connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Resends after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before the first resend; doubled for every later one.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Spread waits over the upper half of the backoff window.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

/// How one attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The store answered with a non-success status.
    Status {
        status: StatusCode,
        retry_after: Option<Duration>,
    },
    /// No connection was established; the request never left.
    Connect,
    /// The connection broke after the request may have been sent.
    Transport,
}

impl AttemptFailure {
    pub fn status(status: StatusCode, retry_after: Option<Duration>) -> Self {
        AttemptFailure::Status {
            status,
            retry_after,
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            AttemptFailure::Connect
        } else {
            AttemptFailure::Transport
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Whether `method` may be resent after `failure`.
    pub fn is_resendable(method: &Method, failure: AttemptFailure) -> bool {
        let throttled = matches!(
            failure,
            AttemptFailure::Status { status, .. } if status == StatusCode::TOO_MANY_REQUESTS
        );
        if *method == Method::POST {
            return throttled || failure == AttemptFailure::Connect;
        }
        match failure {
            AttemptFailure::Status { status, .. } => {
                throttled || GATEWAY_STATUSES.contains(&status)
            }
            AttemptFailure::Connect | AttemptFailure::Transport => true,
        }
    }

    /// Wait before resend number `attempt` (1-based), or `None` to give up.
    ///
    /// A server-supplied `Retry-After` wins over computed backoff.
    pub fn next_delay(
        &self,
        method: &Method,
        failure: AttemptFailure,
        attempt: u32,
    ) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries || !Self::is_resendable(method, failure) {
            return None;
        }
        if let AttemptFailure::Status {
            retry_after: Some(wait),
            ..
        } = failure
        {
            return Some(wait.min(MAX_RETRY_AFTER));
        }
        Some(self.backoff(attempt))
    }

    /// Exponential backoff for resend number `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(32);
        let window = self
            .initial_backoff_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_backoff_ms);
        if !self.jitter || window < 2 {
            return Duration::from_millis(window);
        }
        let half = window / 2;
        Duration::from_millis(half + rand::thread_rng().gen_range(0..=window - half))
    }
}

/// Parse a `Retry-After` header given in seconds.
///
/// HTTP dates yield `None` and fall back to computed backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> AttemptFailure {
        AttemptFailure::status(StatusCode::from_u16(code).unwrap(), None)
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let config = RetryConfig::default().without_jitter();
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(40), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_stays_in_upper_half() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let ms = config.backoff(3).as_millis();
            assert!((200..=400).contains(&ms), "{ms}");
        }
    }

    #[test]
    fn test_reads_and_patches_resend_on_gateway_errors() {
        for method in [Method::GET, Method::PATCH, Method::DELETE] {
            assert!(RetryConfig::is_resendable(&method, status(503)));
            assert!(RetryConfig::is_resendable(&method, status(429)));
            assert!(RetryConfig::is_resendable(&method, AttemptFailure::Transport));
            assert!(!RetryConfig::is_resendable(&method, status(500)));
            assert!(!RetryConfig::is_resendable(&method, status(404)));
        }
    }

    #[test]
    fn test_create_resends_only_when_store_cannot_have_written() {
        assert!(RetryConfig::is_resendable(&Method::POST, status(429)));
        assert!(RetryConfig::is_resendable(&Method::POST, AttemptFailure::Connect));
        assert!(!RetryConfig::is_resendable(&Method::POST, status(503)));
        assert!(!RetryConfig::is_resendable(&Method::POST, status(502)));
        assert!(!RetryConfig::is_resendable(&Method::POST, AttemptFailure::Transport));
    }

    #[test]
    fn test_next_delay_respects_budget_and_retry_after() {
        let config = RetryConfig::default().with_max_retries(2).without_jitter();
        assert_eq!(
            config.next_delay(&Method::GET, status(503), 1),
            Some(Duration::from_millis(100))
        );
        assert_eq!(config.next_delay(&Method::GET, status(503), 3), None);

        let throttled =
            AttemptFailure::status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(2)));
        assert_eq!(
            config.next_delay(&Method::POST, throttled, 1),
            Some(Duration::from_secs(2))
        );
        let stalled =
            AttemptFailure::status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(3600)));
        assert_eq!(config.next_delay(&Method::GET, stalled, 1), Some(MAX_RETRY_AFTER));

        assert_eq!(RetryConfig::disabled().next_delay(&Method::GET, status(503), 1), None);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
