//! Retry policy: retryability classification and exponential backoff.
//!
//! The executor drives one send through [`execute_with_retry`], which runs
//! the operation up to `max_retries + 1` times. HTTP error responses are
//! never errors by themselves — a response whose status is in the retryable
//! set triggers another attempt while attempts remain, and the final
//! response is returned to the caller either way. Transport errors retry
//! when their class is retryable; the last one surfaces.

use crate::constants;
use crate::error::{Error, ErrorKind};
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Classes of transport failure the retry classifier recognizes.
///
/// Mirrors the error taxonomy: `Network` covers connect/DNS/TLS/pool
/// failures, `Timeout` the per-attempt deadline, `Request` protocol-level
/// failures from a completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Network,
    Timeout,
    Request,
}

impl ErrorClass {
    /// Parse a class name as it appears in option mappings.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "network" | "connect" | "connection" => Some(Self::Network),
            "timeout" => Some(Self::Timeout),
            "request" | "protocol" => Some(Self::Request),
            _ => None,
        }
    }

    /// The class of an error, when it has one.
    #[must_use]
    pub fn of(error: &Error) -> Option<Self> {
        match error.kind() {
            ErrorKind::NetworkError => Some(Self::Network),
            ErrorKind::TimeoutError => Some(Self::Timeout),
            ErrorKind::RequestError => Some(Self::Request),
            _ => None,
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first (0 means exactly one attempt)
    pub max_retries: u32,
    /// Base delay for the exponential window, in milliseconds
    pub base_delay_ms: u64,
    /// Response statuses that trigger a retry
    pub retryable_statuses: BTreeSet<u16>,
    /// Transport failure classes that trigger a retry
    pub retryable_classes: Vec<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 100,
            retryable_statuses: default_retryable_statuses(),
            retryable_classes: vec![ErrorClass::Network, ErrorClass::Timeout],
        }
    }
}

/// The default retryable status set: request timeout, rate limiting, server
/// errors and the common CDN-edge statuses.
#[must_use]
pub fn default_retryable_statuses() -> BTreeSet<u16> {
    [
        408, 429, 500, 502, 503, 504, 507, 509, 520, 521, 522, 523, 525, 527, 530,
    ]
    .into_iter()
    .collect()
}

/// Information about a single retry attempt for logging and error reporting.
#[derive(Debug, Clone)]
pub struct RetryInfo {
    /// The retry attempt number (1-indexed)
    pub attempt: u32,
    /// The HTTP status code that triggered the retry, if available
    pub status_code: Option<u16>,
    /// The delay in milliseconds before this retry
    pub delay_ms: u64,
    /// Human-readable reason for the retry
    pub reason: String,
}

/// Result of a retry operation, including retry history for diagnostics.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The final result
    pub result: Result<T, Error>,
    /// History of retry attempts (empty if the first attempt settled it)
    pub retry_history: Vec<RetryInfo>,
    /// Total number of attempts made (including the final one)
    pub total_attempts: u32,
}

/// Status information the classifier needs from a successful attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptStatus {
    /// Response status code
    pub status: u16,
    /// Parsed `Retry-After` delay, when the response carried one
    pub retry_after: Option<Duration>,
}

impl RetryPolicy {
    /// Whether a response status triggers a retry under this policy.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Whether a transport error triggers a retry under this policy.
    #[must_use]
    pub fn is_retryable_error(&self, error: &Error) -> bool {
        ErrorClass::of(error).is_some_and(|class| self.retryable_classes.contains(&class))
    }

    /// Delay before retrying `attempt` (0-indexed): full jitter within the
    /// exponential window, capped at 30 seconds.
    ///
    /// The delay lies in `[base * 2^attempt, min(cap, base * 2^(attempt+1))]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64;
        let exp = attempt.min(30); // cap the exponent to prevent overflow
        let window = base * f64::from(1_u32 << exp.min(30)) * (1.0 + fastrand::f64());
        let capped = window.min(constants::RETRY_MAX_DELAY_MS as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retrying, honoring an optional `Retry-After` value.
    ///
    /// When the server-specified delay exceeds the computed backoff it is
    /// used instead, still capped at 30 seconds.
    #[must_use]
    pub fn delay_with_retry_after(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.backoff_delay(attempt);
        retry_after.map_or(computed, |server_delay| {
            computed
                .max(server_delay)
                .min(Duration::from_millis(constants::RETRY_MAX_DELAY_MS))
        })
    }
}

/// Parses a `Retry-After` header value and returns the delay duration.
///
/// The header can be specified in two formats:
/// - Delay in seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2015 07:28:00 GMT`
///
/// Returns `None` if the value is malformed or represents a time in the past.
#[must_use]
pub fn parse_retry_after_value(value: &str) -> Option<Duration> {
    // Try parsing as seconds first (most common)
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // Try parsing as HTTP-date (RFC 7231 format)
    if let Ok(date) = httpdate::parse_http_date(value) {
        let now = SystemTime::now();
        if let Ok(duration) = date.duration_since(now) {
            return Some(duration);
        }
        // Date is in the past
        return None;
    }

    None
}

/// Executes an operation under a retry policy, tracking attempts.
///
/// `operation` receives the 0-indexed attempt number. `status_of` extracts
/// the classifier inputs from a completed attempt. Cancellation is observed
/// during backoff sleep; an in-flight operation observes it on its own.
pub async fn execute_with_retry<T, F, Fut, S>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    method: &str,
    uri: &str,
    status_of: S,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
    S: Fn(&T) -> AttemptStatus,
{
    let mut retry_history = Vec::new();
    let total_attempts = policy.max_retries + 1;

    for attempt in 0..total_attempts {
        let is_last_attempt = attempt + 1 >= total_attempts;

        match operation(attempt).await {
            Ok(value) => {
                let status = status_of(&value);
                if is_last_attempt || !policy.is_retryable_status(status.status) {
                    // A final retryable response is still returned to the
                    // caller: HTTP errors are responses, not errors.
                    return RetryOutcome {
                        result: Ok(value),
                        retry_history,
                        total_attempts: attempt + 1,
                    };
                }

                let delay = policy.delay_with_retry_after(attempt, status.retry_after);
                debug!(
                    attempt,
                    status = status.status,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after retryable status"
                );
                retry_history.push(RetryInfo {
                    attempt: attempt + 1,
                    status_code: Some(status.status),
                    delay_ms: delay.as_millis() as u64,
                    reason: format!("{method} {uri}: status {}", status.status),
                });

                if let Err(e) = backoff_sleep(delay, cancel, method, uri).await {
                    return RetryOutcome {
                        result: Err(e),
                        retry_history,
                        total_attempts: attempt + 1,
                    };
                }
            }
            Err(error) => {
                if error.is_cancelled() || is_last_attempt || !policy.is_retryable_error(&error) {
                    return RetryOutcome {
                        result: Err(error),
                        retry_history,
                        total_attempts: attempt + 1,
                    };
                }

                let delay = policy.backoff_delay(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transport error"
                );
                retry_history.push(RetryInfo {
                    attempt: attempt + 1,
                    status_code: None,
                    delay_ms: delay.as_millis() as u64,
                    reason: format!("{method} {uri}: {error}"),
                });

                if let Err(e) = backoff_sleep(delay, cancel, method, uri).await {
                    return RetryOutcome {
                        result: Err(e),
                        retry_history,
                        total_attempts: attempt + 1,
                    };
                }
            }
        }
    }

    // The loop always returns from within; max_retries + 1 >= 1.
    unreachable!("retry loop must settle within its attempt budget")
}

/// Sleep for the backoff window, waking early on cancellation.
async fn backoff_sleep(
    delay: Duration,
    cancel: Option<&CancellationToken>,
    method: &str,
    uri: &str,
) -> Result<(), Error> {
    match cancel {
        Some(token) => {
            tokio::select! {
                () = token.cancelled() => Err(Error::cancelled(method, uri)),
                () = sleep(delay) => Ok(()),
            }
        }
        None => {
            sleep(delay).await;
            Ok(())
        }
    }
}
