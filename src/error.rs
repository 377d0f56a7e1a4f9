//! Error types for courier.
//!
//! Everything that can go wrong in the pipeline funnels into [`Error`],
//! classified by [`ErrorKind`] so the retry loop and callers can act on
//! the category rather than the concrete failure. Internal errors carry
//! optional structured `details` (a JSON object for programmatic
//! consumers) and a short remediation `hint`; [`Error::to_json`] exposes
//! the same shape for structured output.
//!
//! HTTP error *responses* (4xx/5xx) are not errors — they are returned to
//! the caller as responses. Only option validation, transport failures,
//! timeouts, cancellation and mock-stray conditions surface through this
//! type.

use crate::constants;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Keep essential external errors that can't be consolidated
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // Everything courier raises itself
    #[error("{kind}: {message}")]
    Internal {
        kind: ErrorKind,
        message: Cow<'static, str>,
        /// Structured fields describing the failure
        details: Option<serde_json::Value>,
        /// What the caller might do about it
        hint: Option<Cow<'static, str>>,
    },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Error categories for consolidated error handling
///
/// All internal errors are mapped to one of these categories to provide
/// consistent classification, in particular for the retry loop which treats
/// `Network` and `Timeout` as retryable and everything else as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Option validation failed; raised before any I/O, never retried
    InvalidOption,
    /// Transport could not establish or complete a connection
    /// (DNS, connect timeout, TLS, pool exhausted)
    NetworkError,
    /// Transport completed but surfaced a protocol-level failure
    RequestError,
    /// Per-attempt `timeout` exceeded
    TimeoutError,
    /// Cache backend failed; always recovered internally, logged, not surfaced
    CacheStorage,
    /// Cooperative cancellation delivered; not retried, propagated
    Cancelled,
    /// `prevent_stray` active and no mock pattern matched
    MockStray,
    /// Anything else that escapes classification
    Runtime,
}

impl ErrorKind {
    /// Get the string identifier for this error kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidOption => "InvalidOption",
            Self::NetworkError => "NetworkError",
            Self::RequestError => "RequestError",
            Self::TimeoutError => "TimeoutError",
            Self::CacheStorage => "CacheStorageError",
            Self::Cancelled => "Cancelled",
            Self::MockStray => "MockStrayRequest",
            Self::Runtime => "Runtime",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON representation of an error for structured output
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonError {
    pub error_type: Cow<'static, str>,
    pub message: String,
    pub context: Option<Cow<'static, str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// The consolidated kind of this error.
    ///
    /// Foreign errors are classified on access: reqwest timeouts map to
    /// `TimeoutError`, connect failures to `NetworkError`, everything else
    /// transport-shaped to `RequestError`.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Runtime,
            Self::Network(e) => {
                if e.is_timeout() {
                    ErrorKind::TimeoutError
                } else if e.is_connect() {
                    ErrorKind::NetworkError
                } else {
                    ErrorKind::RequestError
                }
            }
            Self::Json(_) => ErrorKind::Runtime,
            Self::Internal { kind, .. } => *kind,
            Self::Anyhow(_) => ErrorKind::Runtime,
        }
    }

    /// Whether this error represents cooperative cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Whether this error represents an exceeded per-attempt timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::TimeoutError
    }

    /// Add request context (method and URI) to an error for better messaging.
    ///
    /// Used by the executor when a terminal failure surfaces, so the caller
    /// sees which send failed while the underlying cause stays in the
    /// message.
    #[must_use]
    pub fn with_request_context(self, method: &str, uri: &str) -> Self {
        match self {
            Self::Network(e) => {
                let kind = if e.is_timeout() {
                    ErrorKind::TimeoutError
                } else if e.is_connect() {
                    ErrorKind::NetworkError
                } else {
                    ErrorKind::RequestError
                };
                Self::Internal {
                    kind,
                    message: Cow::Owned(format!("{method} {uri}: {e}")),
                    details: Some(json!({ "method": method, "uri": uri })),
                    hint: None,
                }
            }
            Self::Internal {
                kind,
                message,
                details,
                hint,
            } => Self::Internal {
                kind,
                message: Cow::Owned(format!("{method} {uri}: {message}")),
                details,
                hint,
            },
            other => other,
        }
    }

    /// Convert error to JSON representation for structured output
    #[must_use]
    pub fn to_json(&self) -> JsonError {
        let (error_type, message, context, details): (
            &str,
            String,
            Option<Cow<'static, str>>,
            Option<serde_json::Value>,
        ) = match self {
            Self::Io(io_err) => ("FileSystem", io_err.to_string(), None, None),
            Self::Network(req_err) => {
                let context = match () {
                    () if req_err.is_connect() => Some(Cow::Borrowed(constants::ERR_CONNECTION)),
                    () if req_err.is_timeout() => Some(Cow::Borrowed(constants::ERR_TIMEOUT)),
                    () if req_err.is_status() => {
                        req_err.status().and_then(|status| match status.as_u16() {
                            401 | 403 => Some(Cow::Borrowed(constants::ERR_API_CREDENTIALS)),
                            429 => Some(Cow::Borrowed(constants::ERR_RATE_LIMITED)),
                            500..=599 => Some(Cow::Borrowed(constants::ERR_SERVER_ERROR)),
                            _ => None,
                        })
                    }
                    () => None,
                };
                ("NetworkError", req_err.to_string(), context, None)
            }
            Self::Json(json_err) => (
                "JSONParsing",
                json_err.to_string(),
                Some(Cow::Borrowed(constants::ERR_JSON_SYNTAX)),
                None,
            ),
            Self::Internal {
                kind,
                message,
                details,
                hint,
            } => (
                kind.as_str(),
                message.to_string(),
                hint.clone(),
                details.clone(),
            ),
            Self::Anyhow(anyhow_err) => ("Unknown", anyhow_err.to_string(), None, None),
        };

        JsonError {
            error_type: Cow::Borrowed(error_type),
            message,
            context,
            details,
        }
    }
}

impl Error {
    /// Create an option validation error
    pub fn invalid_option(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        let reason = reason.into();
        Self::Internal {
            kind: ErrorKind::InvalidOption,
            message: Cow::Owned(format!("invalid option '{field}': {reason}")),
            details: Some(json!({ "field": field, "reason": reason })),
            hint: None,
        }
    }

    /// Create a generic network error (connection could not be established
    /// or completed)
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Internal {
            kind: ErrorKind::NetworkError,
            message: Cow::Owned(reason.into()),
            details: None,
            hint: Some(Cow::Borrowed(constants::ERR_CONNECTION)),
        }
    }

    /// Create a pool exhaustion error for a host bucket
    pub fn pool_exhausted(host_key: impl Into<String>, waited_ms: u64) -> Self {
        let host_key = host_key.into();
        Self::Internal {
            kind: ErrorKind::NetworkError,
            message: Cow::Owned(format!(
                "connection pool exhausted for '{host_key}' after waiting {waited_ms}ms"
            )),
            details: Some(json!({ "host": host_key, "waited_ms": waited_ms })),
            hint: Some(Cow::Borrowed(
                "Raise max_per_host/max_connections or reduce concurrent requests.",
            )),
        }
    }

    /// Create a DNS resolution error
    pub fn dns(host: impl Into<String>, reason: impl Into<String>) -> Self {
        let host = host.into();
        let reason = reason.into();
        Self::Internal {
            kind: ErrorKind::NetworkError,
            message: Cow::Owned(format!("DNS resolution failed for '{host}': {reason}")),
            details: Some(json!({ "host": host, "reason": reason })),
            hint: None,
        }
    }

    /// Create a protocol-level request failure that surfaced from a
    /// completed transport exchange
    pub fn request(reason: impl Into<String>) -> Self {
        Self::Internal {
            kind: ErrorKind::RequestError,
            message: Cow::Owned(reason.into()),
            details: None,
            hint: None,
        }
    }

    /// Create a per-attempt timeout error
    pub fn timeout(what: impl Into<String>, elapsed_ms: u64) -> Self {
        let what = what.into();
        Self::Internal {
            kind: ErrorKind::TimeoutError,
            message: Cow::Owned(format!("{what} timed out after {elapsed_ms}ms")),
            details: Some(json!({ "operation": what, "elapsed_ms": elapsed_ms })),
            hint: Some(Cow::Borrowed(constants::ERR_TIMEOUT)),
        }
    }

    /// Create a cache backend error. The executor recovers these internally;
    /// callers only ever see them in logs.
    pub fn cache_storage(reason: impl Into<String>) -> Self {
        Self::Internal {
            kind: ErrorKind::CacheStorage,
            message: Cow::Owned(reason.into()),
            details: None,
            hint: None,
        }
    }

    /// Create a cancellation error for an in-flight send
    pub fn cancelled(method: impl Into<String>, uri: impl Into<String>) -> Self {
        let method = method.into();
        let uri = uri.into();
        Self::Internal {
            kind: ErrorKind::Cancelled,
            message: Cow::Owned(format!("{method} {uri}: cancelled")),
            details: Some(json!({ "method": method, "uri": uri })),
            hint: None,
        }
    }

    /// Create a stray-request error: `prevent_stray` is active and no mock
    /// pattern matched
    pub fn mock_stray(method: impl Into<String>, url: impl Into<String>) -> Self {
        let method = method.into();
        let url = url.into();
        Self::Internal {
            kind: ErrorKind::MockStray,
            message: Cow::Owned(format!("no mock registered for {method} {url}")),
            details: Some(json!({ "method": method, "url": url })),
            hint: Some(Cow::Borrowed(
                "Register a matching mock or disable prevent_stray to allow real sends.",
            )),
        }
    }

    /// Create a runtime error for conditions that escape classification
    pub fn runtime(reason: impl Into<String>) -> Self {
        Self::Internal {
            kind: ErrorKind::Runtime,
            message: Cow::Owned(reason.into()),
            details: None,
            hint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_option_carries_field_and_reason() {
        let err = Error::invalid_option("timeout", "must be positive");
        assert_eq!(err.kind(), ErrorKind::InvalidOption);
        let json = err.to_json();
        assert_eq!(json.error_type, "InvalidOption");
        assert_eq!(json.details.unwrap()["field"], "timeout");
    }

    #[test]
    fn test_pool_exhausted_is_network_kind() {
        let err = Error::pool_exhausted("https://api.example.com:443", 5000);
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(err.to_string().contains("pool exhausted"));
    }

    #[test]
    fn test_timeout_kind_and_predicate() {
        let err = Error::timeout("GET https://api.example.com/a", 30_000);
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_predicate() {
        let err = Error::cancelled("GET", "https://api.example.com/a");
        assert!(err.is_cancelled());
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_mock_stray_message() {
        let err = Error::mock_stray("POST", "https://api.example.com/users");
        assert_eq!(err.kind(), ErrorKind::MockStray);
        assert!(err
            .to_string()
            .contains("no mock registered for POST https://api.example.com/users"));
    }

    #[test]
    fn test_with_request_context_prefixes_internal_message() {
        let err = Error::network("connection refused")
            .with_request_context("GET", "https://api.example.com/a");
        let msg = err.to_string();
        assert!(msg.contains("GET https://api.example.com/a"));
        assert!(msg.contains("connection refused"));
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[test]
    fn test_with_request_context_keeps_hint() {
        let err = Error::pool_exhausted("https://api.example.com:443", 100)
            .with_request_context("GET", "https://api.example.com/a");
        let json = err.to_json();
        assert!(json.context.unwrap().contains("max_per_host"));
        assert_eq!(json.details.unwrap()["waited_ms"], 100);
    }

    #[test]
    fn test_to_json_internal_details_roundtrip() {
        let err = Error::dns("api.example.com", "no addresses returned");
        let json = err.to_json();
        assert_eq!(json.error_type, "NetworkError");
        assert_eq!(json.details.unwrap()["host"], "api.example.com");
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::CacheStorage.to_string(), "CacheStorageError");
        assert_eq!(ErrorKind::MockStray.to_string(), "MockStrayRequest");
    }
}
