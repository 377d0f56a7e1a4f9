//! Centralized string constants for courier
//!
//! This module contains commonly used string literals to:
//! - Reduce string duplication
//! - Improve maintainability
//! - Ensure consistency across the codebase

// HTTP Headers
pub const HEADER_ACCEPT: &str = "Accept";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const HEADER_CONTENT_ENCODING: &str = "Content-Encoding";
pub const HEADER_TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const HEADER_CACHE_CONTROL: &str = "Cache-Control";
pub const HEADER_EXPIRES: &str = "Expires";
pub const HEADER_DATE: &str = "Date";
pub const HEADER_ETAG: &str = "ETag";
pub const HEADER_LAST_MODIFIED: &str = "Last-Modified";
pub const HEADER_IF_NONE_MATCH: &str = "If-None-Match";
pub const HEADER_IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const HEADER_VARY: &str = "Vary";
pub const HEADER_CONNECTION: &str = "Connection";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";
pub const HEADER_X_CACHE_STATUS: &str = "X-Cache-Status";

// Lowercase header names (for HTTP/2 compatibility and internal use)
pub const HEADER_AUTHORIZATION_LC: &str = "authorization";
pub const HEADER_CONTENT_TYPE_LC: &str = "content-type";

// Cache status markers carried on delivered responses
pub const CACHE_STATUS_HIT: &str = "HIT";
pub const CACHE_STATUS_MISS: &str = "MISS";
pub const CACHE_STATUS_STALE: &str = "STALE";
pub const CACHE_STATUS_REVALIDATED: &str = "REVALIDATED";
pub const CACHE_STATUS_STALE_IF_ERROR: &str = "STALE-IF-ERROR";
pub const CACHE_STATUS_BYPASS: &str = "BYPASS";
pub const CACHE_STATUS_REFRESH: &str = "REFRESH";

// Content Types
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

// Environment Variables
pub const ENV_NO_NETWORK: &str = "NO_NETWORK";

// Error Context Messages
pub const ERR_API_CREDENTIALS: &str =
    "Check your API credentials and authentication configuration.";
pub const ERR_RATE_LIMITED: &str = "You're making requests too quickly. Wait before trying again.";
pub const ERR_SERVER_ERROR: &str = "The origin server is experiencing issues. Try again later.";
pub const ERR_CONNECTION: &str = "Check that the origin server is running and accessible.";
pub const ERR_TIMEOUT: &str = "The origin server may be slow or unresponsive. Try again later.";
pub const ERR_JSON_SYNTAX: &str = "Check that your request body or response contains valid JSON.";

// Default Values
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_KEY_PREFIX: &str = "courier";

// Retry bounds
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

// File suffixes and identifiers
pub const FILE_EXT_JSON: &str = ".json";
pub const CACHE_FILE_SUFFIX: &str = "_entry.json";

// Redaction placeholder for sensitive values in snapshots and logs
pub const REDACTED: &str = "***";

// HTTP Methods
pub const HTTP_METHOD_GET: &str = "GET";
pub const HTTP_METHOD_POST: &str = "POST";
pub const HTTP_METHOD_PUT: &str = "PUT";
pub const HTTP_METHOD_DELETE: &str = "DELETE";
pub const HTTP_METHOD_PATCH: &str = "PATCH";
pub const HTTP_METHOD_HEAD: &str = "HEAD";
pub const HTTP_METHOD_OPTIONS: &str = "OPTIONS";

/// The full set of verbs accepted by option validation.
pub const ALLOWED_METHODS: &[&str] = &[
    HTTP_METHOD_GET,
    HTTP_METHOD_HEAD,
    HTTP_METHOD_POST,
    HTTP_METHOD_PUT,
    HTTP_METHOD_PATCH,
    HTTP_METHOD_DELETE,
    HTTP_METHOD_OPTIONS,
];

/// Check if a header name carries credentials and must be redacted in
/// snapshots, recordings and logs.
#[must_use]
pub fn is_sensitive_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "authorization"
            | "proxy-authorization"
            | "x-api-key"
            | "api-key"
            | "x-auth-token"
            | "cookie"
            | "set-cookie"
    )
}

/// Check if a content type is JSON
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    content_type.contains("json")
}
