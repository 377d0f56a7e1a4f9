//! The delivered response abstraction.
//!
//! A [`Response`] owns its body buffer and decodes it lazily: `json()`
//! parses on first access and caches the value, `text()` borrows when the
//! bytes are valid UTF-8. HTTP error statuses are ordinary responses here,
//! never `Err` values.

use crate::cache::CachedEntry;
use crate::constants;
use crate::error::Error;
use crate::mock::MockResponse;
use crate::profile::DebugSnapshot;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

/// Response headers as a multimap preserving order and repeats.
pub type Headers = Vec<(String, Vec<String>)>;

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    url: String,
    headers: Headers,
    body: Vec<u8>,
    json_cache: Arc<OnceLock<Option<serde_json::Value>>>,
    debug_info: Option<Arc<DebugSnapshot>>,
}

impl Response {
    /// Build a response from its parts.
    #[must_use]
    pub fn new(status: u16, url: impl Into<String>, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            status,
            url: url.into(),
            headers,
            body,
            json_cache: Arc::new(OnceLock::new()),
            debug_info: None,
        }
    }

    /// Build a response from a cached entry, tagged with a cache-status
    /// marker.
    #[must_use]
    pub fn from_cached_entry(entry: &CachedEntry, url: impl Into<String>, marker: &str) -> Self {
        let mut response = Self::new(
            entry.status,
            url,
            entry.headers.clone(),
            entry.body.clone(),
        );
        response.set_header(constants::HEADER_X_CACHE_STATUS, marker);
        response
    }

    /// Build a response from a mock responder's output.
    #[must_use]
    pub fn from_mock(mock: MockResponse, url: impl Into<String>) -> Self {
        let headers = mock
            .headers
            .into_iter()
            .map(|(name, value)| (name, vec![value]))
            .collect();
        Self::new(mock.status, url, headers, mock.body)
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// The URL this response was delivered for.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Whether the status is 3xx.
    #[must_use]
    pub const fn is_redirect(&self) -> bool {
        self.status >= 300 && self.status < 400
    }

    /// Whether the status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Whether the status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// All headers, order preserved.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// Set or replace a header (single value).
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = vec![value.to_string()];
        } else {
            self.headers.push((name.to_string(), vec![value.to_string()]));
        }
    }

    /// The cache-status marker, when the cache layer tagged this delivery.
    #[must_use]
    pub fn cache_status(&self) -> Option<&str> {
        self.header(constants::HEADER_X_CACHE_STATUS)
    }

    /// Raw body bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as text; borrows when already valid UTF-8.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Body parsed as an arbitrary JSON value, parsed once and cached.
    ///
    /// Returns `None` when the body is not valid JSON.
    #[must_use]
    pub fn json_value(&self) -> Option<&serde_json::Value> {
        self.json_cache
            .get_or_init(|| serde_json::from_slice(&self.body).ok())
            .as_ref()
    }

    /// Body deserialized into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns a JSON error when the body does not parse into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The per-request debug snapshot, when debug was enabled.
    #[must_use]
    pub fn debug_info(&self) -> Option<&Arc<DebugSnapshot>> {
        self.debug_info.as_ref()
    }

    /// Attach a debug snapshot.
    pub fn attach_debug(&mut self, snapshot: Arc<DebugSnapshot>) {
        self.debug_info = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn response(status: u16, body: &str) -> Response {
        Response::new(
            status,
            "https://api.example.com/a",
            vec![("Content-Type".into(), vec!["application/json".into()])],
            body.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_status_predicates() {
        assert!(response(200, "").is_success());
        assert!(response(301, "").is_redirect());
        assert!(response(404, "").is_client_error());
        assert!(response(503, "").is_server_error());
        assert!(!response(200, "").is_client_error());
    }

    #[test]
    fn test_header_access_case_insensitive() {
        let r = response(200, "");
        assert_eq!(r.header("content-type"), Some("application/json"));
        assert_eq!(r.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(r.header("X-Missing"), None);
    }

    #[test]
    fn test_set_header_replaces() {
        let mut r = response(200, "");
        r.set_header("X-Cache-Status", "HIT");
        r.set_header("x-cache-status", "MISS");
        assert_eq!(r.cache_status(), Some("MISS"));
        assert_eq!(
            r.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("X-Cache-Status"))
                .count(),
            1
        );
    }

    #[test]
    fn test_text_and_bytes() {
        let r = response(200, "plain text");
        assert_eq!(r.text(), "plain text");
        assert_eq!(r.bytes(), b"plain text");
    }

    #[test]
    fn test_json_value_lazy_and_cached() {
        let r = response(200, r#"{"x": 1}"#);
        let first = r.json_value().unwrap();
        assert_eq!(first["x"], 1);
        // Same cached allocation on second access
        let second = r.json_value().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_json_value_invalid_is_none() {
        let r = response(200, "not json");
        assert!(r.json_value().is_none());
    }

    #[test]
    fn test_json_typed() {
        #[derive(serde::Deserialize)]
        struct Payload {
            x: i32,
        }
        let r = response(200, r#"{"x": 7}"#);
        let payload: Payload = r.json().unwrap();
        assert_eq!(payload.x, 7);
        assert!(r.json::<Vec<String>>().is_err());
    }

    #[test]
    fn test_from_mock() {
        let mock = MockResponse::json(201, &json!({"id": 9}));
        let r = Response::from_mock(mock, "https://api/x");
        assert_eq!(r.status(), 201);
        assert_eq!(r.header("Content-Type"), Some("application/json"));
        assert_eq!(r.json_value().unwrap()["id"], 9);
    }

    #[test]
    fn test_from_cached_entry_carries_marker() {
        let entry = CachedEntry::new(
            200,
            vec![("Content-Type".into(), vec!["application/json".into()])],
            br#"{"x":1}"#.to_vec(),
            0,
            60,
            None,
            None,
            BTreeMap::new(),
        );
        let r = Response::from_cached_entry(&entry, "https://api/a", constants::CACHE_STATUS_HIT);
        assert_eq!(r.cache_status(), Some("HIT"));
        assert_eq!(r.bytes(), entry.body.as_slice());
    }
}
