//! The immutable per-request context.
//!
//! A [`RequestContext`] is the validated snapshot of everything one send
//! needs: method, absolute URL, headers, body, timeouts, retry policy,
//! cache directives and debug flags. Once built it never changes; the
//! `with_*` methods return modified copies. Concurrent tasks sharing a
//! handler therefore cannot corrupt one another's request state.

use crate::error::Error;
use crate::options::{set_header, Body, CacheRequestOptions, RequestOptions};
use crate::retry::{ErrorClass, RetryPolicy};
use crate::uri;
use indexmap::IndexMap;
use url::Url;

/// Immutable request snapshot.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: String,
    url: Url,
    headers: IndexMap<String, String>,
    body: Body,
    timeout: std::time::Duration,
    connect_timeout: std::time::Duration,
    retry: RetryPolicy,
    cache: CacheRequestOptions,
    allow_redirects: bool,
    proxy: Option<String>,
    stream: bool,
    debug: bool,
    profile: bool,
    is_async: bool,
}

impl RequestContext {
    /// Build a context from merged options, a verb override and the
    /// request URI.
    ///
    /// Performs normalization, base joining and query appending; this is
    /// where every `InvalidOption` failure surfaces, before any I/O.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` on validation failure.
    pub fn build(
        options: &RequestOptions,
        method_override: Option<&str>,
        request_uri: &str,
    ) -> Result<Self, Error> {
        let normalized = options.normalize(method_override)?;

        let joined = uri::join_base(options.base_uri.as_deref(), request_uri)?;
        let with_query = uri::append_query(&joined, &normalized.query);
        let url = uri::parse_absolute(&with_query)?;

        let retry = RetryPolicy {
            max_retries: options.retries.unwrap_or(0),
            base_delay_ms: options
                .retry_delay
                .map_or(100, |d| d.as_millis() as u64),
            retryable_statuses: options
                .retry_status_codes
                .clone()
                .unwrap_or_else(crate::retry::default_retryable_statuses),
            retryable_classes: options
                .retry_exceptions
                .clone()
                .unwrap_or_else(|| vec![ErrorClass::Network, ErrorClass::Timeout]),
        };

        Ok(Self {
            method: normalized.method,
            url,
            headers: normalized.headers,
            body: normalized.body,
            timeout: normalized.timeout,
            connect_timeout: normalized.connect_timeout,
            retry,
            cache: options.cache.clone(),
            allow_redirects: options.allow_redirects.unwrap_or(true),
            proxy: options.proxy.clone(),
            stream: options.stream.unwrap_or(false),
            debug: options.debug.unwrap_or(false),
            profile: options.profile.unwrap_or(false),
            is_async: options.is_async.unwrap_or(false),
        })
    }

    /// The uppercased HTTP verb.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The fully assembled absolute URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers after normalization (body-implied and auth headers
    /// included).
    #[must_use]
    pub const fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// The resolved body source.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Per-attempt deadline.
    #[must_use]
    pub const fn timeout(&self) -> std::time::Duration {
        self.timeout
    }

    /// Connection-establishment and pool-checkout deadline.
    #[must_use]
    pub const fn connect_timeout(&self) -> std::time::Duration {
        self.connect_timeout
    }

    /// The retry policy for this send.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Per-request cache directives.
    #[must_use]
    pub const fn cache(&self) -> &CacheRequestOptions {
        &self.cache
    }

    #[must_use]
    pub const fn allow_redirects(&self) -> bool {
        self.allow_redirects
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    #[must_use]
    pub const fn stream(&self) -> bool {
        self.stream
    }

    /// Whether a debug snapshot is captured for this send.
    #[must_use]
    pub const fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Whether the profiler aggregates this send.
    #[must_use]
    pub const fn profile_enabled(&self) -> bool {
        self.profile
    }

    /// Whether this send runs on the cooperative facade (and therefore
    /// bypasses the cache).
    #[must_use]
    pub const fn is_async(&self) -> bool {
        self.is_async
    }

    /// Copy with one header set (case-insensitive replace).
    #[must_use]
    pub fn with_header(&self, name: &str, value: &str) -> Self {
        let mut next = self.clone();
        set_header(&mut next.headers, name, value);
        next
    }

    /// Copy with one query parameter appended to the URL.
    #[must_use]
    pub fn with_query_param(&self, name: &str, value: &str) -> Self {
        let mut next = self.clone();
        let appended = uri::append_query(
            next.url.as_str(),
            &[(name.to_string(), value.to_string())],
        );
        if let Ok(url) = Url::parse(&appended) {
            next.url = url;
        }
        next
    }

    /// Copy with a different verb.
    #[must_use]
    pub fn with_method(&self, method: &str) -> Self {
        let mut next = self.clone();
        next.method = method.to_uppercase();
        next
    }

    /// Copy with a different per-attempt timeout.
    #[must_use]
    pub fn with_timeout(&self, timeout: std::time::Duration) -> Self {
        let mut next = self.clone();
        next.timeout = timeout;
        next
    }

    /// Copy that skips cache lookup but still stores the fresh response.
    /// Background revalidation runs through this.
    #[must_use]
    pub fn with_force_refresh(&self) -> Self {
        let mut next = self.clone();
        next.cache.force_refresh = Some(true);
        next
    }

    /// Copy marked as running on the cooperative facade.
    #[must_use]
    pub fn into_async(&self) -> Self {
        let mut next = self.clone();
        next.is_async = true;
        next
    }

    /// The wire-shaped request handed to mocks, recorders and the
    /// transport.
    #[must_use]
    pub fn prepared(&self) -> PreparedRequest {
        PreparedRequest {
            method: self.method.clone(),
            url: self.url.to_string(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// The final request form: everything the wire sees.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Body,
}

impl PreparedRequest {
    /// Body bytes as they would be sent, for recording purposes.
    #[must_use]
    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        self.body.hashable_bytes()
    }
}
