//! Cache policy: cacheability, freshness, revalidation and 304 merging.
//!
//! Storage lives behind [`CacheStore`]; this layer decides. Backend
//! failures never surface — every path degrades to uncached behavior with
//! a warning, per the error-handling contract for `CacheStorageError`.

use super::control::CacheControl;
use super::entry::{unix_now, CachedEntry};
use super::key::{self, CacheKeyConfig};
use super::{CacheStore, StoreStats};
use crate::constants;
use crate::options::{get_header, Body, CacheRequestOptions};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Handler-level cache configuration; per-request options override fields
/// where noted.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching participates at all (per-request `cache.enabled`
    /// overrides)
    pub enabled: bool,
    /// Freshness applied when neither the request nor the response headers
    /// provide one
    pub default_ttl: Duration,
    /// Methods eligible for cache participation
    pub cacheable_methods: BTreeSet<String>,
    /// Statuses eligible for storage
    pub cacheable_statuses: BTreeSet<u16>,
    /// Honor response `Cache-Control` on store decisions (per-request
    /// `cache.respect_headers` overrides)
    pub respect_headers: bool,
    /// Shared-cache semantics: `s-maxage` applies, `private` is excluded
    /// (per-request `cache.is_shared_cache` overrides)
    pub is_shared: bool,
    /// Serve-stale window for stale-while-revalidate when the response
    /// carries no directive of its own
    pub swr_window: Option<Duration>,
    /// Serve-stale window for stale-if-error when the response carries no
    /// directive of its own
    pub sie_window: Option<Duration>,
    /// Key derivation settings
    pub key: CacheKeyConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(constants::DEFAULT_CACHE_TTL_SECS),
            cacheable_methods: [constants::HTTP_METHOD_GET, constants::HTTP_METHOD_HEAD]
                .iter()
                .map(ToString::to_string)
                .collect(),
            cacheable_statuses: [200, 203, 204, 206, 300, 301, 404, 410].into_iter().collect(),
            respect_headers: true,
            is_shared: false,
            swr_window: None,
            sie_window: None,
            key: CacheKeyConfig::default(),
        }
    }
}

/// The outcome of a cache lookup.
#[derive(Debug)]
pub enum Lookup {
    /// No usable entry
    Miss,
    /// Entry is within its freshness window
    Hit(CachedEntry),
    /// Entry exists but is past `fresh_until`; `swr` marks whether the
    /// stale-while-revalidate window still covers it
    Stale { entry: CachedEntry, swr: bool },
}

/// Policy layer over a [`CacheStore`].
pub struct CacheManager {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Create a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { config, store }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether this request participates in the cache at all: caching is
    /// enabled and the method is in the configured set.
    #[must_use]
    pub fn participates(&self, method: &str, req: &CacheRequestOptions) -> bool {
        let enabled = req.enabled.unwrap_or(self.config.enabled);
        if !enabled {
            return false;
        }
        // An unsafe method may participate when the caller opted its body
        // into the key.
        self.config.cacheable_methods.contains(method)
            || req.cache_body.unwrap_or(self.config.key.cache_body)
    }

    /// Derive the cache key for a request, honoring the per-request
    /// explicit key and `cache_body` override.
    #[must_use]
    pub fn generate_key(
        &self,
        method: &str,
        url: &Url,
        headers: &IndexMap<String, String>,
        body: &Body,
        req: &CacheRequestOptions,
    ) -> String {
        let key_config = CacheKeyConfig {
            cache_body: req.cache_body.unwrap_or(self.config.key.cache_body),
            ..self.config.key.clone()
        };
        key::generate(&key_config, method, url, headers, body, req.key.as_deref())
    }

    /// Look up `key`, classifying the entry against the current time and
    /// the request's vary values.
    pub async fn lookup(&self, key: &str, request_headers: &IndexMap<String, String>) -> Lookup {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Lookup::Miss,
            Err(e) => {
                warn!(error = %e, "cache lookup failed; treating as miss");
                return Lookup::Miss;
            }
        };

        // Variant selection: every vary value captured at store time must
        // match the live request.
        for (name, stored_value) in &entry.vary {
            let live = get_header(request_headers, name).unwrap_or("");
            if live != stored_value {
                debug!(header = %name, "vary mismatch; cache miss");
                return Lookup::Miss;
            }
        }

        let now = unix_now();
        if entry.is_fresh(now) {
            return Lookup::Hit(entry);
        }

        let swr = self
            .swr_window_for(&entry)
            .is_some_and(|window| entry.stale_for(now) <= window.as_secs());
        Lookup::Stale { entry, swr }
    }

    /// The conditional headers to inject for revalidating `entry`.
    #[must_use]
    pub fn conditional_headers(entry: &CachedEntry) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(etag) = &entry.etag {
            headers.push((constants::HEADER_IF_NONE_MATCH.to_string(), etag.clone()));
        }
        if let Some(last_modified) = &entry.last_modified {
            headers.push((
                constants::HEADER_IF_MODIFIED_SINCE.to_string(),
                last_modified.clone(),
            ));
        }
        headers
    }

    /// Whether `entry` may be served in place of a terminal transport
    /// error under the stale-if-error window.
    #[must_use]
    pub fn stale_if_error_usable(&self, entry: &CachedEntry) -> bool {
        self.sie_window_for(entry)
            .is_some_and(|window| entry.stale_for(unix_now()) <= window.as_secs())
    }

    /// Fetch the entry for `key` if it is usable under stale-if-error.
    pub async fn stale_if_error_entry(
        &self,
        key: &str,
        request_headers: &IndexMap<String, String>,
    ) -> Option<CachedEntry> {
        match self.lookup(key, request_headers).await {
            Lookup::Hit(entry) => Some(entry),
            Lookup::Stale { entry, .. } if self.stale_if_error_usable(&entry) => Some(entry),
            _ => None,
        }
    }

    /// Whether a completed response should be stored.
    ///
    /// Conjunction of: method in the configured set (or body-keyed opt-in),
    /// status in the configured set, and — when headers are respected —
    /// the response's `Cache-Control` permitting storage. A per-request
    /// `cache.ttl` counts as an explicit override of `no-cache`.
    #[must_use]
    pub fn should_store(
        &self,
        method: &str,
        status: u16,
        response_headers: &[(String, Vec<String>)],
        req: &CacheRequestOptions,
    ) -> bool {
        if !self.participates(method, req) {
            return false;
        }
        if !self.config.cacheable_statuses.contains(&status) {
            return false;
        }

        let respect = req.respect_headers.unwrap_or(self.config.respect_headers);
        if !respect {
            return true;
        }

        let shared = req.is_shared.unwrap_or(self.config.is_shared);
        let control = response_cache_control(response_headers);
        if !control.allows_store(shared) {
            return false;
        }
        if control.no_cache && req.ttl.is_none() {
            // no-cache without an explicit per-request freshness override
            return false;
        }
        true
    }

    /// Derive the freshness lifetime for a response.
    ///
    /// Precedence: per-request `cache.ttl` → `s-maxage` (shared) →
    /// `max-age` → `Expires` relative to `Date` → configured default.
    #[must_use]
    pub fn ttl_for(
        &self,
        response_headers: &[(String, Vec<String>)],
        req: &CacheRequestOptions,
    ) -> Duration {
        if let Some(ttl) = req.ttl {
            return ttl;
        }

        let shared = req.is_shared.unwrap_or(self.config.is_shared);
        let control = response_cache_control(response_headers);
        if let Some(secs) = control.freshness_lifetime(shared) {
            return Duration::from_secs(secs);
        }

        if let Some(expires) = first_header(response_headers, constants::HEADER_EXPIRES) {
            if let Ok(expires_at) = httpdate::parse_http_date(expires) {
                let reference = first_header(response_headers, constants::HEADER_DATE)
                    .and_then(|d| httpdate::parse_http_date(d).ok())
                    .unwrap_or_else(std::time::SystemTime::now);
                if let Ok(ttl) = expires_at.duration_since(reference) {
                    return ttl;
                }
                // Expires at or before Date: already stale
                return Duration::ZERO;
            }
        }

        self.config.default_ttl
    }

    /// Build a storable entry from a completed response.
    ///
    /// The vary snapshot captures the live request values for the
    /// configured vary axis plus any names the response's `Vary` header
    /// lists.
    #[must_use]
    pub fn build_entry(
        &self,
        status: u16,
        response_headers: Vec<(String, Vec<String>)>,
        body: Vec<u8>,
        request_headers: &IndexMap<String, String>,
        req: &CacheRequestOptions,
    ) -> CachedEntry {
        let now = unix_now();
        let ttl = self.ttl_for(&response_headers, req);

        let etag = first_header(&response_headers, constants::HEADER_ETAG).map(ToString::to_string);
        let last_modified =
            first_header(&response_headers, constants::HEADER_LAST_MODIFIED).map(ToString::to_string);

        let mut vary_names: BTreeSet<String> = self
            .config
            .key
            .vary_headers
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        if let Some(vary) = first_header(&response_headers, constants::HEADER_VARY) {
            for name in vary.split(',') {
                let name = name.trim().to_lowercase();
                if !name.is_empty() && name != "*" {
                    vary_names.insert(name);
                }
            }
        }

        let mut vary = BTreeMap::new();
        for name in vary_names {
            if let Some(value) = get_header(request_headers, &name) {
                vary.insert(name, value.to_string());
            }
        }

        CachedEntry::new(
            status,
            response_headers,
            body,
            now,
            now + ttl.as_secs(),
            etag,
            last_modified,
            vary,
        )
    }

    /// Merge a `304 Not Modified` response into the cached entry.
    ///
    /// The cached body is kept; cached headers are overlaid by the 304's
    /// headers except `Content-Length`, `Content-Encoding` and
    /// `Transfer-Encoding`. The freshness window is recomputed from the
    /// 304's headers.
    #[must_use]
    pub fn merge_304(
        &self,
        entry: &CachedEntry,
        not_modified_headers: &[(String, Vec<String>)],
        req: &CacheRequestOptions,
    ) -> CachedEntry {
        let excluded = [
            constants::HEADER_CONTENT_LENGTH,
            constants::HEADER_CONTENT_ENCODING,
            constants::HEADER_TRANSFER_ENCODING,
        ];

        let mut merged: Vec<(String, Vec<String>)> = entry.headers.clone();
        for (name, values) in not_modified_headers {
            if excluded.iter().any(|ex| ex.eq_ignore_ascii_case(name)) {
                continue;
            }
            if let Some(slot) = merged
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            {
                slot.1.clone_from(values);
            } else {
                merged.push((name.clone(), values.clone()));
            }
        }

        let now = unix_now();
        let ttl = self.ttl_for(not_modified_headers, req);
        let etag = first_header(&merged, constants::HEADER_ETAG)
            .map(ToString::to_string)
            .or_else(|| entry.etag.clone());
        let last_modified = first_header(&merged, constants::HEADER_LAST_MODIFIED)
            .map(ToString::to_string)
            .or_else(|| entry.last_modified.clone());

        CachedEntry::new(
            entry.status,
            merged,
            entry.body.clone(),
            now,
            now + ttl.as_secs(),
            etag,
            last_modified,
            entry.vary.clone(),
        )
    }

    /// Store an entry, recovering backend failures.
    pub async fn store_entry(&self, key: &str, entry: CachedEntry) {
        if let Err(e) = self.store.set(key, entry).await {
            warn!(error = %e, key, "cache store failed; response delivered uncached");
        }
    }

    /// Remove every entry from the backing store.
    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "cache clear failed");
        }
    }

    /// Aggregate statistics over the backing store.
    pub async fn stats(&self) -> StoreStats {
        match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "cache stats failed");
                StoreStats::default()
            }
        }
    }

    fn swr_window_for(&self, entry: &CachedEntry) -> Option<Duration> {
        entry
            .header(constants::HEADER_CACHE_CONTROL)
            .and_then(|cc| CacheControl::parse(cc).stale_while_revalidate)
            .map(Duration::from_secs)
            .or(self.config.swr_window)
    }

    fn sie_window_for(&self, entry: &CachedEntry) -> Option<Duration> {
        entry
            .header(constants::HEADER_CACHE_CONTROL)
            .and_then(|cc| CacheControl::parse(cc).stale_if_error)
            .map(Duration::from_secs)
            .or(self.config.sie_window)
    }
}

fn response_cache_control(headers: &[(String, Vec<String>)]) -> CacheControl {
    // Multiple occurrences combine with "," per HTTP
    let combined = headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(constants::HEADER_CACHE_CONTROL))
        .flat_map(|(_, values)| values.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(", ");
    CacheControl::parse(&combined)
}

fn first_header<'a>(headers: &'a [(String, Vec<String>)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::super::memory::MemoryStore;
    use super::*;

    fn manager(config: CacheConfig) -> CacheManager {
        CacheManager::new(Arc::new(MemoryStore::new(100)), config)
    }

    fn default_manager() -> CacheManager {
        manager(CacheConfig::default())
    }

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, Vec<String>)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), vec![(*v).to_string()]))
            .collect()
    }

    fn no_req() -> CacheRequestOptions {
        CacheRequestOptions::default()
    }

    #[test]
    fn test_participates_only_configured_methods() {
        let m = default_manager();
        assert!(m.participates("GET", &no_req()));
        assert!(m.participates("HEAD", &no_req()));
        assert!(!m.participates("POST", &no_req()));

        let req = CacheRequestOptions {
            cache_body: Some(true),
            ..CacheRequestOptions::default()
        };
        assert!(m.participates("POST", &req));

        let disabled = CacheRequestOptions {
            enabled: Some(false),
            ..CacheRequestOptions::default()
        };
        assert!(!m.participates("GET", &disabled));
    }

    #[test]
    fn test_should_store_status_set() {
        let m = default_manager();
        let h = headers(&[]);
        assert!(m.should_store("GET", 200, &h, &no_req()));
        assert!(m.should_store("GET", 404, &h, &no_req()));
        assert!(!m.should_store("GET", 500, &h, &no_req()));
        assert!(!m.should_store("GET", 201, &h, &no_req()));
    }

    #[test]
    fn test_should_store_respects_no_store() {
        let m = default_manager();
        let h = headers(&[("Cache-Control", "no-store")]);
        assert!(!m.should_store("GET", 200, &h, &no_req()));

        // respect_headers off ignores the directive
        let req = CacheRequestOptions {
            respect_headers: Some(false),
            ..CacheRequestOptions::default()
        };
        assert!(m.should_store("GET", 200, &h, &req));
    }

    #[test]
    fn test_should_store_no_cache_needs_explicit_ttl() {
        let m = default_manager();
        let h = headers(&[("Cache-Control", "no-cache")]);
        assert!(!m.should_store("GET", 200, &h, &no_req()));

        let req = CacheRequestOptions {
            ttl: Some(Duration::from_secs(30)),
            ..CacheRequestOptions::default()
        };
        assert!(m.should_store("GET", 200, &h, &req));
    }

    #[test]
    fn test_should_store_private_excluded_for_shared_cache() {
        let m = default_manager();
        let h = headers(&[("Cache-Control", "private, max-age=60")]);
        assert!(m.should_store("GET", 200, &h, &no_req()));

        let shared = CacheRequestOptions {
            is_shared: Some(true),
            ..CacheRequestOptions::default()
        };
        assert!(!m.should_store("GET", 200, &h, &shared));
    }

    #[test]
    fn test_ttl_precedence_request_wins() {
        let m = default_manager();
        let h = headers(&[("Cache-Control", "max-age=600")]);
        let req = CacheRequestOptions {
            ttl: Some(Duration::from_secs(5)),
            ..CacheRequestOptions::default()
        };
        assert_eq!(m.ttl_for(&h, &req), Duration::from_secs(5));
    }

    #[test]
    fn test_ttl_s_maxage_only_when_shared() {
        let m = default_manager();
        let h = headers(&[("Cache-Control", "max-age=60, s-maxage=600")]);
        assert_eq!(m.ttl_for(&h, &no_req()), Duration::from_secs(60));

        let shared = CacheRequestOptions {
            is_shared: Some(true),
            ..CacheRequestOptions::default()
        };
        assert_eq!(m.ttl_for(&h, &shared), Duration::from_secs(600));
    }

    #[test]
    fn test_ttl_from_expires_minus_date() {
        let m = default_manager();
        let h = headers(&[
            ("Date", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ("Expires", "Wed, 21 Oct 2015 07:29:30 GMT"),
        ]);
        assert_eq!(m.ttl_for(&h, &no_req()), Duration::from_secs(90));
    }

    #[test]
    fn test_ttl_expired_expires_is_zero() {
        let m = default_manager();
        let h = headers(&[
            ("Date", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ("Expires", "Wed, 21 Oct 2015 07:00:00 GMT"),
        ]);
        assert_eq!(m.ttl_for(&h, &no_req()), Duration::ZERO);
    }

    #[test]
    fn test_ttl_default_fallback() {
        let m = default_manager();
        assert_eq!(
            m.ttl_for(&headers(&[]), &no_req()),
            Duration::from_secs(constants::DEFAULT_CACHE_TTL_SECS)
        );
    }

    #[tokio::test]
    async fn test_lookup_hit_and_stale() {
        let m = default_manager();
        let req_headers = IndexMap::new();

        let fresh = m.build_entry(
            200,
            headers(&[("Cache-Control", "max-age=60")]),
            b"fresh".to_vec(),
            &req_headers,
            &no_req(),
        );
        m.store_entry("k-fresh", fresh).await;
        assert!(matches!(
            m.lookup("k-fresh", &req_headers).await,
            Lookup::Hit(_)
        ));

        let mut stale = m.build_entry(
            200,
            headers(&[]),
            b"stale".to_vec(),
            &req_headers,
            &no_req(),
        );
        stale.fresh_until = stale.stored_at.saturating_sub(10);
        stale.stored_at = stale.fresh_until;
        m.store_entry("k-stale", stale).await;
        assert!(matches!(
            m.lookup("k-stale", &req_headers).await,
            Lookup::Stale { swr: false, .. }
        ));

        assert!(matches!(m.lookup("k-missing", &req_headers).await, Lookup::Miss));
    }

    #[tokio::test]
    async fn test_lookup_swr_from_response_directive() {
        let m = default_manager();
        let req_headers = IndexMap::new();

        let now = unix_now();
        let entry = CachedEntry::new(
            200,
            headers(&[("Cache-Control", "max-age=1, stale-while-revalidate=120")]),
            b"x".to_vec(),
            now - 30,
            now - 29,
            None,
            None,
            BTreeMap::new(),
        );
        m.store_entry("k", entry).await;

        match m.lookup("k", &req_headers).await {
            Lookup::Stale { swr, .. } => assert!(swr),
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_vary_mismatch_is_miss() {
        let m = default_manager();

        let mut vary = BTreeMap::new();
        vary.insert("accept-language".to_string(), "en".to_string());
        let now = unix_now();
        let entry = CachedEntry::new(
            200,
            headers(&[]),
            b"en body".to_vec(),
            now,
            now + 60,
            None,
            None,
            vary,
        );
        m.store_entry("k", entry).await;

        let mut matching = IndexMap::new();
        matching.insert("Accept-Language".to_string(), "en".to_string());
        assert!(matches!(m.lookup("k", &matching).await, Lookup::Hit(_)));

        let mut mismatched = IndexMap::new();
        mismatched.insert("Accept-Language".to_string(), "de".to_string());
        assert!(matches!(m.lookup("k", &mismatched).await, Lookup::Miss));

        // Absent header also mismatches a recorded value
        assert!(matches!(m.lookup("k", &IndexMap::new()).await, Lookup::Miss));
    }

    #[test]
    fn test_conditional_headers() {
        let now = unix_now();
        let entry = CachedEntry::new(
            200,
            vec![],
            vec![],
            now,
            now,
            Some("\"v1\"".into()),
            Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
            BTreeMap::new(),
        );
        let conditionals = CacheManager::conditional_headers(&entry);
        assert_eq!(conditionals.len(), 2);
        assert_eq!(conditionals[0].0, constants::HEADER_IF_NONE_MATCH);
        assert_eq!(conditionals[0].1, "\"v1\"");
        assert_eq!(conditionals[1].0, constants::HEADER_IF_MODIFIED_SINCE);
    }

    #[test]
    fn test_merge_304_overlays_and_excludes() {
        let m = default_manager();
        let now = unix_now();
        let entry = CachedEntry::new(
            200,
            headers(&[
                ("Content-Type", "application/json"),
                ("Content-Length", "7"),
                ("X-Old", "1"),
            ]),
            b"payload".to_vec(),
            now - 100,
            now - 50,
            Some("\"v1\"".into()),
            None,
            BTreeMap::new(),
        );

        let merged = m.merge_304(
            &entry,
            &headers(&[
                ("Cache-Control", "max-age=60"),
                ("Content-Length", "0"),
                ("X-New", "2"),
            ]),
            &no_req(),
        );

        // Body survives byte-for-byte
        assert_eq!(merged.body, b"payload");
        // 304's Content-Length must not clobber the cached one
        assert_eq!(merged.header("Content-Length"), Some("7"));
        assert_eq!(merged.header("X-Old"), Some("1"));
        assert_eq!(merged.header("X-New"), Some("2"));
        // Freshness recomputed from the 304's max-age
        assert!(merged.fresh_until >= now + 59);
        assert_eq!(merged.etag, Some("\"v1\"".into()));
    }

    #[test]
    fn test_stale_if_error_window() {
        let config = CacheConfig {
            sie_window: Some(Duration::from_secs(300)),
            ..CacheConfig::default()
        };
        let m = manager(config);

        let now = unix_now();
        let recent = CachedEntry::new(
            200,
            vec![],
            vec![],
            now - 10,
            now - 5,
            None,
            None,
            BTreeMap::new(),
        );
        assert!(m.stale_if_error_usable(&recent));

        let ancient = CachedEntry::new(
            200,
            vec![],
            vec![],
            now - 10_000,
            now - 9_000,
            None,
            None,
            BTreeMap::new(),
        );
        assert!(!m.stale_if_error_usable(&ancient));
    }

    #[test]
    fn test_build_entry_captures_validators_and_vary() {
        let config = CacheConfig {
            key: CacheKeyConfig {
                vary_headers: vec!["Accept".to_string()],
                ..CacheKeyConfig::default()
            },
            ..CacheConfig::default()
        };
        let m = manager(config);

        let mut req_headers = IndexMap::new();
        req_headers.insert("Accept".to_string(), "application/json".to_string());
        req_headers.insert("Accept-Language".to_string(), "en".to_string());

        let entry = m.build_entry(
            200,
            headers(&[
                ("ETag", "\"v1\""),
                ("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
                ("Vary", "Accept-Language"),
                ("Cache-Control", "max-age=60"),
            ]),
            b"body".to_vec(),
            &req_headers,
            &no_req(),
        );

        assert_eq!(entry.etag, Some("\"v1\"".into()));
        assert!(entry.last_modified.is_some());
        // Configured axis plus the response's Vary names
        assert_eq!(entry.vary.get("accept").map(String::as_str), Some("application/json"));
        assert_eq!(entry.vary.get("accept-language").map(String::as_str), Some("en"));
        assert_eq!(entry.fresh_until, entry.stored_at + 60);
    }
}
