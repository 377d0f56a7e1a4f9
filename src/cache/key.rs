//! Deterministic cache-key generation.
//!
//! The key is a SHA-256 digest over a canonical byte sequence: uppercased
//! method, scheme, lowercased host, effective port, normalized path, query
//! parameters sorted by key then value, then each configured vary header
//! present on the request (lowercased name and value). Unsafe methods may
//! opt their body hash into the key with `cache_body`.

use crate::options::Body;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use url::Url;

/// Configuration for key derivation.
#[derive(Debug, Clone)]
pub struct CacheKeyConfig {
    /// Prefix prepended to every key, derived or explicit
    pub prefix: String,
    /// Request headers that participate in the key when present
    pub vary_headers: Vec<String>,
    /// Hash the request body into the key for unsafe methods.
    ///
    /// Two requests that differ only in a header outside `vary_headers`
    /// will still collide; callers enabling this own that trade-off.
    pub cache_body: bool,
}

impl Default for CacheKeyConfig {
    fn default() -> Self {
        Self {
            prefix: crate::constants::DEFAULT_KEY_PREFIX.to_string(),
            vary_headers: Vec::new(),
            cache_body: false,
        }
    }
}

/// Derive the cache key for a request.
///
/// A caller-supplied `explicit` key replaces the derived digest verbatim,
/// still carrying the configured prefix. The function is pure: equal inputs
/// produce equal keys.
#[must_use]
pub fn generate(
    config: &CacheKeyConfig,
    method: &str,
    url: &Url,
    headers: &IndexMap<String, String>,
    body: &Body,
    explicit: Option<&str>,
) -> String {
    if let Some(key) = explicit {
        return format!("{}:{key}", config.prefix);
    }

    let mut hasher = Sha256::new();

    hasher.update(method.to_uppercase().as_bytes());
    hasher.update([0]);
    hasher.update(url.scheme().as_bytes());
    hasher.update([0]);
    hasher.update(url.host_str().unwrap_or_default().to_lowercase().as_bytes());
    hasher.update([0]);
    hasher.update(url.port_or_known_default().unwrap_or(0).to_be_bytes());
    hasher.update(url.path().as_bytes());
    hasher.update([0]);

    // Query parameters sorted lexicographically by key, then value
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    for (k, v) in &pairs {
        hasher.update(k.as_bytes());
        hasher.update([b'=']);
        hasher.update(v.as_bytes());
        hasher.update([b'&']);
    }

    // Configured vary headers present on the request, lowercased name+value
    for vary in &config.vary_headers {
        if let Some(value) = crate::options::get_header(headers, vary) {
            hasher.update(vary.to_lowercase().as_bytes());
            hasher.update([b':']);
            hasher.update(value.as_bytes());
            hasher.update([0]);
        }
    }

    if config.cache_body {
        if let Some(bytes) = body.hashable_bytes() {
            hasher.update(Sha256::digest(&bytes));
        }
    }

    let digest = hasher.finalize();
    format!("{}:{digest:x}", config.prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn headers(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_key_is_pure() {
        let config = CacheKeyConfig::default();
        let u = url("https://api.example.com/users?b=2&a=1");
        let h = headers(&[]);
        let k1 = generate(&config, "GET", &u, &h, &Body::None, None);
        let k2 = generate(&config, "GET", &u, &h, &Body::None, None);
        assert_eq!(k1, k2);
        assert!(k1.starts_with("courier:"));
    }

    #[test]
    fn test_query_order_does_not_matter() {
        let config = CacheKeyConfig::default();
        let h = headers(&[]);
        let k1 = generate(
            &config,
            "GET",
            &url("https://api.example.com/u?a=1&b=2"),
            &h,
            &Body::None,
            None,
        );
        let k2 = generate(
            &config,
            "GET",
            &url("https://api.example.com/u?b=2&a=1"),
            &h,
            &Body::None,
            None,
        );
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_method_case_does_not_matter() {
        let config = CacheKeyConfig::default();
        let u = url("https://api.example.com/u");
        let h = headers(&[]);
        assert_eq!(
            generate(&config, "get", &u, &h, &Body::None, None),
            generate(&config, "GET", &u, &h, &Body::None, None)
        );
    }

    #[test]
    fn test_host_case_and_default_port_do_not_matter() {
        let config = CacheKeyConfig::default();
        let h = headers(&[]);
        assert_eq!(
            generate(
                &config,
                "GET",
                &url("https://API.Example.com/u"),
                &h,
                &Body::None,
                None
            ),
            generate(
                &config,
                "GET",
                &url("https://api.example.com:443/u"),
                &h,
                &Body::None,
                None
            )
        );
    }

    #[test]
    fn test_different_paths_differ() {
        let config = CacheKeyConfig::default();
        let h = headers(&[]);
        assert_ne!(
            generate(
                &config,
                "GET",
                &url("https://api.example.com/a"),
                &h,
                &Body::None,
                None
            ),
            generate(
                &config,
                "GET",
                &url("https://api.example.com/b"),
                &h,
                &Body::None,
                None
            )
        );
    }

    #[test]
    fn test_vary_header_participates_when_configured() {
        let config = CacheKeyConfig {
            vary_headers: vec!["Accept-Language".to_string()],
            ..CacheKeyConfig::default()
        };
        let u = url("https://api.example.com/u");
        let k_en = generate(
            &config,
            "GET",
            &u,
            &headers(&[("Accept-Language", "en")]),
            &Body::None,
            None,
        );
        let k_de = generate(
            &config,
            "GET",
            &u,
            &headers(&[("accept-language", "de")]),
            &Body::None,
            None,
        );
        let k_absent = generate(&config, "GET", &u, &headers(&[]), &Body::None, None);
        assert_ne!(k_en, k_de);
        assert_ne!(k_en, k_absent);
    }

    #[test]
    fn test_unconfigured_header_does_not_participate() {
        let config = CacheKeyConfig::default();
        let u = url("https://api.example.com/u");
        assert_eq!(
            generate(
                &config,
                "GET",
                &u,
                &headers(&[("X-Anything", "1")]),
                &Body::None,
                None
            ),
            generate(&config, "GET", &u, &headers(&[]), &Body::None, None)
        );
    }

    #[test]
    fn test_body_hash_only_with_cache_body() {
        let u = url("https://api.example.com/u");
        let h = headers(&[]);
        let body = Body::Json(json!({"a": 1}));

        let without = CacheKeyConfig::default();
        assert_eq!(
            generate(&without, "POST", &u, &h, &body, None),
            generate(&without, "POST", &u, &h, &Body::None, None)
        );

        let with = CacheKeyConfig {
            cache_body: true,
            ..CacheKeyConfig::default()
        };
        assert_ne!(
            generate(&with, "POST", &u, &h, &body, None),
            generate(&with, "POST", &u, &h, &Body::None, None)
        );
    }

    #[test]
    fn test_explicit_key_replaces_digest() {
        let config = CacheKeyConfig::default();
        let u = url("https://api.example.com/u");
        let k = generate(
            &config,
            "GET",
            &u,
            &headers(&[]),
            &Body::None,
            Some("my-key"),
        );
        assert_eq!(k, "courier:my-key");
    }
}
