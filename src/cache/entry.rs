//! The stored representation of a cached exchange.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// A cached response entry.
///
/// `fresh_until >= stored_at` always holds; construction clamps. The `vary`
/// snapshot captures the request-header values that were live at store time
/// for the configured vary axis, so later lookups can reject mismatched
/// variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedEntry {
    /// HTTP status of the stored response
    pub status: u16,
    /// Response headers as a multimap; serialized as `{name: [values]}`
    #[serde(with = "headers_map")]
    pub headers: Vec<(String, Vec<String>)>,
    /// Response body bytes, base64 in the file representation
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    /// Unix seconds at store time
    pub stored_at: u64,
    /// Unix seconds until which the entry may be served without revalidation
    pub fresh_until: u64,
    /// Validator for `If-None-Match`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Validator for `If-Modified-Since`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Request-header values captured at store time under the vary axis
    #[serde(default)]
    pub vary: BTreeMap<String, String>,
}

impl CachedEntry {
    /// Build an entry, clamping `fresh_until` to `stored_at` when the
    /// derived freshness would precede the store time.
    #[must_use]
    pub fn new(
        status: u16,
        headers: Vec<(String, Vec<String>)>,
        body: Vec<u8>,
        stored_at: u64,
        fresh_until: u64,
        etag: Option<String>,
        last_modified: Option<String>,
        vary: BTreeMap<String, String>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at,
            fresh_until: fresh_until.max(stored_at),
            etag,
            last_modified,
            vary,
        }
    }

    /// Whether the entry may be served without revalidation at `now`.
    #[must_use]
    pub const fn is_fresh(&self, now: u64) -> bool {
        now <= self.fresh_until
    }

    /// Seconds the entry has been stale at `now`; zero while fresh.
    #[must_use]
    pub const fn stale_for(&self, now: u64) -> u64 {
        if now > self.fresh_until {
            now - self.fresh_until
        } else {
            0
        }
    }

    /// First value of a stored response header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// Whether the entry carries any validator usable for a conditional
    /// request.
    #[must_use]
    pub const fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }

    /// Approximate in-memory size, used by byte-bounded stores.
    #[must_use]
    pub fn weight(&self) -> u64 {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(k, vs)| k.len() + vs.iter().map(String::len).sum::<usize>())
            .sum();
        (self.body.len() + header_bytes) as u64
    }
}

mod headers_map {
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        headers: &[(String, Vec<String>)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let map: IndexMap<&str, &Vec<String>> = headers
            .iter()
            .map(|(name, values)| (name.as_str(), values))
            .collect();
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, Vec<String>)>, D::Error> {
        let map = IndexMap::<String, Vec<String>>::deserialize(deserializer)?;
        Ok(map.into_iter().collect())
    }
}

mod body_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
