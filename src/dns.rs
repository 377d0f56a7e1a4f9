//! TTL-bounded DNS cache over the platform resolver.
//!
//! The cache refines pool keying and timing stats; it never overrides the
//! transport's own resolution. Failed lookups are cached with a shorter
//! TTL to bound failure storms.

use crate::error::Error;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Configuration for the resolver cache.
#[derive(Debug, Clone)]
pub struct DnsCacheConfig {
    /// How long successful resolutions stay cached
    pub ttl: Duration,
    /// How long failed resolutions stay cached
    pub negative_ttl: Duration,
}

impl Default for DnsCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            negative_ttl: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
enum CachedResolution {
    Addresses(Vec<IpAddr>),
    Failure(String),
}

#[derive(Debug)]
struct DnsEntry {
    resolution: CachedResolution,
    expires_at: Instant,
}

/// Process-global hostname → addresses cache.
#[derive(Debug)]
pub struct DnsCache {
    config: DnsCacheConfig,
    entries: Mutex<HashMap<String, DnsEntry>>,
}

static GLOBAL: Lazy<DnsCache> = Lazy::new(|| DnsCache::new(DnsCacheConfig::default()));

/// The process-global cache shared by all handlers.
#[must_use]
pub fn global() -> &'static DnsCache {
    &GLOBAL
}

impl DnsCache {
    /// Create a cache with the given TTLs.
    #[must_use]
    pub fn new(config: DnsCacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `host`, consulting the cache first.
    ///
    /// A cached failure is replayed as an error until its (shorter) TTL
    /// lapses.
    ///
    /// # Errors
    ///
    /// Returns a `NetworkError`-kind failure when resolution yields no
    /// addresses.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Error> {
        if let Some(cached) = self.cached(host) {
            return match cached {
                CachedResolution::Addresses(addrs) => {
                    trace!(host, "dns cache hit");
                    Ok(addrs)
                }
                CachedResolution::Failure(reason) => Err(Error::dns(host, reason)),
            };
        }

        // Port 0 satisfies lookup_host's addr:port form; only the host part
        // drives resolution.
        match tokio::net::lookup_host((host, 0)).await {
            Ok(addrs) => {
                let addrs: Vec<IpAddr> = addrs.map(|sa| sa.ip()).collect();
                if addrs.is_empty() {
                    let reason = "no addresses returned".to_string();
                    self.insert_failure(host, &reason);
                    return Err(Error::dns(host, reason));
                }
                debug!(host, count = addrs.len(), "dns resolved");
                self.insert_addresses(host, addrs.clone());
                Ok(addrs)
            }
            Err(e) => {
                let reason = e.to_string();
                self.insert_failure(host, &reason);
                Err(Error::dns(host, reason))
            }
        }
    }

    /// Resolve `host` and return the first address.
    ///
    /// # Errors
    ///
    /// Returns a `NetworkError`-kind failure when resolution fails.
    pub async fn resolve_first(&self, host: &str) -> Result<IpAddr, Error> {
        let addrs = self.resolve(host).await?;
        addrs
            .into_iter()
            .next()
            .ok_or_else(|| Error::dns(host, "no addresses returned"))
    }

    /// Evict one host, or everything when `host` is `None`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self, host: Option<&str>) {
        let mut entries = self.entries.lock().unwrap();
        match host {
            Some(host) => {
                entries.remove(host);
            }
            None => entries.clear(),
        }
    }

    /// Number of live (unexpired) entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether the cache holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seed an entry directly. Test hook; also used by warmup paths.
    pub fn seed(&self, host: &str, addrs: Vec<IpAddr>) {
        self.insert_addresses(host, addrs);
    }

    fn cached(&self, host: &str) -> Option<CachedResolution> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(host) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.resolution.clone()),
            Some(_) => {
                entries.remove(host);
                None
            }
            None => None,
        }
    }

    fn insert_addresses(&self, host: &str, addrs: Vec<IpAddr>) {
        self.entries.lock().unwrap().insert(
            host.to_string(),
            DnsEntry {
                resolution: CachedResolution::Addresses(addrs),
                expires_at: Instant::now() + self.config.ttl,
            },
        );
    }

    fn insert_failure(&self, host: &str, reason: &str) {
        self.entries.lock().unwrap().insert(
            host.to_string(),
            DnsEntry {
                resolution: CachedResolution::Failure(reason.to_string()),
                expires_at: Instant::now() + self.config.negative_ttl,
            },
        );
    }
}
