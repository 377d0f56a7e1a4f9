//! HTTP response caching: keys, directives, storage backends and policy.
//!
//! Storage ([`CacheStore`]) is separated from policy ([`manager::CacheManager`]):
//! stores move entries in and out of a backend, the manager decides
//! cacheability, freshness, revalidation and merging. Stores are required to
//! be safe for concurrent `get`/`set`/`delete`.

pub mod control;
pub mod entry;
pub mod file;
pub mod key;
pub mod manager;
pub mod memory;

pub use control::CacheControl;
pub use entry::{unix_now, CachedEntry};
pub use file::FileStore;
pub use key::CacheKeyConfig;
pub use manager::{CacheConfig, CacheManager, Lookup};
pub use memory::MemoryStore;

use crate::error::Error;
use async_trait::async_trait;

/// Aggregate statistics over a store's current contents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of cache entries
    pub total_entries: usize,
    /// Number of valid (non-expired) entries
    pub valid_entries: usize,
    /// Number of expired entries
    pub expired_entries: usize,
    /// Total size of cached bodies and headers in bytes
    pub total_size_bytes: u64,
}

/// Storage interface for cached entries.
///
/// Implementations own their entries and must tolerate concurrent calls.
/// Backend failures are reported as `CacheStorage`-kind errors; the policy
/// layer recovers them by degrading to uncached behavior.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the entry for `key`, if present.
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>, Error>;

    /// Insert or replace the entry for `key`.
    async fn set(&self, key: &str, entry: CachedEntry) -> Result<(), Error>;

    /// Remove the entry for `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), Error>;

    /// Aggregate statistics over current contents.
    async fn stats(&self) -> Result<StoreStats, Error>;
}
