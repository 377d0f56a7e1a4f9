//! In-memory LRU cache store.

use super::{CacheStore, CachedEntry, StoreStats};
use crate::error::Error;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Mutex;
use tracing::trace;

/// A bounded in-memory store with least-recently-used eviction.
///
/// Recency is tracked on both reads and writes: a `get` moves the entry to
/// the back of the map, and eviction pops from the front.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<IndexMap<String, CachedEntry>>,
    max_entries: usize,
}

impl MemoryStore {
    /// Create a store bounded to `max_entries` entries.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Current number of entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>, Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::cache_storage("memory store lock poisoned"))?;

        // Refresh recency by moving the entry to the back
        if let Some(entry) = entries.shift_remove(key) {
            entries.insert(key.to_string(), entry.clone());
            return Ok(Some(entry));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, entry: CachedEntry) -> Result<(), Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::cache_storage("memory store lock poisoned"))?;

        entries.shift_remove(key);
        entries.insert(key.to_string(), entry);

        while entries.len() > self.max_entries {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                trace!(key = %evicted, "evicted LRU cache entry");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries
            .lock()
            .map_err(|_| Error::cache_storage("memory store lock poisoned"))?
            .shift_remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.entries
            .lock()
            .map_err(|_| Error::cache_storage("memory store lock poisoned"))?
            .clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, Error> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::cache_storage("memory store lock poisoned"))?;

        let now = super::unix_now();
        let mut stats = StoreStats {
            total_entries: entries.len(),
            ..StoreStats::default()
        };
        for entry in entries.values() {
            if entry.is_fresh(now) {
                stats.valid_entries += 1;
            } else {
                stats.expired_entries += 1;
            }
            stats.total_size_bytes += entry.weight();
        }
        Ok(stats)
    }
}
