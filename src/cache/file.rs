//! Filesystem cache store.
//!
//! Each entry lives in its own JSON file named by the cache key digest.
//! Durability rules the store enforces itself:
//!
//! - A reader never observes a half-written entry: new content lands
//!   under a staging name in the same directory and moves into place with
//!   a rename, which is atomic on the same filesystem.
//! - Mutations take a store-wide advisory lock (`fs2`), so several
//!   courier processes sharing one cache directory serialize their writes
//!   and pruning passes. The lock is advisory only; it cannot stop
//!   non-cooperating processes.
//!
//! A byte-bounded store prunes least-recently-stored entries after each
//! write.

use super::{CacheStore, CachedEntry, StoreStats};
use crate::constants;
use crate::error::Error;
use async_trait::async_trait;
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Lock file coordinating mutations across processes.
const STORE_LOCK_NAME: &str = ".store.lock";

/// Configuration for the file-backed store.
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Directory where entry files are stored
    pub cache_dir: PathBuf,
    /// Total bytes of entry files to keep; pruning applies after writes
    pub max_bytes: u64,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache/http"),
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// File-per-entry cache store.
#[derive(Debug)]
pub struct FileStore {
    config: FileStoreConfig,
}

/// Held for the duration of a mutation; dropping the file releases the
/// `fs2` lock.
struct StoreGuard {
    _lock_file: std::fs::File,
}

/// Write `bytes` to `path` without ever exposing a partial file.
///
/// The staging name combines the process id with a process-wide counter,
/// so concurrent writers (even to the same entry) never collide on the
/// staging file; the last rename wins with one complete payload.
async fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map_or_else(|| "entry".to_string(), |n| n.to_string_lossy().into_owned());
    let staging = path.with_file_name(format!(
        ".{file_name}.{pid}-{seq}.staging",
        pid = std::process::id()
    ));

    tokio::fs::write(&staging, bytes).await?;
    if let Err(rename_error) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(rename_error);
    }
    Ok(())
}

impl FileStore {
    /// Creates a store rooted at the configured directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new(config: FileStoreConfig) -> Result<Self, Error> {
        std::fs::create_dir_all(&config.cache_dir).map_err(|e| {
            Error::cache_storage(format!(
                "failed to create cache directory '{}': {e}",
                config.cache_dir.display()
            ))
        })?;
        Ok(Self { config })
    }

    /// Convenience constructor with default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        Self::new(FileStoreConfig {
            cache_dir: dir.into(),
            ..FileStoreConfig::default()
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.config.cache_dir.join(file_name_for(key))
    }

    /// Take the store-wide advisory lock, blocking on a worker thread
    /// until it is free.
    async fn lock_store(&self) -> Result<StoreGuard, Error> {
        let lock_path = self.config.cache_dir.join(STORE_LOCK_NAME);
        let guard = tokio::task::spawn_blocking(move || -> std::io::Result<StoreGuard> {
            let lock_file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            lock_file.lock_exclusive()?;
            Ok(StoreGuard {
                _lock_file: lock_file,
            })
        })
        .await
        .map_err(|e| Error::cache_storage(format!("lock task failed: {e}")))?
        .map_err(|e| Error::cache_storage(format!("failed to lock cache directory: {e}")))?;
        Ok(guard)
    }

    /// Prune least-recently-stored entries until total bytes fit the limit.
    async fn prune_to_limit(&self) -> Result<(), Error> {
        let mut files: Vec<(PathBuf, u64, u64)> = Vec::new(); // (path, size, stored_at)
        let mut dir = tokio::fs::read_dir(&self.config.cache_dir)
            .await
            .map_err(|e| Error::cache_storage(format!("failed to read cache directory: {e}")))?;

        while let Some(found) = dir
            .next_entry()
            .await
            .map_err(|e| Error::cache_storage(format!("failed to read cache directory: {e}")))?
        {
            let name = found.file_name();
            if !name.to_string_lossy().ends_with(constants::CACHE_FILE_SUFFIX) {
                continue;
            }
            let Ok(metadata) = found.metadata().await else {
                continue;
            };
            let stored_at = read_stored_at(&found.path()).await.unwrap_or(0);
            files.push((found.path(), metadata.len(), stored_at));
        }

        let mut total: u64 = files.iter().map(|(_, size, _)| size).sum();
        if total <= self.config.max_bytes {
            return Ok(());
        }

        files.sort_by_key(|(_, _, stored_at)| *stored_at);
        for (path, size, _) in files {
            if total <= self.config.max_bytes {
                break;
            }
            if tokio::fs::remove_file(&path).await.is_ok() {
                debug!(path = %path.display(), "pruned cache file over byte limit");
                total = total.saturating_sub(size);
            }
        }
        Ok(())
    }
}

/// Map a cache key to a safe file name.
fn file_name_for(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{safe}{}", constants::CACHE_FILE_SUFFIX)
}

/// Read only the `stored_at` field of an entry file, for pruning order.
async fn read_stored_at(path: &Path) -> Option<u64> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    let entry: CachedEntry = serde_json::from_str(&content).ok()?;
    Some(entry.stored_at)
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>, Error> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::cache_storage(format!("failed to read cache file: {e}")))?;

        match serde_json::from_str::<CachedEntry>(&content) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // A corrupt file is a miss; drop it so it cannot wedge the key
                warn!(path = %path.display(), error = %e, "removing corrupt cache file");
                let _ = tokio::fs::remove_file(&path).await;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: CachedEntry) -> Result<(), Error> {
        let path = self.entry_path(key);
        let content = serde_json::to_string_pretty(&entry)
            .map_err(|e| Error::cache_storage(format!("failed to serialize cache entry: {e}")))?;

        let _guard = self.lock_store().await?;

        replace_file(&path, content.as_bytes())
            .await
            .map_err(|e| Error::cache_storage(format!("failed to write cache file: {e}")))?;

        self.prune_to_limit().await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::cache_storage(format!(
                "failed to remove cache file: {e}"
            ))),
        }
    }

    async fn clear(&self) -> Result<(), Error> {
        let _guard = self.lock_store().await?;

        let mut dir = tokio::fs::read_dir(&self.config.cache_dir)
            .await
            .map_err(|e| Error::cache_storage(format!("failed to read cache directory: {e}")))?;

        while let Some(found) = dir
            .next_entry()
            .await
            .map_err(|e| Error::cache_storage(format!("failed to read cache directory: {e}")))?
        {
            if found
                .file_name()
                .to_string_lossy()
                .ends_with(constants::CACHE_FILE_SUFFIX)
            {
                let _ = tokio::fs::remove_file(found.path()).await;
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, Error> {
        let mut stats = StoreStats::default();
        let now = super::unix_now();

        let mut dir = tokio::fs::read_dir(&self.config.cache_dir)
            .await
            .map_err(|e| Error::cache_storage(format!("failed to read cache directory: {e}")))?;

        while let Some(found) = dir
            .next_entry()
            .await
            .map_err(|e| Error::cache_storage(format!("failed to read cache directory: {e}")))?
        {
            if !found
                .file_name()
                .to_string_lossy()
                .ends_with(constants::CACHE_FILE_SUFFIX)
            {
                continue;
            }

            stats.total_entries += 1;
            if let Ok(metadata) = found.metadata().await {
                stats.total_size_bytes += metadata.len();
            }

            let Ok(content) = tokio::fs::read_to_string(found.path()).await else {
                continue;
            };
            let Ok(entry) = serde_json::from_str::<CachedEntry>(&content) else {
                continue;
            };
            if entry.is_fresh(now) {
                stats.valid_entries += 1;
            } else {
                stats.expired_entries += 1;
            }
        }
        Ok(stats)
    }
}
