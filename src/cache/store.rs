//! Filesystem cache store with mtime-based freshness
//!
//! Provides a `CacheStore` that persists serializable values as JSON files
//! at key-derived paths. A file's modification time is its freshness
//! timestamp; callers supply a max age per lookup, so different data
//! classes can expire on independent schedules. Stale entries are kept on
//! disk until a reload succeeds, supporting stale-while-revalidate reads.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::key::CacheKey;

/// Errors that can occur while reading or writing cache entries
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Cached value could not be encoded or decoded
    #[error("cache entry could not be encoded or decoded: {0}")]
    Serde(#[from] serde_json::Error),

    /// No platform cache directory could be determined
    #[error("no cache directory could be determined for this platform")]
    NoCacheDir,
}

/// Reads and writes cached values under a single root directory
///
/// Writes go through a temporary file in the destination directory followed
/// by a rename, so a reader racing a writer sees either the old complete
/// file or the new complete file, never a partially written one.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory all cache entries live under
    root: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/booksearch/` on Linux, or the equivalent path on
    /// other platforms.
    pub fn new() -> Result<Self, CacheError> {
        let project_dirs = ProjectDirs::from("", "", "booksearch").ok_or(CacheError::NoCacheDir)?;
        Ok(Self {
            root: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a store rooted at a custom directory
    ///
    /// Used by tests and by the `BOOKSEARCH_CACHE_DIR` override.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// The directory all cache entries live under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the absolute path for a key
    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_path())
    }

    /// Creates the given class directories under the root
    ///
    /// Called once at startup; failure here means no useful work is
    /// possible, so callers treat it as fatal.
    pub fn ensure_layout(&self, classes: &[&str]) -> Result<(), CacheError> {
        for class in classes {
            fs::create_dir_all(self.root.join(class))?;
        }
        Ok(())
    }

    /// Whether an entry exists for the key, fresh or not
    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path(key).exists()
    }

    /// Whether the entry is missing or older than `max_age`
    ///
    /// An entry whose age equals `max_age` exactly is still fresh.
    pub fn expired(&self, key: &CacheKey, max_age: Duration) -> bool {
        match entry_age(&self.path(key)) {
            Some(age) => is_stale(age, max_age),
            None => true,
        }
    }

    /// Reads and deserializes the entry regardless of freshness
    pub fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<T, CacheError> {
        let content = fs::read_to_string(self.path(key))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Serializes the value and writes it atomically, creating parent
    /// directories as needed
    pub fn write<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(value)?;
        write_atomic(&self.path(key), json.as_bytes())?;
        Ok(())
    }

    /// Returns the cached value when fresh, otherwise reloads and stores it
    ///
    /// A fresh entry is returned without invoking `reload`. On expiry or
    /// miss, `reload` performs the remote fetch; its result is written back
    /// atomically before being returned. A `reload` failure propagates
    /// without touching the existing file, so stale data survives for the
    /// next attempt.
    ///
    /// # Arguments
    /// * `key` - Cache key for the entry
    /// * `max_age` - Freshness threshold for this data class
    /// * `reload` - Fallible async producer of the current value
    pub async fn load_or_store<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        max_age: Duration,
        reload: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.expired(key, max_age) {
            match self.read(key) {
                Ok(value) => {
                    tracing::debug!(key = %key, "cache hit");
                    return Ok(value);
                }
                // An unreadable entry is treated as a miss; the reload
                // below overwrites it.
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "unreadable cache entry, reloading")
                }
            }
        }

        let value = reload().await?;
        self.write(key, &value).map_err(E::from)?;
        tracing::debug!(key = %key, "cache entry refreshed");
        Ok(value)
    }
}

/// Age of the file at `path`, or `None` when it is missing or unreadable
pub(crate) fn entry_age(path: &Path) -> Option<Duration> {
    let mtime = fs::metadata(path).ok()?.modified().ok()?;
    // An mtime in the future (clock adjustment) counts as brand new.
    Some(SystemTime::now().duration_since(mtime).unwrap_or(Duration::ZERO))
}

/// Whether an entry of the given age has outlived `max_age`
///
/// Strictly greater: an age equal to the max is not yet stale.
fn is_stale(age: Duration, max_age: Duration) -> bool {
    age > max_age
}

/// Writes `bytes` to `path` via a temp file in the same directory plus an
/// atomic rename, creating parent directories as needed
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
