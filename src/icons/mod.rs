//! Cover icon cache and download queue
//!
//! Result lists render a cover icon per book when one is cached locally.
//! Covers that are missing get queued during the interactive run and the
//! queue is flushed to disk on exit, where a detached background job
//! picks it up. The interactive path never waits on an image download.

pub mod worker;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cache::store::write_atomic;
use crate::cache::{CacheKey, ICONS, PNG_EXT};

/// Queue file name, inside the icons class directory
pub const QUEUE_FILE: &str = "queue.txt";

/// Workflow-relative path of the bundled placeholder icon, shown while a
/// cover is still downloading
pub const PLACEHOLDER: &str = "icons/book.png";

/// Error types for the icon cache and its download workers
#[derive(Debug, Error)]
pub enum IconError {
    /// Reading or writing icon files failed
    #[error("icon file I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A cover download could not be made or failed in flight
    #[error("cover download failed: {0}")]
    Download(#[from] reqwest::Error),

    /// The downloaded bytes were not a decodable image
    #[error("cover image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    /// The image host answered with a non-success status code
    #[error("cover download for book {id} returned {status}")]
    Status { id: u64, status: reqwest::StatusCode },
}

/// One queued cover download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedIcon {
    pub id: u64,
    pub url: String,
}

/// Deduplicated queue of covers to download
///
/// The on-disk queue file is the only durable hand-off between
/// invocations. Loading the queue also clears the file, so whichever
/// process opens the cache owns the entries it found there.
#[derive(Debug)]
pub struct IconCache {
    root: PathBuf,
    queue: Vec<QueuedIcon>,
    seen: HashSet<u64>,
}

impl IconCache {
    /// Opens the icon cache under `cache_root`, taking over any queue
    /// entries persisted by earlier invocations
    pub fn open(cache_root: &Path) -> Result<Self, IconError> {
        let mut cache = Self {
            root: cache_root.to_path_buf(),
            queue: Vec::new(),
            seen: HashSet::new(),
        };
        cache.load_queue()?;
        Ok(cache)
    }

    /// Path of the cached cover PNG for a book
    pub fn icon_path(&self, id: u64) -> PathBuf {
        self.root.join(CacheKey::numeric(ICONS, id, PNG_EXT).as_path())
    }

    /// Returns the icon path to render for a book, queueing a download
    /// and falling back to the placeholder when the cover is not cached
    pub fn display_icon(&mut self, id: u64, image_url: &str) -> PathBuf {
        let path = self.icon_path(id);
        if path.exists() {
            return path;
        }
        self.add(id, image_url);
        PathBuf::from(PLACEHOLDER)
    }

    /// Queues a cover download unless it would be redundant
    ///
    /// Skips books already seen this run, books whose cover is already
    /// cached, and placeholder URLs. Real covers are always JPEG; the
    /// catalog substitutes a fixed PNG when it has no art for a book.
    pub fn add(&mut self, id: u64, url: &str) {
        if self.seen.contains(&id) || url.is_empty() || is_placeholder(url) {
            return;
        }
        if self.icon_path(id).exists() {
            return;
        }
        self.seen.insert(id);
        self.queue.push(QueuedIcon {
            id,
            url: url.to_string(),
        });
    }

    /// Whether any downloads are waiting
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Writes the in-memory queue to the queue file, replacing previous
    /// contents, then clears the in-memory list
    ///
    /// Calling with an empty queue writes nothing.
    pub fn flush(&mut self) -> Result<(), IconError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let mut contents = String::new();
        for entry in &self.queue {
            contents.push_str(&format!("{}\t{}\n", entry.id, entry.url));
        }
        write_atomic(&self.queue_path(), contents.as_bytes())?;
        tracing::debug!(entries = self.queue.len(), "icon queue flushed");
        self.queue.clear();
        Ok(())
    }

    pub(crate) fn take_queue(&mut self) -> Vec<QueuedIcon> {
        std::mem::take(&mut self.queue)
    }

    fn queue_path(&self) -> PathBuf {
        self.root.join(ICONS).join(QUEUE_FILE)
    }

    /// Loads queued entries from disk and clears the file, so no second
    /// process can pick up the same entries
    fn load_queue(&mut self) -> Result<(), IconError> {
        let path = self.queue_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(entry) => {
                    if self.seen.insert(entry.id) {
                        self.queue.push(entry);
                    }
                }
                None => tracing::warn!(line, "skipping malformed queue entry"),
            }
        }

        if !contents.is_empty() {
            write_atomic(&path, b"")?;
        }
        Ok(())
    }
}

fn parse_line(line: &str) -> Option<QueuedIcon> {
    let mut fields = line.splitn(2, '\t');
    let id = fields.next()?.trim().parse().ok()?;
    let url = fields.next()?.trim();
    if url.is_empty() {
        return None;
    }
    Some(QueuedIcon {
        id,
        url: url.to_string(),
    })
}

/// Whether the URL points at the catalog's "no cover" placeholder image
fn is_placeholder(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or("");
    path.to_ascii_lowercase().ends_with(".png")
}
