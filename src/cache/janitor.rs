//! Stale cache cleanup
//!
//! Walks a cache tree deleting data files older than a caller-supplied max
//! age, then removes directories left empty. Individual delete failures are
//! logged and skipped so one bad entry never blocks the rest of the sweep;
//! a directory that cannot be listed aborts the walk because nothing past
//! it can be visited. Runs inside the housekeeping background job.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;

use super::store::{entry_age, CacheError};

/// File extensions the janitor is allowed to delete
///
/// Everything else under the cache root (the icon queue, PID files, the
/// last-request timestamp) is never touched by the sweep.
const CACHED_EXTENSIONS: [&str; 2] = ["json", "png"];

/// Empty directories younger than this are kept; an in-flight job may
/// still be populating them
const EMPTY_DIR_GRACE: Duration = Duration::from_secs(72 * 3600);

/// Removes stale cache files and abandoned empty directories under `root`
///
/// `max_age` is evaluated once per file, so callers can supply a closure
/// with jitter to spread deletions across housekeeping runs. The root
/// directory itself is never removed.
pub fn clean(root: &Path, max_age: impl Fn() -> Duration) -> Result<(), CacheError> {
    clean_files(root, &max_age)?;
    clean_dirs(root, EMPTY_DIR_GRACE)
}

/// Returns a max-age closure spread over `window` below `base`
///
/// Each evaluation yields a value in `[base - window, base)`, clamped at
/// zero, so a large batch of same-aged icons is deleted across several
/// housekeeping runs instead of all at once.
pub fn jittered(base: Duration, window: Duration) -> impl Fn() -> Duration {
    move || {
        if window.is_zero() {
            return base;
        }
        let slice = rand::thread_rng().gen_range(Duration::ZERO..window);
        base.saturating_sub(window) + slice
    }
}

/// Recursively deletes cached files older than `max_age()`
fn clean_files(dir: &Path, max_age: &impl Fn() -> Duration) -> Result<(), CacheError> {
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        if path.is_dir() {
            clean_files(&path, max_age)?;
        } else if is_cached_file(&path) {
            let stale = entry_age(&path).is_some_and(|age| age > max_age());
            if !stale {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(file = %path.display(), "removed stale cache file"),
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "failed to remove stale file")
                }
            }
        }
    }
    Ok(())
}

/// Deletes empty directories older than `grace`, deepest first
fn clean_dirs(root: &Path, grace: Duration) -> Result<(), CacheError> {
    let mut dirs = Vec::new();
    collect_dirs(root, &mut dirs)?;
    // Reverse order visits children before their parents, so a chain of
    // newly emptied directories collapses in a single pass.
    dirs.sort();
    dirs.reverse();

    for dir in dirs {
        let old_enough = entry_age(&dir).is_some_and(|age| age > grace);
        if !old_enough {
            continue;
        }
        match fs::read_dir(&dir) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    match fs::remove_dir(&dir) {
                        Ok(()) => tracing::debug!(dir = %dir.display(), "removed empty directory"),
                        Err(err) => {
                            tracing::warn!(dir = %dir.display(), error = %err, "failed to remove directory")
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "failed to re-list directory")
            }
        }
    }
    Ok(())
}

/// Collects every directory below `root`, excluding `root` itself
fn collect_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CacheError> {
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            out.push(path.clone());
            collect_dirs(&path, out)?;
        }
    }
    Ok(())
}

/// Whether the file carries an extension the janitor may delete
fn is_cached_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CACHED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
