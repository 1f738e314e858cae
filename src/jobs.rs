//! Background job launching
//!
//! Slow work such as bibliography fetches, icon downloads and cache
//! cleanup runs in detached re-invocations of this executable, so the
//! interactive path stays fast. Each job name is a singleton: a PID file
//! under the cache root marks a running job, and files older than a stale
//! timeout are ignored so a crashed job cannot block its name forever.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;

use crate::cache::store::{entry_age, write_atomic};

/// Directory holding PID files, directly under the cache root
pub const JOBS_DIR: &str = "jobs";

/// PID files older than this belong to crashed jobs and are ignored
const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Job name for author bibliography refreshes
pub const BOOKLIST: &str = "booklist";

/// Job name for icon queue draining
pub const ICONS: &str = "icons";

/// Job name for cache cleanup and the update check
pub const HOUSEKEEPING: &str = "housekeeping";

/// Job name for the shelf list refresh
pub const SHELVES: &str = "shelves";

/// Job name for a single shelf's refresh, unique per shelf
pub fn shelf_job(shelf: &str) -> String {
    format!("shelf-{shelf}")
}

/// Error types for job bookkeeping
#[derive(Debug, Error)]
pub enum JobError {
    /// PID file or process handling failed
    #[error("background job failed: {0}")]
    Io(#[from] io::Error),
}

/// Whether a live PID file exists for the job name
pub fn is_running(cache_root: &Path, name: &str) -> bool {
    is_live(&pid_path(cache_root, name), STALE_AFTER)
}

/// Launches a detached re-invocation of the current executable unless a
/// job with this name is already running
///
/// Returns as soon as the child is spawned. The child is expected to
/// acquire the [`JobGuard`] for `name` itself.
pub fn run(cache_root: &Path, name: &str, args: &[&str]) -> Result<(), JobError> {
    if is_running(cache_root, name) {
        tracing::debug!(job = name, "already running, not relaunching");
        return Ok(());
    }

    let exe = std::env::current_exe()?;
    let child = Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()?;
    tracing::info!(job = name, pid = child.id(), "background job launched");
    Ok(())
}

/// Marks a job as running for the lifetime of the value
///
/// Acquiring writes the PID file, dropping removes it. `None` means a
/// live job already holds this name and the caller should exit quietly.
#[derive(Debug)]
pub struct JobGuard {
    path: PathBuf,
}

impl JobGuard {
    pub fn acquire(cache_root: &Path, name: &str) -> Result<Option<Self>, JobError> {
        if is_running(cache_root, name) {
            return Ok(None);
        }
        let path = pid_path(cache_root, name);
        write_atomic(&path, format!("{}\n", std::process::id()).as_bytes())?;
        tracing::debug!(job = name, "job lock acquired");
        Ok(Some(Self { path }))
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::debug!(
                path = %self.path.display(),
                error = %err,
                "could not remove job pid file"
            );
        }
    }
}

fn is_live(path: &Path, stale_after: Duration) -> bool {
    match entry_age(path) {
        Some(age) => age <= stale_after,
        None => false,
    }
}

fn pid_path(cache_root: &Path, name: &str) -> PathBuf {
    cache_root.join(JOBS_DIR).join(format!("{name}.pid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_not_running_without_pid_file() {
        let dir = TempDir::new().unwrap();
        assert!(!is_running(dir.path(), BOOKLIST));
    }

    #[test]
    fn test_guard_creates_and_removes_pid_file() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(dir.path(), ICONS);

        let guard = JobGuard::acquire(dir.path(), ICONS).unwrap().unwrap();
        assert!(path.exists());
        assert!(is_running(dir.path(), ICONS));

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        drop(guard);
        assert!(!path.exists());
        assert!(!is_running(dir.path(), ICONS));
    }

    #[test]
    fn test_second_acquire_is_refused_while_held() {
        let dir = TempDir::new().unwrap();
        let _guard = JobGuard::acquire(dir.path(), HOUSEKEEPING).unwrap().unwrap();
        assert!(JobGuard::acquire(dir.path(), HOUSEKEEPING).unwrap().is_none());
    }

    #[test]
    fn test_stale_pid_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(dir.path(), BOOKLIST);
        write_atomic(&path, b"12345\n").unwrap();
        thread::sleep(Duration::from_millis(10));

        assert!(is_live(&path, Duration::from_secs(3600)));
        assert!(!is_live(&path, Duration::ZERO));
    }

    #[test]
    fn test_stale_lock_can_be_reacquired() {
        let dir = TempDir::new().unwrap();
        let path = pid_path(dir.path(), SHELVES);
        write_atomic(&path, b"12345\n").unwrap();
        thread::sleep(Duration::from_millis(10));

        // A dead job's file does not block acquisition once stale.
        assert!(!is_live(&path, Duration::ZERO));
        let guard = JobGuard::acquire(dir.path(), SHELVES).unwrap();
        // Fresh file from the crashed job is still within STALE_AFTER,
        // so the regular acquire path refuses it.
        assert!(guard.is_none());
    }

    #[test]
    fn test_run_skips_while_job_is_running() {
        let dir = TempDir::new().unwrap();
        let _guard = JobGuard::acquire(dir.path(), ICONS).unwrap().unwrap();
        // Must return without spawning anything.
        run(dir.path(), ICONS, &["icons"]).unwrap();
    }

    #[test]
    fn test_shelf_job_names_are_distinct_per_shelf() {
        assert_eq!(shelf_job("to-read"), "shelf-to-read");
        assert_ne!(shelf_job("read"), shelf_job("to-read"));
    }
}
