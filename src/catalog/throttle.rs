//! Request throttling for the catalog service
//!
//! Every API call passes through a single gate that enforces a minimum
//! interval between requests. The gate is held across both the wait and
//! the request itself, so concurrent callers are fully serialized. The
//! time of the last successful request is persisted under the cache root,
//! which puts back-to-back invocations of the executable in one shared
//! throttle domain.

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::Mutex;

use crate::cache::store::write_atomic;

/// Name of the throttle state file, directly under the cache root
pub const STATE_FILE: &str = "last_request";

/// Serializes remote requests with a minimum spacing between them
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    state_path: Option<PathBuf>,
    last: Mutex<Option<SystemTime>>,
}

impl Throttle {
    /// Creates a gate backed by a state file
    ///
    /// The previous request time is seeded from the file when it exists
    /// and parses; an unreadable file starts the gate fresh.
    pub fn new(interval: Duration, state_path: PathBuf) -> Self {
        let seeded = read_state(&state_path);
        Self {
            interval,
            state_path: Some(state_path),
            last: Mutex::new(seeded),
        }
    }

    /// Creates a gate without persistence
    pub fn in_memory(interval: Duration) -> Self {
        Self {
            interval,
            state_path: None,
            last: Mutex::new(None),
        }
    }

    /// Runs `op` once the minimum interval since the previous successful
    /// request has elapsed
    ///
    /// On success the gate's clock advances and is persisted. A failed
    /// operation leaves the clock untouched, so the next attempt is not
    /// pushed further out by the failure.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let elapsed = SystemTime::now()
                .duration_since(previous)
                .unwrap_or_default();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "throttling request");
                tokio::time::sleep(wait).await;
            }
        }

        let result = op().await;
        if result.is_ok() {
            let now = SystemTime::now();
            *last = Some(now);
            if let Some(path) = &self.state_path {
                if let Err(err) = write_state(path, now) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "could not persist throttle state"
                    );
                }
            }
        }
        result
    }
}

fn read_state(path: &Path) -> Option<SystemTime> {
    let contents = fs::read_to_string(path).ok()?;
    let stamp: DateTime<Utc> = contents.trim().parse().ok()?;
    Some(stamp.into())
}

fn write_state(path: &Path, at: SystemTime) -> io::Result<()> {
    let stamp: DateTime<Utc> = at.into();
    let rendered = stamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    write_atomic(path, rendered.as_bytes())
}
