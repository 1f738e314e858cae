//! Release update check
//!
//! The housekeeping job polls the release feed at most once per cache
//! period and records the newest published version; the config view
//! surfaces it when it is newer than the running build. Release hosts
//! are not part of the catalog throttle domain.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheError, CacheKey, CacheStore, CHECK};

/// Version of the running executable
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("booksearch/", env!("CARGO_PKG_VERSION"));

/// Error types for the update check
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Reading or writing the cached release state failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The release feed could not be fetched
    #[error("release check failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The release host answered with a non-success status code
    #[error("release feed returned {0}")]
    Status(reqwest::StatusCode),

    /// The feed body did not match the expected shape
    #[error("could not parse release feed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Latest published release, as cached from the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
}

impl ReleaseInfo {
    /// Whether this release is strictly newer than the running build
    pub fn is_newer(&self) -> bool {
        version_triple(&self.version) > version_triple(CURRENT_VERSION)
    }
}

fn state_key() -> CacheKey {
    CacheKey::literal(CHECK, "update.json")
}

/// Returns the latest release, refreshing the cached state when due
pub async fn check(
    store: &CacheStore,
    release_url: &str,
    max_age: Duration,
) -> Result<ReleaseInfo, UpdateError> {
    store
        .load_or_store(&state_key(), max_age, || fetch_latest(release_url))
        .await
}

/// Reads the cached release state without refreshing it
pub fn cached(store: &CacheStore) -> Option<ReleaseInfo> {
    store.read(&state_key()).ok()
}

async fn fetch_latest(release_url: &str) -> Result<ReleaseInfo, UpdateError> {
    tracing::debug!(url = release_url, "checking release feed");
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .use_rustls_tls()
        .build()?;

    let response = client.get(release_url).send().await?;
    let status = response.status();
    if status.as_u16() > 299 {
        return Err(UpdateError::Status(status));
    }

    let feed: ReleaseFeed = serde_json::from_str(&response.text().await?)?;
    Ok(ReleaseInfo {
        version: version_from_tag(&feed.tag_name),
    })
}

fn version_from_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('v').to_string()
}

/// Parses a "1.2.3"-style version into a comparable numeric triple
///
/// Unparseable segments count as zero, so a malformed feed never reports
/// an update.
fn version_triple(version: &str) -> (u32, u32, u32) {
    let mut parts = version.trim().trim_start_matches('v').splitn(3, '.');
    let mut next = || {
        parts
            .next()
            .and_then(|part| part.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0)
    };
    (next(), next(), next())
}

#[derive(Debug, Deserialize)]
struct ReleaseFeed {
    tag_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version_triple() {
        assert_eq!(version_triple("1.2.3"), (1, 2, 3));
        assert_eq!(version_triple("v0.4.1"), (0, 4, 1));
        assert_eq!(version_triple("2.0"), (2, 0, 0));
        assert_eq!(version_triple("1.2.3-beta"), (1, 2, 3));
        assert_eq!(version_triple("not a version"), (0, 0, 0));
    }

    #[test]
    fn test_is_newer_compares_numerically() {
        let newer = ReleaseInfo { version: "99.0.0".to_string() };
        assert!(newer.is_newer());

        let same = ReleaseInfo { version: CURRENT_VERSION.to_string() };
        assert!(!same.is_newer());

        let older = ReleaseInfo { version: "0.0.1".to_string() };
        assert!(!older.is_newer());

        let malformed = ReleaseInfo { version: "???".to_string() };
        assert!(!malformed.is_newer());
    }

    #[test]
    fn test_version_from_tag_strips_prefix() {
        assert_eq!(version_from_tag("v0.5.0"), "0.5.0");
        assert_eq!(version_from_tag("0.5.0"), "0.5.0");
        assert_eq!(version_from_tag(" v1.0.0 "), "1.0.0");
    }

    #[test]
    fn test_release_feed_parsing() {
        let feed: ReleaseFeed = serde_json::from_str(
            r#"{"tag_name": "v0.5.0", "name": "0.5.0", "prerelease": false}"#,
        )
        .unwrap();
        assert_eq!(version_from_tag(&feed.tag_name), "0.5.0");
    }

    #[tokio::test]
    async fn test_check_prefers_fresh_cached_state() {
        let dir = TempDir::new().unwrap();
        let store = crate::cache::CacheStore::with_root(dir.path().to_path_buf());
        let cached_info = ReleaseInfo { version: "9.9.9".to_string() };
        store.write(&state_key(), &cached_info).unwrap();

        // The URL is unreachable; a fresh cache entry means it is never
        // contacted.
        let info = check(&store, "http://127.0.0.1:1/releases", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(info, cached_info);
    }

    #[test]
    fn test_cached_returns_none_without_state() {
        let dir = TempDir::new().unwrap();
        let store = crate::cache::CacheStore::with_root(dir.path().to_path_buf());
        assert!(cached(&store).is_none());
    }
}
