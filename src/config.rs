//! Runtime configuration
//!
//! Settings are loaded from `BOOKSEARCH_`-prefixed environment variables
//! layered over built-in defaults, which is how the host launcher passes
//! options to each invocation. Cache ages carry an enforced minimum floor
//! so a misconfigured environment can never hammer the catalog API.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheError, CacheStore};

/// Smallest max age any cache class may be configured to, in minutes
const MIN_CACHE_MINUTES: u64 = 3;

/// Smallest allowed cap on books fetched per author
const MIN_MAX_BOOKS: u32 = 30;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment extraction failed
    #[error("configuration could not be loaded: {0}")]
    LoadFailed(String),

    /// A setting required by the current command is absent
    #[error("missing required setting {field}; set {hint}")]
    Missing {
        field: &'static str,
        hint: &'static str,
    },
}

/// Effective settings for one invocation
///
/// Every field can be overridden through an environment variable named
/// `BOOKSEARCH_<FIELD>` (uppercased field name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// API key for the Catalog Service; required for remote calls
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the catalog API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Numeric user ID; required for shelf operations
    #[serde(default)]
    pub user_id: Option<u64>,

    /// Override for the cache root directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Cap on books fetched per author bibliography
    #[serde(default = "default_max_books")]
    pub max_books: u32,

    /// Queries shorter than this render a "keep typing" hint instead of
    /// hitting the API
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,

    /// Max age in minutes for author bibliographies and other generic data
    #[serde(default = "default_cache_minutes")]
    pub default_cache_minutes: u64,

    /// Max age in minutes for search results
    #[serde(default = "default_search_cache_minutes")]
    pub search_cache_minutes: u64,

    /// Max age in minutes for downloaded cover images
    #[serde(default = "default_icons_cache_minutes")]
    pub icons_cache_minutes: u64,

    /// Max age in minutes for shelf contents and the shelf list
    #[serde(default = "default_shelf_cache_minutes")]
    pub shelf_cache_minutes: u64,

    /// Release feed polled by the housekeeping update check; an empty
    /// string disables the check
    #[serde(default = "default_release_url")]
    pub release_url: String,
}

fn default_base_url() -> String {
    "https://api.bookcatalog.dev/v1".to_string()
}

fn default_max_books() -> u32 {
    100
}

fn default_min_query_len() -> usize {
    2
}

fn default_cache_minutes() -> u64 {
    24 * 60
}

fn default_search_cache_minutes() -> u64 {
    12 * 60
}

fn default_icons_cache_minutes() -> u64 {
    14 * 24 * 60
}

fn default_shelf_cache_minutes() -> u64 {
    5
}

fn default_release_url() -> String {
    "https://api.github.com/repos/booksearch-dev/booksearch/releases/latest".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            user_id: None,
            cache_dir: None,
            max_books: default_max_books(),
            min_query_len: default_min_query_len(),
            default_cache_minutes: default_cache_minutes(),
            search_cache_minutes: default_search_cache_minutes(),
            icons_cache_minutes: default_icons_cache_minutes(),
            shelf_cache_minutes: default_shelf_cache_minutes(),
            release_url: default_release_url(),
        }
    }
}

impl Settings {
    /// Loads settings from `BOOKSEARCH_*` environment variables over the
    /// built-in defaults, then applies the safety floors
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("BOOKSEARCH_"));

        let mut settings: Self = figment
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        settings.apply_floors();
        Ok(settings)
    }

    /// Clamps every tunable to its minimum allowed value
    fn apply_floors(&mut self) {
        self.default_cache_minutes = self.default_cache_minutes.max(MIN_CACHE_MINUTES);
        self.search_cache_minutes = self.search_cache_minutes.max(MIN_CACHE_MINUTES);
        self.icons_cache_minutes = self.icons_cache_minutes.max(MIN_CACHE_MINUTES);
        self.shelf_cache_minutes = self.shelf_cache_minutes.max(MIN_CACHE_MINUTES);
        self.max_books = self.max_books.max(MIN_MAX_BOOKS);
        self.min_query_len = self.min_query_len.max(1);
    }

    /// Max age for author bibliographies and other generic data
    pub fn default_max_age(&self) -> Duration {
        Duration::from_secs(self.default_cache_minutes * 60)
    }

    /// Max age for search results
    pub fn search_max_age(&self) -> Duration {
        Duration::from_secs(self.search_cache_minutes * 60)
    }

    /// Retention period for downloaded cover images
    pub fn icons_max_age(&self) -> Duration {
        Duration::from_secs(self.icons_cache_minutes * 60)
    }

    /// Max age for shelf contents and the shelf list
    pub fn shelf_max_age(&self) -> Duration {
        Duration::from_secs(self.shelf_cache_minutes * 60)
    }

    /// The API key, or a hint at the variable that provides it
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::Missing {
            field: "api_key",
            hint: "BOOKSEARCH_API_KEY",
        })
    }

    /// The user ID, or a hint at the variable that provides it
    pub fn require_user_id(&self) -> Result<u64, ConfigError> {
        self.user_id.ok_or(ConfigError::Missing {
            field: "user_id",
            hint: "BOOKSEARCH_USER_ID",
        })
    }

    /// The release feed URL, unless the update check is disabled
    pub fn release_url(&self) -> Option<&str> {
        if self.release_url.is_empty() {
            None
        } else {
            Some(&self.release_url)
        }
    }

    /// Opens the cache store at the configured or platform-default root
    pub fn cache_store(&self) -> Result<CacheStore, CacheError> {
        match &self.cache_dir {
            Some(dir) => Ok(CacheStore::with_root(dir.clone())),
            None => CacheStore::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.api_key.is_none());
        assert!(settings.user_id.is_none());
        assert!(settings.cache_dir.is_none());
        assert_eq!(settings.max_books, 100);
        assert_eq!(settings.min_query_len, 2);
        assert_eq!(settings.default_cache_minutes, 1440);
        assert_eq!(settings.search_cache_minutes, 720);
        assert_eq!(settings.icons_cache_minutes, 20160);
        assert_eq!(settings.shelf_cache_minutes, 5);
    }

    #[test]
    fn test_max_age_durations() {
        let settings = Settings::default();
        assert_eq!(settings.default_max_age(), Duration::from_secs(24 * 3600));
        assert_eq!(settings.search_max_age(), Duration::from_secs(12 * 3600));
        assert_eq!(settings.icons_max_age(), Duration::from_secs(14 * 24 * 3600));
        assert_eq!(settings.shelf_max_age(), Duration::from_secs(5 * 60));
    }

    #[test]
    fn test_floors_clamp_low_values() {
        let mut settings = Settings {
            default_cache_minutes: 0,
            search_cache_minutes: 1,
            icons_cache_minutes: 2,
            shelf_cache_minutes: 0,
            max_books: 5,
            min_query_len: 0,
            ..Default::default()
        };
        settings.apply_floors();

        assert_eq!(settings.default_cache_minutes, MIN_CACHE_MINUTES);
        assert_eq!(settings.search_cache_minutes, MIN_CACHE_MINUTES);
        assert_eq!(settings.icons_cache_minutes, MIN_CACHE_MINUTES);
        assert_eq!(settings.shelf_cache_minutes, MIN_CACHE_MINUTES);
        assert_eq!(settings.max_books, MIN_MAX_BOOKS);
        assert_eq!(settings.min_query_len, 1);
    }

    #[test]
    fn test_floors_keep_reasonable_values() {
        let mut settings = Settings::default();
        settings.apply_floors();

        assert_eq!(settings.default_cache_minutes, 1440);
        assert_eq!(settings.max_books, 100);
    }

    #[test]
    fn test_require_api_key_missing() {
        let settings = Settings::default();
        let result = settings.require_api_key();
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_api_key_present() {
        let settings = Settings {
            api_key: Some("k-123".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.require_api_key().unwrap(), "k-123");
    }

    #[test]
    fn test_require_user_id() {
        let settings = Settings {
            user_id: Some(88),
            ..Default::default()
        };
        assert_eq!(settings.require_user_id().unwrap(), 88);
        assert!(Settings::default().require_user_id().is_err());
    }

    #[test]
    fn test_release_url_empty_disables_check() {
        let settings = Settings {
            release_url: String::new(),
            ..Default::default()
        };
        assert!(settings.release_url().is_none());
        assert!(Settings::default().release_url().is_some());
    }

    #[test]
    fn test_cache_store_uses_override_dir() {
        let settings = Settings {
            cache_dir: Some(PathBuf::from("/tmp/booksearch-test-root")),
            ..Default::default()
        };
        let store = settings.cache_store().expect("store");
        assert_eq!(store.root(), Path::new("/tmp/booksearch-test-root"));
    }
}
