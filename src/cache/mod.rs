//! Filesystem caching for catalog data and cover images
//!
//! This module provides the on-disk cache: sharded key construction,
//! a store with mtime-based freshness and atomic writes, and the janitor
//! that removes entries past their retention period. Cached data is grouped
//! into class directories under a single cache root, each class expiring on
//! its own schedule.

pub mod janitor;
pub mod key;
pub mod store;

pub use key::{CacheKey, JSON_EXT, PNG_EXT};
pub use store::{CacheError, CacheStore};

/// Class directory for free-text search results
pub const SEARCH: &str = "search";

/// Class directory for author bibliographies
pub const AUTHORS: &str = "authors";

/// Class directory for the shelf list and shelf contents
pub const SHELVES: &str = "shelves";

/// Class directory for downloaded cover images and the download queue
pub const ICONS: &str = "icons";

/// Class directory for release-check state
pub const CHECK: &str = "check";

/// Every value class, created at startup
pub const CLASSES: [&str; 5] = [SEARCH, AUTHORS, SHELVES, ICONS, CHECK];
