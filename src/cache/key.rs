//! Cache key construction and directory sharding
//!
//! Every cached value lives at a relative path derived from a semantic
//! identifier (a search query, an entity ID, a fixed singleton name). Keys
//! are sharded into short directory segments so no single directory
//! accumulates an unbounded number of files.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// File extension used for cached JSON values
pub const JSON_EXT: &str = "json";

/// File extension used for cached cover images
pub const PNG_EXT: &str = "png";

/// A relative cache path derived deterministically from an identifier
///
/// The path is a pure function of the inputs: the same identifier always
/// produces the same key, and distinct identifiers produce distinct keys
/// (hashed keys rely on SHA-256; numeric keys embed the full ID in the
/// file name, so they are injective by construction).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    rel: PathBuf,
}

impl CacheKey {
    /// Builds a sharded key from an arbitrary identifier string
    ///
    /// The identifier is hashed with SHA-256; the first two hex digit pairs
    /// become directory levels and the remaining digest is the file stem,
    /// e.g. `search/ab/cd/ef0123...89.json`.
    pub fn hashed(class: &str, identifier: &str) -> Self {
        let digest = hex::encode(Sha256::digest(identifier.as_bytes()));
        let rel = Path::new(class)
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(format!("{}.{}", &digest[4..], JSON_EXT));
        Self { rel }
    }

    /// Builds a sharded key from a numeric entity ID
    ///
    /// The ID is zero-padded to at least four digits; the first two digit
    /// pairs become directory levels and the file name is the undecorated
    /// ID, e.g. `icons/00/42/42.png` or `authors/47/21/47212.json`.
    pub fn numeric(class: &str, id: u64, ext: &str) -> Self {
        let padded = format!("{:04}", id);
        let rel = Path::new(class)
            .join(&padded[0..2])
            .join(&padded[2..4])
            .join(format!("{}.{}", id, ext));
        Self { rel }
    }

    /// Builds a key from a fixed relative file name, for singleton entries
    /// such as the shelf list
    pub fn literal(class: &str, name: &str) -> Self {
        Self {
            rel: Path::new(class).join(name),
        }
    }

    /// The key's path relative to the cache root
    pub fn as_path(&self) -> &Path {
        &self.rel
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.rel.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hashed_key_is_deterministic() {
        let a = CacheKey::hashed("search", "the left hand of darkness");
        let b = CacheKey::hashed("search", "the left hand of darkness");
        assert_eq!(a, b, "Same identifier should produce the same key");
    }

    #[test]
    fn test_hashed_keys_differ_for_distinct_identifiers() {
        let a = CacheKey::hashed("search", "dune");
        let b = CacheKey::hashed("search", "dune messiah");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hashed_key_shape() {
        let key = CacheKey::hashed("search", "hello");
        let parts: Vec<String> = key
            .as_path()
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        assert_eq!(parts.len(), 4, "class + two shard levels + file name");
        assert_eq!(parts[0], "search");
        assert_eq!(parts[1].len(), 2);
        assert_eq!(parts[2].len(), 2);
        // 64 hex digest chars minus the 4 used for sharding, plus ".json"
        assert_eq!(parts[3].len(), 60 + 5);
        assert!(parts[3].ends_with(".json"));
    }

    #[test]
    fn test_hashed_keys_have_no_collisions_over_many_inputs() {
        let mut seen = HashSet::new();
        for i in 0..5000 {
            let key = CacheKey::hashed("search", &format!("query number {}", i));
            assert!(seen.insert(key), "Unexpected key collision at input {}", i);
        }
    }

    #[test]
    fn test_numeric_key_pads_short_ids() {
        let key = CacheKey::numeric("icons", 42, PNG_EXT);
        assert_eq!(key.as_path(), Path::new("icons/00/42/42.png"));
    }

    #[test]
    fn test_numeric_key_shards_long_ids() {
        let key = CacheKey::numeric("authors", 47212, JSON_EXT);
        assert_eq!(key.as_path(), Path::new("authors/47/21/47212.json"));
    }

    #[test]
    fn test_numeric_key_single_digit() {
        let key = CacheKey::numeric("icons", 7, PNG_EXT);
        assert_eq!(key.as_path(), Path::new("icons/00/07/7.png"));
    }

    #[test]
    fn test_numeric_keys_are_injective() {
        let mut seen = HashSet::new();
        for id in 0..5000u64 {
            let key = CacheKey::numeric("icons", id, PNG_EXT);
            assert!(seen.insert(key), "Duplicate path for id {}", id);
        }
    }

    #[test]
    fn test_literal_key() {
        let key = CacheKey::literal("shelves", "shelves.json");
        assert_eq!(key.as_path(), Path::new("shelves/shelves.json"));
    }

    #[test]
    fn test_hashed_key_handles_unsafe_characters() {
        // Queries may contain anything; the sharded path must stay hex-only.
        let key = CacheKey::hashed("search", "../../etc/passwd: <>|?*");
        let parts: Vec<String> = key
            .as_path()
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
        let stem = parts[3].strip_suffix(".json").expect("json extension");
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
