//! booksearch library
//!
//! This module exposes the cache, catalog and icon modules for use in
//! integration tests.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod feedback;
pub mod icons;
pub mod jobs;
pub mod update;
