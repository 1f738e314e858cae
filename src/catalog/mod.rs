//! Book catalog domain types and API access
//!
//! This module family covers everything that talks to the remote catalog
//! service: the domain types cached on disk, the throttled HTTP client,
//! and the paginated bulk fetcher used by background refresh jobs.

pub mod client;
pub mod pages;
pub mod throttle;

use serde::{Deserialize, Serialize};

pub use client::{CatalogClient, CatalogError};
pub use throttle::Throttle;

/// Books per page in author bibliography responses, fixed by the service
pub const AUTHOR_PAGE_SIZE: u32 = 30;

/// Books per page requested from shelf contents endpoints
pub const SHELF_PAGE_SIZE: u32 = 50;

/// Shelves per page in shelf list responses, fixed by the service
pub const SHELVES_PAGE_SIZE: u32 = 15;

/// Pagination metadata attached to every list response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    /// 1-based index of the first item on this page
    pub start: u32,
    /// 1-based index of the last item on this page
    pub end: u32,
    /// Total number of items across all pages
    pub total: u32,
}

/// A single book as cached on disk and rendered in result lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: u64,
    /// Edition-independent work identifier
    pub work_id: u64,
    pub title: String,
    /// Title with any series suffix stripped
    pub short_title: String,
    pub series: String,
    pub author: Author,
    pub year: Option<i32>,
    pub rating: f32,
    pub description: String,
    pub url: String,
    /// Remote cover image, used to populate the icon cache
    pub image_url: String,
}

impl Book {
    /// One-line summary shown under the title in result lists
    pub fn subtitle(&self) -> String {
        match self.year {
            Some(year) => format!("{}, {} ({:.2} stars)", self.author.name, year, self.rating),
            None => format!("{} ({:.2} stars)", self.author.name, self.rating),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    pub name: String,
    pub url: String,
}

/// A shelf as listed for the configured user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: u64,
    /// Service-side slug, e.g. "currently-reading"
    pub name: String,
    pub size: u32,
    pub url: String,
}

impl Shelf {
    /// Human-readable shelf title
    ///
    /// The three built-in shelves have fixed display names; custom shelf
    /// slugs are title-cased word by word.
    pub fn display_title(&self) -> String {
        display_title(&self.name)
    }
}

/// Cached contents of one shelf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfBooks {
    pub name: String,
    /// Total reported by the service, which can exceed `books.len()`
    /// while a refresh is still appending pages
    pub total: u32,
    pub books: Vec<Book>,
}

/// Maps a shelf slug to its display title
pub fn display_title(slug: &str) -> String {
    match slug {
        "read" => "Read".to_string(),
        "currently-reading" => "Currently Reading".to_string(),
        "to-read" => "Want to Read".to_string(),
        other => title_case(other),
    }
}

fn title_case(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book(year: Option<i32>) -> Book {
        Book {
            id: 47212,
            work_id: 902715,
            title: "The Left Hand of Darkness (Hainish Cycle, #4)".to_string(),
            short_title: "The Left Hand of Darkness".to_string(),
            series: "Hainish Cycle".to_string(),
            author: Author {
                id: 874602,
                name: "Ursula K. Le Guin".to_string(),
                url: "https://bookcatalog.dev/author/874602".to_string(),
            },
            year,
            rating: 4.12,
            description: "Winter on the planet Gethen.".to_string(),
            url: "https://bookcatalog.dev/book/47212".to_string(),
            image_url: "https://images.bookcatalog.dev/47212.jpg".to_string(),
        }
    }

    #[test]
    fn test_subtitle_includes_year_when_known() {
        let book = sample_book(Some(1969));
        assert_eq!(book.subtitle(), "Ursula K. Le Guin, 1969 (4.12 stars)");
    }

    #[test]
    fn test_subtitle_without_year() {
        let book = sample_book(None);
        assert_eq!(book.subtitle(), "Ursula K. Le Guin (4.12 stars)");
    }

    #[test]
    fn test_display_title_builtin_shelves() {
        assert_eq!(display_title("read"), "Read");
        assert_eq!(display_title("currently-reading"), "Currently Reading");
        assert_eq!(display_title("to-read"), "Want to Read");
    }

    #[test]
    fn test_display_title_custom_shelf() {
        assert_eq!(display_title("space-opera"), "Space Opera");
        assert_eq!(display_title("abandoned"), "Abandoned");
    }

    #[test]
    fn test_display_title_ignores_empty_segments() {
        assert_eq!(display_title("sci--fi"), "Sci Fi");
    }

    #[test]
    fn test_book_round_trips_through_json() {
        let book = sample_book(Some(1969));
        let json = serde_json::to_string(&book).unwrap();
        let back: Book = serde_json::from_str(&json).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn test_page_data_is_copyable() {
        let page = PageData { start: 1, end: 30, total: 162 };
        let copy = page;
        assert_eq!(copy, page);
    }
}
