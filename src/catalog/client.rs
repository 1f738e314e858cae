//! HTTP client for the catalog service
//!
//! Free-text search, author bibliographies, shelf listings and shelf
//! membership changes. Every call goes through the shared [`Throttle`],
//! and the API key travels as a query parameter that never appears in
//! logs (only request paths are logged).

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use super::throttle::Throttle;
use super::{Author, Book, PageData, Shelf, SHELF_PAGE_SIZE};

/// Minimum spacing between catalog requests, fixed by the service's
/// rate limit
pub const REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// HTTP timeout for a single catalog call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("booksearch/", env!("CARGO_PKG_VERSION"));

/// Error types for catalog access
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The request could not be built or failed in flight
    #[error("catalog request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status code
    #[error("catalog returned {status} for {path}")]
    Status { status: StatusCode, path: String },

    /// The response body did not match the expected shape
    #[error("could not parse catalog response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Client for the remote book catalog
#[derive(Debug)]
pub struct CatalogClient {
    client: Client,
    base_url: String,
    api_key: String,
    throttle: Throttle,
}

impl CatalogClient {
    /// Creates a client against `base_url`, authenticating with `api_key`
    pub fn new(
        base_url: &str,
        api_key: &str,
        throttle: Throttle,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .use_rustls_tls()
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            throttle,
        })
    }

    /// Searches the catalog by free-text query
    pub async fn search(&self, query: &str) -> Result<Vec<Book>, CatalogError> {
        let body = self.get("/search.json", &[("q", query)]).await?;
        parse_search(&body)
    }

    /// Fetches one page of an author's bibliography
    pub async fn author_books(
        &self,
        author_id: u64,
        page: u32,
    ) -> Result<(Vec<Book>, PageData), CatalogError> {
        let path = format!("/authors/{author_id}/books.json");
        let page = page.to_string();
        let body = self.get(&path, &[("page", &page)]).await?;
        parse_books(&body)
    }

    /// Fetches one page of the user's shelf list
    pub async fn user_shelves(
        &self,
        user_id: u64,
        page: u32,
    ) -> Result<(Vec<Shelf>, PageData), CatalogError> {
        let path = format!("/users/{user_id}/shelves.json");
        let page = page.to_string();
        let body = self.get(&path, &[("page", &page)]).await?;
        parse_shelves(&body)
    }

    /// Fetches one page of a shelf's books, in shelf order
    pub async fn shelf_books(
        &self,
        user_id: u64,
        shelf: &str,
        page: u32,
    ) -> Result<(Vec<Book>, PageData), CatalogError> {
        let path = format!("/users/{user_id}/shelves/{shelf}/books.json");
        let page = page.to_string();
        let per_page = SHELF_PAGE_SIZE.to_string();
        let body = self
            .get(
                &path,
                &[
                    ("page", &page),
                    ("per_page", &per_page),
                    ("sort", "position"),
                ],
            )
            .await?;
        parse_books(&body)
    }

    /// Adds a book to one or more shelves
    pub async fn add_to_shelves(
        &self,
        book_id: u64,
        shelves: &[String],
    ) -> Result<(), CatalogError> {
        let book_id = book_id.to_string();
        let shelves = shelves.join(",");
        self.post(
            "/shelves/add.json",
            &[("book_id", book_id.as_str()), ("shelves", shelves.as_str())],
        )
        .await?;
        Ok(())
    }

    /// Removes a book from a single shelf
    pub async fn remove_from_shelf(
        &self,
        book_id: u64,
        shelf: &str,
    ) -> Result<(), CatalogError> {
        let book_id = book_id.to_string();
        self.post(
            "/shelves/remove.json",
            &[("book_id", book_id.as_str()), ("shelf", shelf)],
        )
        .await?;
        Ok(())
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<String, CatalogError> {
        let request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .query(&[("key", self.api_key.as_str())]);
        self.dispatch(path, request).await
    }

    async fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<String, CatalogError> {
        let request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .query(&[("key", self.api_key.as_str())])
            .form(form);
        self.dispatch(path, request).await
    }

    /// Sends one request through the throttle and returns the body
    async fn dispatch(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<String, CatalogError> {
        self.throttle
            .run(|| async move {
                tracing::debug!(path, "catalog request");
                let response = request.send().await?;
                let status = response.status();
                if status.as_u16() > 299 {
                    return Err(CatalogError::Status {
                        status,
                        path: path.to_string(),
                    });
                }
                Ok(response.text().await?)
            })
            .await
    }
}

fn parse_search(body: &str) -> Result<Vec<Book>, CatalogError> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response.results.into_iter().map(Book::from).collect())
}

fn parse_books(body: &str) -> Result<(Vec<Book>, PageData), CatalogError> {
    let response: PagedBooks = serde_json::from_str(body)?;
    let page = PageData {
        start: response.start,
        end: response.end,
        total: response.total,
    };
    Ok((response.books.into_iter().map(Book::from).collect(), page))
}

fn parse_shelves(body: &str) -> Result<(Vec<Shelf>, PageData), CatalogError> {
    let response: PagedShelves = serde_json::from_str(body)?;
    let page = PageData {
        start: response.start,
        end: response.end,
        total: response.total,
    };
    let shelves = response
        .shelves
        .into_iter()
        .map(|shelf| Shelf {
            id: shelf.id,
            name: shelf.name,
            size: shelf.book_count,
            url: shelf.url,
        })
        .collect();
    Ok((shelves, page))
}

// Wire format structs matching the service's JSON responses.

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<WireBook>,
}

#[derive(Debug, Deserialize)]
struct PagedBooks {
    #[serde(default)]
    start: u32,
    #[serde(default)]
    end: u32,
    #[serde(default)]
    total: u32,
    books: Vec<WireBook>,
}

#[derive(Debug, Deserialize)]
struct PagedShelves {
    #[serde(default)]
    start: u32,
    #[serde(default)]
    end: u32,
    #[serde(default)]
    total: u32,
    shelves: Vec<WireShelf>,
}

#[derive(Debug, Deserialize)]
struct WireBook {
    id: u64,
    #[serde(default)]
    work_id: u64,
    title: String,
    #[serde(default)]
    title_without_series: String,
    #[serde(default)]
    series: String,
    author: WireAuthor,
    #[serde(default)]
    publication_year: Option<i32>,
    #[serde(default)]
    average_rating: f32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    image_url: String,
}

#[derive(Debug, Deserialize)]
struct WireAuthor {
    id: u64,
    name: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct WireShelf {
    id: u64,
    name: String,
    #[serde(default)]
    book_count: u32,
    #[serde(default)]
    url: String,
}

impl From<WireBook> for Book {
    fn from(wire: WireBook) -> Self {
        let short_title = if wire.title_without_series.is_empty() {
            wire.title.clone()
        } else {
            wire.title_without_series
        };
        Book {
            id: wire.id,
            work_id: wire.work_id,
            title: wire.title,
            short_title,
            series: wire.series,
            author: Author {
                id: wire.author.id,
                name: wire.author.name,
                url: wire.author.url,
            },
            year: wire.publication_year,
            rating: wire.average_rating,
            description: wire.description,
            url: wire.url,
            image_url: wire.image_url,
        }
    }
}
