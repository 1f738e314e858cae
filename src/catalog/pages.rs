//! Paginated bulk retrieval
//!
//! Fetches multi-page listings strictly in page order, persisting
//! accumulated results as it goes so an interactive invocation can render
//! partial data while a background job is still appending pages.

use std::future::Future;
use std::time::{Duration, Instant};

use super::PageData;

/// Floor between page fetches, matching the catalog rate limit
const PAGE_INTERVAL: Duration = Duration::from_secs(1);

/// Drives `fetch_page` from page 1 until the page count derived from the
/// first page's total is exhausted
///
/// The page count is `ceil(min(total, cap) / page_size)`, so a cap is
/// page-granular: fetching never stops mid-page. When `write_partial` is
/// set, `persist` runs after every page with everything accumulated so
/// far; one final `persist` always runs after the loop, so a complete
/// entry is written even when nothing was fetched.
///
/// Any fetch or persist error aborts the loop and is returned as-is.
pub async fn fetch_all<T, E, F, Fut, P>(
    page_size: u32,
    cap: Option<u32>,
    write_partial: bool,
    fetch_page: F,
    persist: P,
) -> Result<Vec<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, PageData), E>>,
    P: FnMut(&[T], PageData) -> Result<(), E>,
{
    fetch_all_spaced(PAGE_INTERVAL, page_size, cap, write_partial, fetch_page, persist).await
}

async fn fetch_all_spaced<T, E, F, Fut, P>(
    interval: Duration,
    page_size: u32,
    cap: Option<u32>,
    write_partial: bool,
    mut fetch_page: F,
    mut persist: P,
) -> Result<Vec<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, PageData), E>>,
    P: FnMut(&[T], PageData) -> Result<(), E>,
{
    let mut items = Vec::new();
    let mut meta = PageData::default();
    let mut page = 1u32;
    // Page 1 must be fetched before the real count is known.
    let mut page_count = 1u32;
    let mut last_fetch: Option<Instant> = None;

    while page <= page_count {
        if let Some(previous) = last_fetch {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        last_fetch = Some(Instant::now());

        let (mut batch, batch_meta) = fetch_page(page).await?;
        meta = batch_meta;
        if page == 1 {
            let target = match cap {
                Some(cap) => meta.total.min(cap),
                None => meta.total,
            };
            page_count = ceil_div(target, page_size);
            tracing::debug!(total = meta.total, pages = page_count, "pagination plan");
        }
        items.append(&mut batch);

        if write_partial {
            persist(&items, meta)?;
        }
        page += 1;
    }

    persist(&items, meta)?;
    Ok(items)
}

fn ceil_div(total: u32, size: u32) -> u32 {
    if size == 0 {
        return 0;
    }
    total.div_ceil(size)
}
