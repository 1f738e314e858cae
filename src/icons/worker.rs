//! Cover download workers
//!
//! Drains the icon queue through a bounded pool of concurrent downloads.
//! Each worker fetches the remote cover, squares it onto a transparent
//! canvas and atomically writes a PNG into the icon tree. Cover hosts are
//! not part of the catalog's rate limit, so downloads bypass the request
//! throttle.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use reqwest::Client;
use tokio::sync::Semaphore;

use super::{IconCache, IconError, QueuedIcon};
use crate::cache::store::write_atomic;

/// Number of covers downloaded concurrently
const POOL_SIZE: usize = 5;

/// HTTP timeout for a single cover download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads every queued cover, at most [`POOL_SIZE`] at a time
///
/// Every entry is attempted even when earlier ones fail; the last error
/// is returned once the whole batch has been joined. Entries whose
/// destination file appeared in the meantime are skipped.
pub async fn drain(cache: &mut IconCache) -> Result<(), IconError> {
    let entries = cache.take_queue();
    if entries.is_empty() {
        tracing::debug!("icon queue empty, nothing to download");
        return Ok(());
    }
    tracing::info!(entries = entries.len(), "draining icon queue");

    let client = Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .use_rustls_tls()
        .build()?;
    let pool = Arc::new(Semaphore::new(POOL_SIZE));

    let mut tasks = Vec::with_capacity(entries.len());
    for entry in entries {
        let dest = cache.icon_path(entry.id);
        let client = client.clone();
        let Ok(permit) = Arc::clone(&pool).acquire_owned().await else {
            break;
        };
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let result = fetch_and_store(&client, &entry, &dest).await;
            (entry.id, result)
        }));
    }

    let mut downloaded = 0usize;
    let mut last_error = None;
    for outcome in join_all(tasks).await {
        match outcome {
            Ok((_, Ok(true))) => downloaded += 1,
            Ok((_, Ok(false))) => {}
            Ok((id, Err(err))) => {
                tracing::warn!(id, error = %err, "cover download failed");
                last_error = Some(err);
            }
            Err(err) => tracing::warn!(error = %err, "icon worker task failed"),
        }
    }
    tracing::info!(downloaded, "icon queue drained");

    match last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Downloads one cover into `dest`; returns false when the destination
/// already exists
async fn fetch_and_store(
    client: &Client,
    entry: &QueuedIcon,
    dest: &Path,
) -> Result<bool, IconError> {
    if dest.exists() {
        return Ok(false);
    }
    tracing::debug!(id = entry.id, url = %entry.url, "downloading cover");

    let response = client.get(&entry.url).send().await?;
    let status = response.status();
    if status.as_u16() > 299 {
        return Err(IconError::Status {
            id: entry.id,
            status,
        });
    }
    let bytes = response.bytes().await?;

    let squared = square(image::load_from_memory(&bytes)?);
    let mut encoded = Cursor::new(Vec::new());
    squared.write_to(&mut encoded, ImageFormat::Png)?;
    write_atomic(dest, encoded.get_ref())?;
    Ok(true)
}

/// Centers the image on a transparent square canvas sized to its larger
/// dimension, preserving the aspect ratio of non-square covers
fn square(img: DynamicImage) -> RgbaImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == height {
        return rgba;
    }

    let side = width.max(height);
    let mut canvas = RgbaImage::new(side, side);
    let x = i64::from((side - width) / 2);
    let y = i64::from((side - height) / 2);
    imageops::overlay(&mut canvas, &rgba, x, y);
    canvas
}
