//! Integration tests for the icon download pipeline
//!
//! Serves covers from a loopback HTTP listener and drains a real queue,
//! checking the downloaded files land squared, PNG-encoded and sharded.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use booksearch::icons::{worker, IconCache, QUEUE_FILE};

/// Encodes a solid-color JPEG of the given size
fn jpeg_cover(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 100, 50])));
    let mut encoded = Cursor::new(Vec::new());
    img.write_to(&mut encoded, ImageFormat::Jpeg).unwrap();
    encoded.into_inner()
}

/// Answers every request with the given status and body
async fn serve(listener: TcpListener, status_line: &'static str, body: Vec<u8>, hits: Arc<AtomicUsize>) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            break;
        };
        hits.fetch_add(1, Ordering::SeqCst);
        let body = body.clone();
        tokio::spawn(async move {
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let header = format!(
                "{status_line}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(header.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
    }
}

#[tokio::test]
async fn test_drain_downloads_squares_and_stores_covers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    tokio::spawn(serve(
        listener,
        "HTTP/1.1 200 OK",
        jpeg_cover(60, 40),
        Arc::clone(&hits),
    ));

    let dir = TempDir::new().unwrap();
    let mut cache = IconCache::open(dir.path()).unwrap();
    cache.add(42, &format!("http://{addr}/covers/42.jpg"));
    cache.add(47212, &format!("http://{addr}/covers/47212.jpg"));
    cache.flush().unwrap();

    // A later invocation takes over the persisted queue and drains it.
    let mut cache = IconCache::open(dir.path()).unwrap();
    assert!(cache.has_pending());
    worker::drain(&mut cache).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(!cache.has_pending());
    let queue = std::fs::read_to_string(dir.path().join("icons").join(QUEUE_FILE)).unwrap();
    assert_eq!(queue, "", "queue file should be consumed");

    // Files land in the numeric shard layout.
    let dest = cache.icon_path(42);
    assert_eq!(dest, dir.path().join("icons/00/42/42.png"));
    assert!(dest.exists());
    assert!(cache.icon_path(47212).ends_with("icons/47/21/47212.png"));

    // The 60x40 cover was squared onto a transparent 60x60 canvas.
    let stored = image::open(&dest).unwrap();
    assert_eq!(stored.dimensions(), (60, 60));
    let rgba = stored.to_rgba8();
    assert_eq!(rgba.get_pixel(0, 0)[3], 0, "corner should be transparent");
    assert_eq!(rgba.get_pixel(30, 30)[3], 255, "center should be opaque");
}

#[tokio::test]
async fn test_drain_reports_failed_downloads() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    tokio::spawn(serve(
        listener,
        "HTTP/1.1 404 Not Found",
        Vec::new(),
        Arc::clone(&hits),
    ));

    let dir = TempDir::new().unwrap();
    let mut cache = IconCache::open(dir.path()).unwrap();
    cache.add(7, &format!("http://{addr}/covers/7.jpg"));

    let err = worker::drain(&mut cache).await.unwrap_err();
    assert!(err.to_string().contains("404"), "unexpected error: {err}");
    assert!(!cache.icon_path(7).exists());
}

#[tokio::test]
async fn test_drain_attempts_every_entry_despite_failures() {
    // One host serves real covers, the other only errors.
    let good_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let good_addr = good_listener.local_addr().unwrap();
    tokio::spawn(serve(
        good_listener,
        "HTTP/1.1 200 OK",
        jpeg_cover(50, 50),
        Arc::new(AtomicUsize::new(0)),
    ));

    let bad_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bad_addr = bad_listener.local_addr().unwrap();
    tokio::spawn(serve(
        bad_listener,
        "HTTP/1.1 500 Internal Server Error",
        Vec::new(),
        Arc::new(AtomicUsize::new(0)),
    ));

    let dir = TempDir::new().unwrap();
    let mut cache = IconCache::open(dir.path()).unwrap();
    cache.add(1, &format!("http://{bad_addr}/covers/1.jpg"));
    cache.add(2, &format!("http://{good_addr}/covers/2.jpg"));
    cache.add(3, &format!("http://{good_addr}/covers/3.jpg"));

    // The failure is reported, but the good covers still landed.
    worker::drain(&mut cache).await.unwrap_err();
    assert!(!cache.icon_path(1).exists());
    assert!(cache.icon_path(2).exists());
    assert!(cache.icon_path(3).exists());
}
