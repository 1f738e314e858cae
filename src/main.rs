//! booksearch - a launcher plugin for a book catalog
//!
//! Searches books, browses author bibliographies and manages shelves,
//! answering from an on-disk cache that detached background jobs keep
//! fresh. Stdout carries the feedback document consumed by the host
//! launcher; everything else logs to stderr.

mod app;
mod cache;
mod catalog;
mod cli;
mod config;
mod feedback;
mod icons;
mod jobs;
mod update;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    app::run(cli.command).await?;
    Ok(())
}
