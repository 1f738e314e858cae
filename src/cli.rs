//! Command-line interface parsing
//!
//! Every invocation of the executable runs exactly one subcommand: an
//! interactive view that prints feedback JSON, an action that prints a
//! one-line notification, or a background job that refreshes the cache
//! and exits.

use clap::{Parser, Subcommand};

/// Launcher plugin for searching a book catalog and managing shelves
#[derive(Parser, Debug)]
#[command(name = "booksearch")]
#[command(about = "Search a book catalog and manage shelves from a launcher")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Search the catalog (interactive)
    Search {
        /// Free-text query, exactly as typed in the launcher
        #[arg(default_value = "")]
        query: String,
    },

    /// Browse an author's bibliography from the cache (interactive)
    Author {
        /// Author ID in the catalog
        #[arg(long)]
        id: u64,
        /// Author name, for display and logs
        #[arg(long)]
        name: String,
    },

    /// Fetch an author's full bibliography into the cache (background)
    SaveBooks {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        name: String,
    },

    /// List the configured user's shelves (interactive)
    Shelves,

    /// Refresh the shelf list (background)
    SaveShelves,

    /// Browse one shelf's books from the cache (interactive)
    Shelf {
        /// Shelf slug, e.g. "currently-reading"
        #[arg(long)]
        name: String,
    },

    /// Refresh one shelf's contents (background)
    SaveShelf {
        #[arg(long)]
        name: String,
    },

    /// Add a book to one or more shelves (action)
    Add {
        #[arg(long)]
        book_id: u64,
        /// Book title, echoed in the confirmation
        #[arg(long)]
        title: String,
        /// Target shelf slug; repeat the flag for multiple shelves
        #[arg(long = "shelf", required = true)]
        shelves: Vec<String>,
    },

    /// Remove a book from a shelf (action)
    Remove {
        #[arg(long)]
        book_id: u64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        shelf: String,
    },

    /// Download queued cover icons (background)
    Icons,

    /// Clean stale cache entries and check for updates (background)
    Housekeeping,

    /// Show effective settings (interactive)
    Config,
}

impl Command {
    /// Whether this command answers with a feedback document on stdout
    ///
    /// Feedback commands report failures as rendered error rows rather
    /// than exit codes, so the launcher always has something to show.
    pub fn renders_feedback(&self) -> bool {
        matches!(
            self,
            Command::Search { .. }
                | Command::Author { .. }
                | Command::Shelves
                | Command::Shelf { .. }
                | Command::Config
        )
    }
}
