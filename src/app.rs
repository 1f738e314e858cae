//! Command implementations
//!
//! One function per subcommand. Interactive views answer from the cache,
//! schedule background refreshes and print a feedback document; actions
//! print a one-line notification; background jobs hold a job lock,
//! refresh the cache and propagate failures through the exit code.
//! Stdout belongs to the feedback document, so everything else logs to
//! stderr.

use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::cache::janitor;
use crate::cache::{self, CacheError, CacheKey, CacheStore, JSON_EXT};
use crate::catalog::client::REQUEST_INTERVAL;
use crate::catalog::{
    display_title, pages, throttle, Book, CatalogClient, CatalogError, Shelf, ShelfBooks,
    Throttle, AUTHOR_PAGE_SIZE, SHELF_PAGE_SIZE, SHELVES_PAGE_SIZE,
};
use crate::cli::Command;
use crate::config::{ConfigError, Settings};
use crate::feedback::{Feedback, Item};
use crate::icons::{worker, IconCache, IconError};
use crate::jobs::{self, JobError, JobGuard};
use crate::update::{self, UpdateError};

/// Jitter window subtracted from the cover max age during cleanup, so a
/// burst of covers cached together does not expire in one sweep
const ICON_JITTER_WINDOW: Duration = Duration::from_secs(72 * 3600);

/// Umbrella error for one invocation
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Icons(#[from] IconError),

    #[error(transparent)]
    Jobs(#[from] JobError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("feedback could not be rendered: {0}")]
    Feedback(#[from] serde_json::Error),
}

/// Runs one parsed command end to end
pub async fn run(command: Command) -> Result<(), AppError> {
    let app = match Settings::load().map_err(AppError::from).and_then(App::new) {
        Ok(app) => app,
        Err(err) if command.renders_feedback() => return emit(Err(err)),
        Err(err) => return Err(err),
    };

    match command {
        Command::Search { query } => emit(app.search(&query).await),
        Command::Author { id, name } => emit(app.author(id, &name).await),
        Command::Shelves => emit(app.shelves().await),
        Command::Shelf { name } => emit(app.shelf(&name).await),
        Command::Config => emit(app.config_view()),
        Command::Add {
            book_id,
            title,
            shelves,
        } => notify(app.add(book_id, &title, &shelves).await),
        Command::Remove {
            book_id,
            title,
            shelf,
        } => notify(app.remove(book_id, &title, &shelf).await),
        Command::SaveBooks { id, name } => app.save_books(id, &name).await,
        Command::SaveShelves => app.save_shelves().await,
        Command::SaveShelf { name } => app.save_shelf(&name).await,
        Command::Icons => app.drain_icons().await,
        Command::Housekeeping => app.housekeeping().await,
    }
}

/// Prints a feedback document, turning errors into a rendered error row
fn emit(result: Result<Feedback, AppError>) -> Result<(), AppError> {
    let feedback = match result {
        Ok(feedback) => feedback,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            let mut feedback = Feedback::new();
            feedback.push(Item::hint(format!("Error: {err}")).with_subtitle("See logs for details"));
            feedback
        }
    };
    Ok(feedback.emit()?)
}

/// Prints an action notification, turning errors into a failure line
fn notify(result: Result<String, AppError>) -> Result<(), AppError> {
    match result {
        Ok(message) => println!("{message}"),
        Err(err) => {
            tracing::error!(error = %err, "action failed");
            println!("Failed: {err}");
        }
    }
    Ok(())
}

/// Shared handles for one invocation
struct App {
    settings: Settings,
    store: CacheStore,
}

impl App {
    fn new(settings: Settings) -> Result<Self, AppError> {
        let store = settings.cache_store()?;
        store.ensure_layout(&cache::CLASSES)?;
        store.ensure_layout(&[jobs::JOBS_DIR])?;
        Ok(Self { settings, store })
    }

    fn client(&self) -> Result<CatalogClient, AppError> {
        let api_key = self.settings.require_api_key()?;
        let throttle = Throttle::new(
            REQUEST_INTERVAL,
            self.store.root().join(throttle::STATE_FILE),
        );
        Ok(CatalogClient::new(&self.settings.base_url, api_key, throttle)?)
    }

    /// `search <query>`: throttled catalog search, answered from the
    /// cache while fresh
    async fn search(&self, query: &str) -> Result<Feedback, AppError> {
        let query = query.trim();
        let mut feedback = Feedback::new();
        if query.chars().count() < self.settings.min_query_len {
            feedback.push(Item::hint("Keep typing to search the catalog"));
            return Ok(feedback);
        }

        let key = CacheKey::hashed(cache::SEARCH, &query.to_lowercase());
        let client = self.client()?;
        let books: Vec<Book> = self
            .store
            .load_or_store(&key, self.settings.search_max_age(), || async {
                Ok::<_, AppError>(client.search(query).await?)
            })
            .await?;

        let mut icons = IconCache::open(self.store.root())?;
        if books.is_empty() {
            feedback.push(Item::hint(format!("No results for \"{query}\"")));
        }
        for book in &books {
            feedback.push(book_item(book, &mut icons));
        }
        self.schedule_icons(&mut icons, &mut feedback)?;
        Ok(feedback)
    }

    /// `author`: renders the cached bibliography, scheduling a refresh
    /// when the entry is expired or missing
    async fn author(&self, id: u64, name: &str) -> Result<Feedback, AppError> {
        let key = CacheKey::numeric(cache::AUTHORS, id, JSON_EXT);
        let mut feedback = Feedback::new();

        if self.store.expired(&key, self.settings.default_max_age()) {
            let id_arg = id.to_string();
            soft_run(
                self.store.root(),
                jobs::BOOKLIST,
                &["save-books", "--id", &id_arg, "--name", name],
            );
        }
        if !self.store.exists(&key) {
            feedback.push(Item::hint(format!("Loading books by {name}")));
            feedback.rerun();
            return Ok(feedback);
        }

        let books: Vec<Book> = self.store.read(&key)?;
        let mut icons = IconCache::open(self.store.root())?;
        if books.is_empty() {
            feedback.push(Item::hint(format!("No books recorded for {name}")));
        }
        for book in &books {
            feedback.push(book_item(book, &mut icons));
        }
        if jobs::is_running(self.store.root(), jobs::BOOKLIST) {
            feedback.rerun();
        }
        self.schedule_icons(&mut icons, &mut feedback)?;
        Ok(feedback)
    }

    /// `save-books`: fetches the full bibliography page by page
    async fn save_books(&self, id: u64, name: &str) -> Result<(), AppError> {
        let Some(_guard) = JobGuard::acquire(self.store.root(), jobs::BOOKLIST)? else {
            tracing::info!("booklist job already running, exiting");
            return Ok(());
        };

        let key = CacheKey::numeric(cache::AUTHORS, id, JSON_EXT);
        let write_partial = !self.store.exists(&key);
        tracing::info!(author = name, id, write_partial, "refreshing bibliography");

        let client = self.client()?;
        let store = &self.store;
        let books = pages::fetch_all(
            AUTHOR_PAGE_SIZE,
            Some(self.settings.max_books),
            write_partial,
            |page| {
                let client = &client;
                async move { Ok::<_, AppError>(client.author_books(id, page).await?) }
            },
            |books, _page| Ok(store.write(&key, &books)?),
        )
        .await?;

        self.queue_covers(&books)?;
        tracing::info!(author = name, count = books.len(), "bibliography refreshed");
        Ok(())
    }

    /// `shelves`: renders the cached shelf list
    async fn shelves(&self) -> Result<Feedback, AppError> {
        let mut feedback = Feedback::new();
        if self.settings.user_id.is_none() {
            feedback.push(missing_user_hint());
            return Ok(feedback);
        }

        let key = shelves_key();
        if self.store.expired(&key, self.settings.shelf_max_age()) {
            soft_run(self.store.root(), jobs::SHELVES, &["save-shelves"]);
        }
        if !self.store.exists(&key) {
            feedback.push(Item::hint("Loading your shelves"));
            feedback.rerun();
            return Ok(feedback);
        }

        let shelves: Vec<Shelf> = self.store.read(&key)?;
        for shelf in &shelves {
            feedback.push(
                Item::new(shelf.display_title())
                    .with_subtitle(format!("{} books", shelf.size))
                    .with_arg(shelf.name.clone())
                    .with_uid(format!("shelf-{}", shelf.id))
                    .with_autocomplete(shelf.name.clone()),
            );
        }
        if jobs::is_running(self.store.root(), jobs::SHELVES) {
            feedback.rerun();
        }
        Ok(feedback)
    }

    /// `save-shelves`: refreshes the shelf list page by page
    async fn save_shelves(&self) -> Result<(), AppError> {
        let Some(_guard) = JobGuard::acquire(self.store.root(), jobs::SHELVES)? else {
            tracing::info!("shelves job already running, exiting");
            return Ok(());
        };

        let user_id = self.settings.require_user_id()?;
        let key = shelves_key();
        let write_partial = !self.store.exists(&key);
        tracing::info!(user_id, write_partial, "refreshing shelf list");

        let client = self.client()?;
        let store = &self.store;
        let shelves = pages::fetch_all(
            SHELVES_PAGE_SIZE,
            None,
            write_partial,
            |page| {
                let client = &client;
                async move { Ok::<_, AppError>(client.user_shelves(user_id, page).await?) }
            },
            |shelves, _page| Ok(store.write(&key, &shelves)?),
        )
        .await?;

        tracing::info!(count = shelves.len(), "shelf list refreshed");
        Ok(())
    }

    /// `shelf`: renders one cached shelf's books
    async fn shelf(&self, name: &str) -> Result<Feedback, AppError> {
        let mut feedback = Feedback::new();
        if self.settings.user_id.is_none() {
            feedback.push(missing_user_hint());
            return Ok(feedback);
        }

        let key = shelf_key(name);
        let job = jobs::shelf_job(name);
        if self.store.expired(&key, self.settings.shelf_max_age()) {
            soft_run(self.store.root(), &job, &["save-shelf", "--name", name]);
        }
        if !self.store.exists(&key) {
            feedback.push(Item::hint(format!("Loading {}", display_title(name))));
            feedback.rerun();
            return Ok(feedback);
        }

        let shelf: ShelfBooks = self.store.read(&key)?;
        let mut icons = IconCache::open(self.store.root())?;
        if shelf.books.is_empty() {
            feedback.push(Item::hint(format!("{} is empty", display_title(name))));
        }
        for book in &shelf.books {
            feedback.push(book_item(book, &mut icons));
        }
        let partial = shelf.books.len() < shelf.total as usize;
        if partial || jobs::is_running(self.store.root(), &job) {
            feedback.rerun();
        }
        self.schedule_icons(&mut icons, &mut feedback)?;
        Ok(feedback)
    }

    /// `save-shelf`: refreshes one shelf's contents page by page
    async fn save_shelf(&self, name: &str) -> Result<(), AppError> {
        let job = jobs::shelf_job(name);
        let Some(_guard) = JobGuard::acquire(self.store.root(), &job)? else {
            tracing::info!(shelf = name, "shelf job already running, exiting");
            return Ok(());
        };

        let user_id = self.settings.require_user_id()?;
        let key = shelf_key(name);
        let write_partial = !self.store.exists(&key);
        tracing::info!(shelf = name, user_id, write_partial, "refreshing shelf");

        let client = self.client()?;
        let store = &self.store;
        let books = pages::fetch_all(
            SHELF_PAGE_SIZE,
            None,
            write_partial,
            |page| {
                let client = &client;
                async move { Ok::<_, AppError>(client.shelf_books(user_id, name, page).await?) }
            },
            |books, page| {
                let entry = ShelfBooks {
                    name: name.to_string(),
                    total: page.total,
                    books: books.to_vec(),
                };
                Ok(store.write(&key, &entry)?)
            },
        )
        .await?;

        self.queue_covers(&books)?;
        tracing::info!(shelf = name, count = books.len(), "shelf refreshed");
        Ok(())
    }

    /// `add`: adds a book to shelves and schedules their refresh
    async fn add(&self, book_id: u64, title: &str, shelves: &[String]) -> Result<String, AppError> {
        let client = self.client()?;
        client.add_to_shelves(book_id, shelves).await?;

        for shelf in shelves {
            soft_run(
                self.store.root(),
                &jobs::shelf_job(shelf),
                &["save-shelf", "--name", shelf],
            );
        }
        let names: Vec<String> = shelves.iter().map(|shelf| display_title(shelf)).collect();
        Ok(format!("Added \"{title}\" to {}", names.join(", ")))
    }

    /// `remove`: removes a book from a shelf and patches the cached
    /// entry so the next render is already correct
    async fn remove(&self, book_id: u64, title: &str, shelf: &str) -> Result<String, AppError> {
        let client = self.client()?;
        client.remove_from_shelf(book_id, shelf).await?;

        if let Err(err) = self.patch_cached_shelf(book_id, shelf) {
            tracing::warn!(shelf, error = %err, "could not patch cached shelf");
        }
        soft_run(
            self.store.root(),
            &jobs::shelf_job(shelf),
            &["save-shelf", "--name", shelf],
        );
        Ok(format!("Removed \"{title}\" from {}", display_title(shelf)))
    }

    fn patch_cached_shelf(&self, book_id: u64, shelf: &str) -> Result<(), AppError> {
        let key = shelf_key(shelf);
        if !self.store.exists(&key) {
            return Ok(());
        }
        let mut entry: ShelfBooks = self.store.read(&key)?;
        let before = entry.books.len();
        entry.books.retain(|book| book.id != book_id);
        if entry.books.len() == before {
            return Ok(());
        }
        entry.total = entry
            .total
            .saturating_sub((before - entry.books.len()) as u32);
        self.store.write(&key, &entry)?;
        Ok(())
    }

    /// `icons`: drains the cover download queue
    async fn drain_icons(&self) -> Result<(), AppError> {
        let Some(_guard) = JobGuard::acquire(self.store.root(), jobs::ICONS)? else {
            tracing::info!("icons job already running, exiting");
            return Ok(());
        };

        let mut icons = IconCache::open(self.store.root())?;
        worker::drain(&mut icons).await?;
        Ok(())
    }

    /// `housekeeping`: sweeps stale cache entries and checks for updates
    ///
    /// The three tasks run concurrently; partial failures are logged and
    /// the last one decides the exit code.
    async fn housekeeping(&self) -> Result<(), AppError> {
        let Some(_guard) = JobGuard::acquire(self.store.root(), jobs::HOUSEKEEPING)? else {
            tracing::info!("housekeeping job already running, exiting");
            return Ok(());
        };
        tracing::info!(root = %self.store.root().display(), "housekeeping started");

        let icons_root = self.store.root().join(cache::ICONS);
        let icons_age = self.settings.icons_max_age();
        let icon_sweep = tokio::task::spawn_blocking(move || {
            janitor::clean(&icons_root, janitor::jittered(icons_age, ICON_JITTER_WINDOW))
        });

        let data_root = self.store.root().to_path_buf();
        let data_age = self.settings.default_max_age();
        let data_sweep = tokio::task::spawn_blocking(move || {
            for class in [cache::SEARCH, cache::AUTHORS, cache::SHELVES, cache::CHECK] {
                janitor::clean(&data_root.join(class), || data_age)?;
            }
            Ok::<_, CacheError>(())
        });

        let update_check = async {
            match self.settings.release_url() {
                Some(url) => update::check(&self.store, url, self.settings.default_max_age())
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let (icon_sweep, data_sweep, update_result) =
            tokio::join!(icon_sweep, data_sweep, update_check);

        let mut failed = None;
        if let Err(err) = flatten(icon_sweep) {
            tracing::warn!(error = %err, "icon sweep failed");
            failed = Some(err);
        }
        if let Err(err) = flatten(data_sweep) {
            tracing::warn!(error = %err, "data sweep failed");
            failed = Some(err);
        }
        match update_result {
            Ok(Some(info)) if info.is_newer() => {
                tracing::info!(version = %info.version, "newer release available");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "update check failed");
                failed = Some(err.into());
            }
        }

        tracing::info!("housekeeping finished");
        match failed {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// `config`: shows effective settings and any pending update
    fn config_view(&self) -> Result<Feedback, AppError> {
        let mut feedback = Feedback::new();

        if let Some(info) = update::cached(&self.store) {
            if info.is_newer() {
                feedback.push(
                    Item::hint(format!("Update available: {}", info.version))
                        .with_subtitle(format!("Running {}", update::CURRENT_VERSION)),
                );
            }
        }

        match &self.settings.api_key {
            Some(_) => feedback.push(Item::hint("API key configured")),
            None => feedback.push(
                Item::hint("No API key")
                    .with_subtitle("Set BOOKSEARCH_API_KEY to enable remote search"),
            ),
        }
        match self.settings.user_id {
            Some(user_id) => feedback.push(Item::hint(format!("User ID {user_id}"))),
            None => feedback.push(
                Item::hint("No user ID").with_subtitle("Set BOOKSEARCH_USER_ID to enable shelves"),
            ),
        }
        feedback.push(Item::hint(format!(
            "Cache directory {}",
            self.store.root().display()
        )));
        feedback.push(
            Item::hint(format!(
                "Search results cached for {}",
                fmt_minutes(self.settings.search_cache_minutes)
            ))
            .with_subtitle(format!(
                "Bibliographies {}, shelves {}, covers {}",
                fmt_minutes(self.settings.default_cache_minutes),
                fmt_minutes(self.settings.shelf_cache_minutes),
                fmt_minutes(self.settings.icons_cache_minutes)
            )),
        );
        feedback.push(Item::hint(format!(
            "Fetching up to {} books per author",
            self.settings.max_books
        )));
        Ok(feedback)
    }

    /// Flushes queued covers and spawns the download job, asking the
    /// host to re-invoke once it lands
    fn schedule_icons(&self, icons: &mut IconCache, feedback: &mut Feedback) -> Result<(), AppError> {
        if !icons.has_pending() {
            return Ok(());
        }
        icons.flush()?;
        soft_run(self.store.root(), jobs::ICONS, &["icons"]);
        feedback.rerun();
        Ok(())
    }

    /// Queues missing covers for freshly fetched books and starts the
    /// download job
    fn queue_covers(&self, books: &[Book]) -> Result<(), AppError> {
        let mut icons = IconCache::open(self.store.root())?;
        for book in books {
            icons.add(book.id, &book.image_url);
        }
        if icons.has_pending() {
            icons.flush()?;
            soft_run(self.store.root(), jobs::ICONS, &["icons"]);
        }
        Ok(())
    }
}

fn book_item(book: &Book, icons: &mut IconCache) -> Item {
    let icon = icons.display_icon(book.id, &book.image_url);
    Item::new(&book.title)
        .with_subtitle(book.subtitle())
        .with_arg(book.url.clone())
        .with_uid(format!("book-{}", book.id))
        .with_icon(icon.to_string_lossy())
}

fn missing_user_hint() -> Item {
    Item::hint("No user configured").with_subtitle("Set BOOKSEARCH_USER_ID to browse your shelves")
}

/// Launches a background job, logging instead of failing the interactive
/// path when the spawn does not work
fn soft_run(root: &Path, name: &str, args: &[&str]) {
    if let Err(err) = jobs::run(root, name, args) {
        tracing::warn!(job = name, error = %err, "could not launch background job");
    }
}

fn flatten(
    joined: Result<Result<(), CacheError>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => Ok(result?),
        Err(err) => Err(AppError::Cache(CacheError::Io(io::Error::other(err)))),
    }
}

fn shelves_key() -> CacheKey {
    CacheKey::literal(cache::SHELVES, "shelves.json")
}

fn shelf_key(name: &str) -> CacheKey {
    CacheKey::hashed(cache::SHELVES, name)
}

fn fmt_minutes(minutes: u64) -> String {
    if minutes == 0 {
        return "0m".to_string();
    }
    if minutes % (24 * 60) == 0 {
        return format!("{}d", minutes / (24 * 60));
    }
    if minutes % 60 == 0 {
        return format!("{}h", minutes / 60);
    }
    format!("{minutes}m")
}
