//! SearchIndex - main API for indexing and searching.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use super::auto_update::{AutoUpdateHandle, UpdateTarget};
use super::engine::{quick_search, search_catalog};
use crate::cancel::{CancellationSource, CancellationToken};
use crate::catalog::{Catalog, EntryMap};
use crate::classify::should_index;
use crate::clock::{unix_secs, Clock, SystemClock};
use crate::config::IndexConfig;
use crate::error::{canonicalize_existing_path, IndexError, Result};
use crate::events::{ListenerId, ListenerRegistry, UpdateListener};
use crate::indexer::{create_entry, walk_roots, IndexBuildProgress, ProgressCallback, WalkData};
use crate::persistence::{self, PersistedIndex};
use crate::types::{
    IndexEntry, IndexStats, IndexUpdateEvent, SearchQuery, SearchResult, UpdateKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Rebuild,
    Update,
}

impl PassKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Rebuild => "rebuild",
            Self::Update => "update",
        }
    }
}

/// Clears the indexing flag when a pass ends, including by panic.
struct IndexingGuard<'a>(&'a AtomicBool);

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State shared with the auto-update and async search threads.
#[derive(Debug)]
struct IndexShared {
    clock: Arc<dyn Clock>,
    config: RwLock<IndexConfig>,
    initialized: AtomicBool,
    catalog: Catalog,
    stats: Mutex<IndexStats>,
    indexing: AtomicBool,
    progress: IndexBuildProgress,
    index_cancel: CancellationSource,
    search_cancel: CancellationSource,
    listeners: ListenerRegistry,
}

/// Persistent, incrementally updated file search index.
///
/// Searches read the catalog concurrently with an index pass; a pass only
/// blocks readers for the instant it swaps its result in.
#[derive(Debug)]
pub struct SearchIndex {
    shared: Arc<IndexShared>,
    auto_update: Mutex<Option<AutoUpdateHandle>>,
    async_searches: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an index that stamps entries and events with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(IndexShared {
                clock,
                config: RwLock::new(IndexConfig::default()),
                initialized: AtomicBool::new(false),
                catalog: Catalog::new(),
                stats: Mutex::new(IndexStats::default()),
                indexing: AtomicBool::new(false),
                progress: IndexBuildProgress::default(),
                index_cancel: CancellationSource::new(),
                search_cancel: CancellationSource::new(),
                listeners: ListenerRegistry::default(),
            }),
            auto_update: Mutex::new(None),
            async_searches: Mutex::new(Vec::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Stores the configuration and prepares the snapshot location.
    ///
    /// Does not index anything.
    pub fn initialize(&self, config: IndexConfig) -> bool {
        let config = prepare_config(config);
        if let Some(parent) = config.cache_path.as_deref().and_then(Path::parent) {
            if let Err(error) = fs::create_dir_all(parent) {
                log::warn!("cannot prepare index cache directory {}: {error}", parent.display());
                self.shared.emit(
                    UpdateKind::Error,
                    Some(parent.to_path_buf()),
                    format!("cannot prepare index cache directory: {error}"),
                );
                return false;
            }
        }
        log::info!("search index initialized with {} root(s)", config.roots.len());
        *self.shared.config.write() = config;
        self.shared.initialized.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// Stops background work, cancels in-flight operations and joins every
    /// thread this index spawned.
    pub fn shutdown(&self) {
        self.stop_auto_update();
        self.shared.index_cancel.cancel();
        self.shared.search_cancel.cancel();
        let searches: Vec<JoinHandle<()>> = self.async_searches.lock().drain(..).collect();
        for handle in searches {
            if handle.join().is_err() {
                log::warn!("async search thread panicked");
            }
        }
        self.shared.initialized.store(false, Ordering::SeqCst);
    }

    /// Returns a copy of the active configuration.
    pub fn config(&self) -> IndexConfig {
        self.shared.config.read().clone()
    }

    /// Replaces the configuration; takes effect on the next index pass.
    pub fn set_config(&self, config: IndexConfig) {
        *self.shared.config.write() = prepare_config(config);
    }

    // -----------------------------------------------------------------------
    // Indexing
    // -----------------------------------------------------------------------

    /// Re-walks every root and swaps the result in atomically.
    ///
    /// Returns false without waiting when another pass is running or the index
    /// is not initialized. A cancelled pass returns true and leaves the
    /// previous catalog in place.
    pub fn rebuild_index(&self, progress: Option<&ProgressCallback<'_>>) -> bool {
        let token = self.shared.index_cancel.token();
        self.shared.run_pass(PassKind::Rebuild, progress, token)
    }

    /// Like [`Self::rebuild_index`], but keeps entries whose files did not
    /// change and reports per-path `Added`/`Modified`/`Removed` events.
    pub fn update_index(&self, progress: Option<&ProgressCallback<'_>>) -> bool {
        let token = self.shared.index_cancel.token();
        self.shared.run_pass(PassKind::Update, progress, token)
    }

    /// Cancels the running index pass, if any.
    pub fn cancel_indexing(&self) {
        self.shared.index_cancel.cancel();
    }

    pub fn is_indexing(&self) -> bool {
        self.shared.indexing.load(Ordering::SeqCst)
    }

    /// Progress of the running pass in `[0, 1]`; 1.0 when idle.
    pub fn indexing_progress(&self) -> f32 {
        self.shared.progress.clamped_fraction()
    }

    /// Indexes a single path.
    pub fn add_to_index(&self, path: &Path) -> bool {
        let result = self.shared.add_path(path);
        self.shared.report("add", result).unwrap_or(false)
    }

    /// Removes a path and, for directories, everything below it.
    pub fn remove_from_index(&self, path: &Path) -> bool {
        let result = self.shared.remove_path(path);
        self.shared.report("remove", result).unwrap_or(false)
    }

    /// Re-reads a single path, dropping it when it no longer exists.
    pub fn update_entry(&self, path: &Path) -> bool {
        let result = self.shared.refresh_path(path);
        self.shared.report("update", result).unwrap_or(false)
    }

    /// Removes every entry.
    pub fn clear_index(&self) {
        self.shared.catalog.clear();
        self.shared.recount_stats();
    }

    // -----------------------------------------------------------------------
    // Searching
    // -----------------------------------------------------------------------

    pub fn search(&self, query: &SearchQuery) -> Vec<SearchResult> {
        let token = self.shared.search_cancel.token();
        self.shared.search(query, &token)
    }

    /// Runs a search on a background thread and hands the results to
    /// `on_results`. `cancel_search` and `shutdown` stop it early.
    pub fn search_async<F>(&self, query: SearchQuery, on_results: F)
    where
        F: FnOnce(Vec<SearchResult>) + Send + 'static,
    {
        let token = self.shared.search_cancel.token();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("search-index-search".into())
            .spawn(move || on_results(shared.search(&query, &token)));

        match spawned {
            Ok(handle) => {
                let mut searches = self.async_searches.lock();
                searches.retain(|handle| !handle.is_finished());
                searches.push(handle);
            }
            Err(error) => {
                log::warn!("failed to spawn search thread: {error}");
                self.shared
                    .emit(UpdateKind::Error, None, format!("search could not start: {error}"));
            }
        }
    }

    /// Cancels every search started before this call.
    pub fn cancel_search(&self) {
        self.shared.search_cancel.cancel();
    }

    /// Case-insensitive filename substring lookup; `max_results == 0` means
    /// unlimited.
    pub fn quick_search(&self, pattern: &str, max_results: usize) -> Vec<PathBuf> {
        let token = self.shared.search_cancel.token();
        quick_search(&self.shared.catalog.read(), pattern, max_results, &token)
    }

    pub fn is_indexed(&self, path: &Path) -> bool {
        self.shared.catalog.contains(&lookup_path(path))
    }

    pub fn get_entry(&self, path: &Path) -> Option<IndexEntry> {
        self.shared.catalog.get(&lookup_path(path))
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Writes a snapshot to the configured cache path.
    pub fn save_index(&self) -> bool {
        let result = self
            .shared
            .cache_path()
            .and_then(|path| self.shared.save_snapshot(&path));
        self.shared.report("save", result).is_some()
    }

    /// Replaces the catalog with the configured snapshot. On failure the
    /// catalog is left as it was.
    pub fn load_index(&self) -> bool {
        let result = self
            .shared
            .cache_path()
            .and_then(|path| persistence::load_from_file(&path));
        match self.shared.report("load", result) {
            Some(index) => {
                self.shared.install_snapshot(index);
                true
            }
            None => false,
        }
    }

    /// Writes the catalog (without content) as JSON to `path`.
    pub fn export_index(&self, path: &Path) -> bool {
        let index = self.shared.snapshot();
        let result = persistence::export_json(path, &index);
        self.shared.report("export", result).is_some()
    }

    /// Replaces the catalog with a JSON export.
    pub fn import_index(&self, path: &Path) -> bool {
        let result = persistence::import_json(path);
        match self.shared.report("import", result) {
            Some(index) => {
                self.shared.install_snapshot(index);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    pub fn statistics(&self) -> IndexStats {
        self.shared.stats.lock().clone()
    }

    /// Returns true when every indexed path still exists.
    pub fn verify_index(&self) -> bool {
        let paths: Vec<PathBuf> = self
            .shared
            .catalog
            .read()
            .values()
            .map(|entry| entry.path.clone())
            .collect();
        let missing = paths
            .par_iter()
            .filter(|path| fs::symlink_metadata(path).is_err())
            .count();
        if missing > 0 {
            log::info!("index verification: {missing} of {} paths missing", paths.len());
        }
        missing == 0
    }

    // -----------------------------------------------------------------------
    // Auto update
    // -----------------------------------------------------------------------

    /// Starts periodic `update_index` calls. No-op when already running.
    pub fn start_auto_update(&self) {
        let mut slot = self.auto_update.lock();
        if slot.as_ref().is_some_and(AutoUpdateHandle::is_running) {
            return;
        }
        let interval = self.shared.config.read().update_interval();
        let target: Arc<dyn UpdateTarget> = self.shared.clone();
        match AutoUpdateHandle::spawn(target, interval) {
            Ok(handle) => *slot = Some(handle),
            Err(error) => {
                log::warn!("failed to start auto-update: {error}");
                self.shared
                    .emit(UpdateKind::Error, None, format!("auto-update could not start: {error}"));
            }
        }
    }

    /// Stops the auto-update loop, cancelling a running cycle, and joins it.
    pub fn stop_auto_update(&self) {
        let handle = self.auto_update.lock().take();
        if let Some(mut handle) = handle {
            handle.stop();
        }
    }

    pub fn is_auto_update_running(&self) -> bool {
        self.auto_update
            .lock()
            .as_ref()
            .is_some_and(AutoUpdateHandle::is_running)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    pub fn on_index_update<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&IndexUpdateEvent) + Send + Sync + 'static,
    {
        let listener: UpdateListener = Arc::new(listener);
        self.shared.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }
}

impl Drop for SearchIndex {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl UpdateTarget for IndexShared {
    fn cycle_token(&self) -> CancellationToken {
        self.index_cancel.token()
    }

    fn run_update_cycle(&self, cancel: CancellationToken) {
        if self.indexing.load(Ordering::SeqCst) {
            log::debug!("auto-update skipped: indexing already in progress");
            return;
        }
        self.run_pass(PassKind::Update, None, cancel);
    }

    fn cancel_update_cycle(&self) {
        self.index_cancel.cancel();
    }
}

impl IndexShared {
    fn emit(&self, kind: UpdateKind, path: Option<PathBuf>, message: impl Into<String>) {
        let event = IndexUpdateEvent::new(kind, path, message).at(self.clock.now());
        self.listeners.emit(&event);
    }

    /// Logs and publishes an error; returns the value on success.
    fn report<T>(&self, operation: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                log::warn!("index {operation} failed: {error}");
                let path = match &error {
                    IndexError::PathNotFound(path) => Some(path.clone()),
                    _ => None,
                };
                self.emit(UpdateKind::Error, path, format!("{operation} failed: {error}"));
                None
            }
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IndexError::NotInitialized)
        }
    }

    fn cache_path(&self) -> Result<PathBuf> {
        self.config.read().cache_path.clone().ok_or_else(|| {
            IndexError::InvalidInput("no cache path configured".to_string())
        })
    }

    fn recount_stats(&self) {
        let mut stats = self.stats.lock();
        stats.recount(self.catalog.read().values());
    }

    // -- index passes --------------------------------------------------------

    fn run_pass(
        &self,
        kind: PassKind,
        callback: Option<&ProgressCallback<'_>>,
        token: CancellationToken,
    ) -> bool {
        if let Err(error) = self.ensure_initialized() {
            log::warn!("index {} refused: {error}", kind.as_str());
            return false;
        }
        if self
            .indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("index {} refused: another pass is running", kind.as_str());
            return false;
        }
        let _guard = IndexingGuard(&self.indexing);

        let config = self.config.read().clone();
        self.progress.reset_for_build();
        self.emit(UpdateKind::Started, None, format!("{} started", kind.as_str()));
        let started = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let reuse = |path: &Path| self.catalog.get(path);
            let mut walk_data = WalkData::new(&config, self.clock.as_ref())
                .with_cancel(&token)
                .with_progress(&self.progress);
            if let Some(callback) = callback {
                walk_data = walk_data.with_callback(callback);
            }
            if kind == PassKind::Update {
                walk_data = walk_data.with_reuse(&reuse);
            }
            walk_roots(&walk_data)
        }));
        self.progress.finish();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "index thread panicked".to_string());
                log::warn!("index {} panicked: {message}", kind.as_str());
                self.emit(UpdateKind::Error, None, format!("{} failed: {message}", kind.as_str()));
                return false;
            }
        };

        for root in &outcome.missing_roots {
            self.emit(UpdateKind::Error, Some(root.clone()), "index root does not exist");
        }

        let elapsed = started.elapsed();
        if outcome.cancelled || token.cancelled() {
            {
                let mut stats = self.stats.lock();
                stats.last_index_duration = elapsed;
                stats.last_index_cancelled = true;
            }
            log::info!("index {} cancelled after {} ms", kind.as_str(), elapsed.as_millis());
            self.emit(UpdateKind::Completed, None, format!("{} cancelled", kind.as_str()));
            return true;
        }

        let entry_count = outcome.entries.len();
        let previous = self.catalog.replace_all(outcome.entries);
        {
            let mut stats = self.stats.lock();
            stats.recount(self.catalog.read().values());
            stats.errors = outcome.errors;
            stats.last_index_duration = elapsed;
            stats.last_indexed_at = Some(self.clock.now());
            stats.last_index_cancelled = false;
        }

        log::info!(
            "index {} of {:?}: {} entries ({} reused, {} errors) in {} ms",
            kind.as_str(),
            config.roots,
            entry_count,
            outcome.reused,
            outcome.errors,
            elapsed.as_millis()
        );

        if kind == PassKind::Update {
            let changes = diff_catalogs(&previous, &self.catalog.read());
            for (change, path) in changes {
                self.emit(change, Some(path), change.as_str());
            }
        }
        self.emit(
            UpdateKind::Completed,
            None,
            format!("{} completed: {entry_count} entries", kind.as_str()),
        );
        true
    }

    // -- single-path mutations ----------------------------------------------

    fn add_path(&self, path: &Path) -> Result<bool> {
        self.ensure_initialized()?;
        let path = canonicalize_existing_path(path.to_path_buf());
        let config = self.config.read().clone();
        let entry = create_entry(&path, &config, self.clock.now())
            .ok_or_else(|| IndexError::PathNotFound(path.clone()))?;
        if !should_index(&path, entry.is_directory, &config) {
            log::debug!("not indexing excluded path {}", path.display());
            return Ok(false);
        }

        let kind = match self.catalog.upsert(entry) {
            None => UpdateKind::Added,
            Some(_) => UpdateKind::Modified,
        };
        self.recount_stats();
        self.emit(kind, Some(path), kind.as_str());
        Ok(true)
    }

    fn remove_path(&self, path: &Path) -> Result<bool> {
        self.ensure_initialized()?;
        let removed = self.catalog.remove_with_descendants(&lookup_path(path));
        if removed.is_empty() {
            return Ok(false);
        }
        self.recount_stats();
        for entry in removed {
            self.emit(UpdateKind::Removed, Some(entry.path), UpdateKind::Removed.as_str());
        }
        Ok(true)
    }

    fn refresh_path(&self, path: &Path) -> Result<bool> {
        self.ensure_initialized()?;
        let path = lookup_path(path);
        let config = self.config.read().clone();
        let Some(entry) = create_entry(&path, &config, self.clock.now()) else {
            return self.remove_path(&path);
        };
        if !should_index(&path, entry.is_directory, &config) {
            return Ok(false);
        }

        let kind = match self.catalog.upsert(entry) {
            None => UpdateKind::Added,
            Some(_) => UpdateKind::Modified,
        };
        self.recount_stats();
        self.emit(kind, Some(path), kind.as_str());
        Ok(true)
    }

    // -- searching ------------------------------------------------------------

    fn search(&self, query: &SearchQuery, token: &CancellationToken) -> Vec<SearchResult> {
        let started = Instant::now();
        let results = {
            let entries = self.catalog.read();
            search_catalog(&entries, query, token)
        };
        self.stats.lock().last_search_duration = started.elapsed();
        results
    }

    // -- snapshots ------------------------------------------------------------

    fn snapshot(&self) -> PersistedIndex {
        let stats = self.stats.lock().clone();
        let entries = self.catalog.read();
        PersistedIndex::new(entries.values(), stats, unix_secs(self.clock.now()))
    }

    fn save_snapshot(&self, path: &Path) -> Result<()> {
        persistence::save_to_file(path, &self.snapshot())
    }

    fn install_snapshot(&self, index: PersistedIndex) {
        let mut restored = index.stats.clone();
        self.catalog.replace_all(index.into_entries());
        let mut stats = self.stats.lock();
        restored.recount(self.catalog.read().values());
        restored.last_search_duration = stats.last_search_duration;
        *stats = restored;
    }
}

/// Validates the config and canonicalizes its roots.
fn prepare_config(config: IndexConfig) -> IndexConfig {
    let mut config = config.validate();
    config.roots = config
        .roots
        .into_iter()
        .map(canonicalize_existing_path)
        .collect();
    config
}

/// Catalog lookups use the canonical path when it can be resolved.
fn lookup_path(path: &Path) -> PathBuf {
    canonicalize_existing_path(path.to_path_buf())
}

/// Per-path changes between two catalog states, in key order.
fn diff_catalogs(previous: &EntryMap, current: &EntryMap) -> Vec<(UpdateKind, PathBuf)> {
    let mut changes = Vec::new();
    for (key, entry) in current {
        match previous.get(key) {
            None => changes.push((UpdateKind::Added, entry.path.clone())),
            Some(old) if !old.same_state(entry) => {
                changes.push((UpdateKind::Modified, entry.path.clone()))
            }
            Some(_) => {}
        }
    }
    for (key, entry) in previous {
        if !current.contains_key(key) {
            changes.push((UpdateKind::Removed, entry.path.clone()));
        }
    }
    changes
}
