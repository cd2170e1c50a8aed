//! Root traversal that turns eligible paths into index entries.
//!
//! A walk runs in two phases:
//! - Discovery: the `ignore` walker enumerates each root sequentially, with
//!   the classifier pruning excluded subtrees. This doubles as the pre-count
//!   that drives progress reporting.
//! - Construction: candidates are stat'ed and read on a rayon pool sized by
//!   `IndexConfig::max_threads`.
//!
//! Entries come back sorted by path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ignore::WalkBuilder;
use rayon::prelude::*;

use super::entry::{create_entry, create_entry_from_metadata, is_reusable, stat};
use super::progress::{fraction_of, IndexBuildProgress};
use crate::cancel::CancellationToken;
use crate::classify::should_index;
use crate::clock::Clock;
use crate::config::IndexConfig;
use crate::types::IndexEntry;

/// Callback invoked after each entry with `(path, fraction)`.
///
/// The fraction is not clamped.
pub type ProgressCallback<'a> = dyn Fn(&Path, f32) + Send + Sync + 'a;

/// Looks up an existing entry so an incremental pass can reuse it.
pub type ReuseLookup<'a> = dyn Fn(&Path) -> Option<IndexEntry> + Send + Sync + 'a;

/// Data passed to the walker.
pub struct WalkData<'a> {
    /// Configuration snapshot taken when the pass started.
    pub config: &'a IndexConfig,
    /// Source of `indexed_time` values.
    pub clock: &'a dyn Clock,
    /// Cancellation token (checked per discovery step and per entry).
    pub cancel: Option<&'a CancellationToken>,
    /// Optional progress tracker for observers.
    pub progress: Option<&'a IndexBuildProgress>,
    pub callback: Option<&'a ProgressCallback<'a>>,
    /// Existing entries for incremental passes.
    pub reuse: Option<&'a ReuseLookup<'a>>,
}

impl<'a> WalkData<'a> {
    pub fn new(config: &'a IndexConfig, clock: &'a dyn Clock) -> Self {
        Self {
            config,
            clock,
            cancel: None,
            progress: None,
            callback: None,
            reuse: None,
        }
    }

    /// Sets the cancellation token.
    pub fn with_cancel(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Sets the progress tracker.
    pub fn with_progress(mut self, progress: &'a IndexBuildProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_callback(mut self, callback: &'a ProgressCallback<'a>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Enables entry reuse for an incremental pass.
    pub fn with_reuse(mut self, reuse: &'a ReuseLookup<'a>) -> Self {
        self.reuse = Some(reuse);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::cancelled)
    }
}

/// Result of a walk.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// Entries produced, sorted by path. Partial when `cancelled` is set.
    pub entries: Vec<IndexEntry>,
    /// Unreadable paths and missing roots.
    pub errors: usize,
    /// Roots that did not exist or were not directories.
    pub missing_roots: Vec<PathBuf>,
    /// Entries carried over unchanged from the previous catalog.
    pub reused: usize,
    pub cancelled: bool,
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
}

#[derive(Debug, Default)]
struct Discovery {
    candidates: Vec<Candidate>,
    errors: usize,
    cancelled: bool,
}

/// Walks every configured root.
pub fn walk_roots(walk_data: &WalkData) -> WalkOutcome {
    walk_paths(&walk_data.config.roots, walk_data)
}

/// Walks a single root.
pub fn walk(root: &Path, walk_data: &WalkData) -> WalkOutcome {
    walk_paths(&[root.to_path_buf()], walk_data)
}

fn walk_paths(roots: &[PathBuf], walk_data: &WalkData) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let mut candidates = Vec::new();

    for root in roots {
        if !root.is_dir() {
            log::warn!("index root {} is missing or not a directory", root.display());
            outcome.errors += 1;
            outcome.missing_roots.push(root.clone());
            continue;
        }
        let discovery = discover(root, walk_data);
        outcome.errors += discovery.errors;
        candidates.extend(discovery.candidates);
        if discovery.cancelled {
            outcome.cancelled = true;
            break;
        }
    }

    if let Some(progress) = walk_data.progress {
        progress.add_total(candidates.len());
        for _ in 0..outcome.errors {
            progress.record_error();
        }
    }
    if outcome.cancelled {
        return outcome;
    }

    let total = candidates.len();
    let build = || build_entries(&candidates, total, walk_data);
    let built = match rayon::ThreadPoolBuilder::new()
        .num_threads(walk_data.config.max_threads.max(1))
        .thread_name(|index| format!("search-index-walk-{index}"))
        .build()
    {
        Ok(pool) => pool.install(build),
        Err(error) => {
            log::warn!("falling back to the global rayon pool: {error}");
            build()
        }
    };

    outcome.entries = built.entries;
    outcome.errors += built.errors;
    outcome.reused = built.reused;
    outcome.cancelled = walk_data.is_cancelled();

    outcome.entries.sort_by(|a, b| a.path.cmp(&b.path));
    // Overlapping roots discover the same paths twice.
    outcome.entries.dedup_by(|a, b| a.path == b.path);
    outcome
}

/// Enumerates eligible paths under `root`, excluding the root itself.
fn discover(root: &Path, walk_data: &WalkData) -> Discovery {
    let mut discovery = Discovery::default();
    let filter_config = Arc::new(walk_data.config.clone());

    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(walk_data.config.follow_symlinks)
        .filter_entry(move |entry| {
            // Only directories are pruned here; files are classified below.
            entry.depth() == 0
                || !entry.file_type().is_some_and(|file_type| file_type.is_dir())
                || should_index(entry.path(), true, &filter_config)
        });

    for result in builder.build() {
        if walk_data.is_cancelled() {
            discovery.cancelled = true;
            break;
        }
        let entry = match result {
            Ok(entry) => entry,
            Err(error) => {
                log::debug!("skipping unreadable path: {error}");
                discovery.errors += 1;
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let is_directory = file_type.is_dir();
        if !is_directory && !should_index(entry.path(), false, walk_data.config) {
            continue;
        }
        discovery.candidates.push(Candidate {
            path: entry.into_path(),
        });
    }

    discovery
}

#[derive(Debug, Default)]
struct Built {
    entries: Vec<IndexEntry>,
    errors: usize,
    reused: usize,
}

enum Step {
    Created(IndexEntry),
    Reused(IndexEntry),
    Failed,
}

fn build_entries(candidates: &[Candidate], total: usize, walk_data: &WalkData) -> Built {
    let now = walk_data.clock.now();
    let processed = AtomicUsize::new(0);
    let steps: Vec<Step> = candidates
        .par_iter()
        .map(|candidate| {
            if walk_data.is_cancelled() {
                return None;
            }
            let step = build_one(&candidate.path, walk_data, now);
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(progress) = walk_data.progress {
                progress.record_processed();
                if matches!(step, Step::Failed) {
                    progress.record_error();
                }
            }
            if let Some(callback) = walk_data.callback {
                callback(&candidate.path, fraction_of(done, total));
            }
            Some(step)
        })
        .while_some()
        .collect();

    let mut built = Built::default();
    for step in steps {
        match step {
            Step::Created(entry) => built.entries.push(entry),
            Step::Reused(entry) => {
                built.reused += 1;
                built.entries.push(entry);
            }
            Step::Failed => built.errors += 1,
        }
    }
    built
}

fn build_one(path: &Path, walk_data: &WalkData, now: std::time::SystemTime) -> Step {
    let Some(reuse) = walk_data.reuse else {
        return match create_entry(path, walk_data.config, now) {
            Some(entry) => Step::Created(entry),
            None => Step::Failed,
        };
    };

    let Some(metadata) = stat(path, walk_data.config.follow_symlinks) else {
        return Step::Failed;
    };
    if let Some(previous) = reuse(path) {
        if is_reusable(&previous, &metadata, walk_data.config) {
            return Step::Reused(previous);
        }
    }
    Step::Created(create_entry_from_metadata(
        path.to_path_buf(),
        &metadata,
        walk_data.config,
        now,
    ))
}
