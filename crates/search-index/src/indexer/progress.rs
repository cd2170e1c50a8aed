//! Index build progress tracking.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Progress counters shared between a running index pass and observers.
#[derive(Debug, Default)]
pub struct IndexBuildProgress {
    pub total: AtomicUsize,
    pub processed: AtomicUsize,
    pub errors: AtomicUsize,
    pub running: AtomicBool,
}

impl IndexBuildProgress {
    /// Resets progress for a new build.
    pub fn reset_for_build(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
    }

    /// Marks the build as finished.
    pub fn finish(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn add_total(&self, count: usize) {
        self.total.fetch_add(count, Ordering::Relaxed);
    }

    /// Counts one processed entry and returns the new processed count.
    pub fn record_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Processed / total. May exceed 1.0 if the tree grew between counting
    /// and processing; display code clamps.
    pub fn fraction(&self) -> f32 {
        fraction_of(
            self.processed.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    /// [`Self::fraction`] clamped to `[0, 1]`; 1.0 once the build finished,
    /// 0.0 while the running build is still counting paths.
    pub fn clamped_fraction(&self) -> f32 {
        if !self.running.load(Ordering::Relaxed) {
            return 1.0;
        }
        if self.total.load(Ordering::Relaxed) == 0 {
            return 0.0;
        }
        self.fraction().clamp(0.0, 1.0)
    }
}

/// Computes a progress fraction; an empty pass counts as complete.
pub fn fraction_of(processed: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        processed as f32 / total as f32
    }
}
