//! Cancellation tokens for search and indexing operations.
//!
//! A [`CancellationSource`] owns a generation counter. Every token it hands out
//! remembers the generation it was created for; calling
//! [`CancellationSource::cancel`] moves the generation forward, which cancels
//! every outstanding token while leaving operations started afterwards
//! untouched. Cancellation is cooperative: long-running loops poll their token
//! at natural iteration boundaries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Issues cancellation tokens and cancels all of them at once.
#[derive(Debug, Default)]
pub struct CancellationSource {
    active_version: Arc<AtomicU64>,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token bound to the current generation.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            active_version: Arc::clone(&self.active_version),
            version: self.active_version.load(Ordering::SeqCst),
        }
    }

    /// Cancels every token issued so far.
    pub fn cancel(&self) {
        self.active_version.fetch_add(1, Ordering::SeqCst);
    }
}

/// A cancellation token for terminating long-running operations.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    active_version: Arc<AtomicU64>,
    version: u64,
}

impl CancellationToken {
    /// Creates a token that is never cancelled.
    pub fn noop() -> Self {
        Self {
            active_version: Arc::new(AtomicU64::new(0)),
            version: 0,
        }
    }

    /// Checks if this token is still active.
    ///
    /// Returns `Some(())` if still active, `None` if cancelled.
    /// This enables use with the `?` operator for early returns.
    #[inline]
    pub fn is_cancelled(&self) -> Option<()> {
        if self.version != self.active_version.load(Ordering::Relaxed) {
            None
        } else {
            Some(())
        }
    }

    /// Boolean form of [`Self::is_cancelled`].
    #[inline]
    pub fn cancelled(&self) -> bool {
        self.is_cancelled().is_none()
    }
}

impl Default for CancellationToken {
    /// Default creates a noop token that is never cancelled.
    fn default() -> Self {
        Self::noop()
    }
}
