//! Filesystem indexing.
//!
//! Turns configured roots into sorted `IndexEntry` sets:
//! - `walk` enumerates roots and fans entry construction out on rayon
//! - `entry` stats paths and captures text content
//! - `progress` exposes counters to observers

mod entry;
mod progress;
mod walk;

pub use entry::{content_hash, create_entry, is_reusable};
pub use progress::IndexBuildProgress;
pub use walk::{walk, walk_roots, ProgressCallback, ReuseLookup, WalkData, WalkOutcome};
