//! Persistent, incrementally updated file search index.
//!
//! This crate provides:
//! - Root walking with path classification and text content capture
//! - A reader/writer-locked catalog swapped atomically after each pass
//! - Filename and content scoring with metadata filters
//! - Compressed snapshots and JSON export
//! - The `SearchIndex` facade with auto-update and update events

pub mod cancel;
pub mod catalog;
pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod indexer;
pub mod persistence;
pub mod query;
pub mod search;
pub mod types;

// Re-export main types
pub use cancel::{CancellationSource, CancellationToken};
pub use catalog::{Catalog, CatalogKey};
pub use clock::{Clock, SystemClock};
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use events::ListenerId;
pub use indexer::ProgressCallback;
pub use search::SearchIndex;
pub use types::{
    IndexEntry, IndexStats, IndexUpdateEvent, KindFilter, MatchSpan, SearchQuery, SearchResult,
    UpdateKind,
};
