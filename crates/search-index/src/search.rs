//! Search functionality over the catalog.
//!
//! This module provides:
//! - The main `SearchIndex` API
//! - Search engine for querying catalog snapshots
//! - The auto-update worker

mod auto_update;
mod engine;
mod manager;

#[cfg(test)]
mod tests;

// Re-export main types
pub use auto_update::{AutoUpdateHandle, UpdateTarget};
pub use engine::{quick_search, search_catalog};
pub use manager::SearchIndex;
