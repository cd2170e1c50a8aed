//! Metadata filters applied before any text matching.

use std::time::SystemTime;

use crate::config::normalize_extensions;
use crate::types::{IndexEntry, KindFilter, SearchQuery};

/// Cheap per-entry predicates taken from a query.
///
/// Size and time bounds are inclusive. A non-empty extension list never
/// admits directories.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    extensions: Vec<String>,
    min_size: Option<u64>,
    max_size: Option<u64>,
    modified_after: Option<SystemTime>,
    modified_before: Option<SystemTime>,
    kind: KindFilter,
}

impl MetadataFilter {
    pub fn from_query(query: &SearchQuery) -> Self {
        Self {
            extensions: normalize_extensions(&query.extensions),
            min_size: query.min_size,
            max_size: query.max_size,
            modified_after: query.modified_after,
            modified_before: query.modified_before,
            kind: query.kind,
        }
    }

    pub fn matches(&self, entry: &IndexEntry) -> bool {
        if !self.kind.matches(entry.is_directory) {
            return false;
        }
        if !self.extensions.is_empty()
            && (entry.is_directory
                || !self
                    .extensions
                    .iter()
                    .any(|ext| ext.eq_ignore_ascii_case(&entry.extension)))
        {
            return false;
        }
        if self.min_size.is_some_and(|min| entry.size < min)
            || self.max_size.is_some_and(|max| entry.size > max)
        {
            return false;
        }
        if self
            .modified_after
            .is_some_and(|after| entry.modified_time < after)
            || self
                .modified_before
                .is_some_and(|before| entry.modified_time > before)
        {
            return false;
        }
        true
    }
}
