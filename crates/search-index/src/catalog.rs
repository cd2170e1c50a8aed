//! In-memory catalog of index entries.
//!
//! The catalog is an ordered map guarded by a reader/writer lock. Readers
//! (searches, lookups) run concurrently; every writer takes the lock
//! exclusively. `replace_all` swaps the whole map under one write lock so a
//! reader sees either the old or the new catalog, never a mix.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::types::IndexEntry;

/// Normalized catalog key.
///
/// Separators are unified to `/` and trailing separators trimmed. On
/// case-insensitive platforms the key is ASCII-lowercased as well.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CatalogKey(String);

impl CatalogKey {
    pub fn new(path: &Path) -> Self {
        let raw = path.to_string_lossy().replace('\\', "/");
        let trimmed = match raw.trim_end_matches('/') {
            "" if raw.starts_with('/') => "/",
            trimmed => trimmed,
        };
        if cfg!(any(target_os = "windows", target_os = "macos")) {
            Self(trimmed.to_ascii_lowercase())
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &CatalogKey) -> bool {
        let prefix = ancestor.0.trim_end_matches('/');
        self.0.len() > prefix.len()
            && self.0.starts_with(prefix)
            && self.0.as_bytes()[prefix.len()] == b'/'
    }
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Path> for CatalogKey {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

pub type EntryMap = BTreeMap<CatalogKey, IndexEntry>;

/// Concurrency-safe entry storage keyed by normalized path.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: RwLock<EntryMap>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the entry stored for `path`.
    pub fn get(&self, path: &Path) -> Option<IndexEntry> {
        self.entries.read().get(&CatalogKey::new(path)).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains_key(&CatalogKey::new(path))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Holds the read lock for a whole search pass.
    pub fn read(&self) -> RwLockReadGuard<'_, EntryMap> {
        self.entries.read()
    }

    /// Replaces every entry at once and returns the previous map.
    pub fn replace_all<I>(&self, entries: I) -> EntryMap
    where
        I: IntoIterator<Item = IndexEntry>,
    {
        let fresh: EntryMap = entries
            .into_iter()
            .map(|entry| (CatalogKey::new(&entry.path), entry))
            .collect();
        std::mem::replace(&mut *self.entries.write(), fresh)
    }

    /// Inserts or replaces one entry, returning the previous value.
    pub fn upsert(&self, entry: IndexEntry) -> Option<IndexEntry> {
        let key = CatalogKey::new(&entry.path);
        self.entries.write().insert(key, entry)
    }

    pub fn remove(&self, path: &Path) -> Option<IndexEntry> {
        self.entries.write().remove(&CatalogKey::new(path))
    }

    /// Removes `path` and every entry below it.
    pub fn remove_with_descendants(&self, path: &Path) -> Vec<IndexEntry> {
        let key = CatalogKey::new(path);
        let mut entries = self.entries.write();
        let doomed: Vec<CatalogKey> = entries
            .range(key.clone()..)
            .take_while(|(candidate, _)| candidate.as_str().starts_with(key.as_str()))
            .filter(|(candidate, _)| **candidate == key || candidate.is_descendant_of(&key))
            .map(|(candidate, _)| candidate.clone())
            .collect();
        doomed
            .iter()
            .filter_map(|candidate| entries.remove(candidate))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
