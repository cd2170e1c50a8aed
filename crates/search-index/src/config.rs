//! Index configuration.
//!
//! `IndexConfig` is a plain value: the index copies it in when an operation
//! starts, so edits made afterwards only take effect on the next rebuild.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::available_parallelism;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Default cap on the size of files whose text is captured (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default pause between auto-update cycles.
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 300;

const DEFAULT_EXCLUDED_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directories walked by a rebuild.
    pub roots: Vec<PathBuf>,
    /// Extension allow-list; empty admits every extension.
    pub include_extensions: Vec<String>,
    /// Extension deny-list; wins over the allow-list.
    pub exclude_extensions: Vec<String>,
    /// Directory name fragments that prune a subtree.
    pub excluded_dirs: Vec<String>,
    /// Largest file whose text is captured, in bytes.
    pub max_file_size: u64,
    pub index_content: bool,
    pub index_hidden: bool,
    pub follow_symlinks: bool,
    /// Worker threads used to build entries.
    pub max_threads: usize,
    pub update_interval_secs: u64,
    /// Where `save_index`/`load_index` keep the snapshot.
    pub cache_path: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            include_extensions: Vec::new(),
            exclude_extensions: Vec::new(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|dir| dir.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            index_content: true,
            index_hidden: false,
            follow_symlinks: false,
            max_threads: available_parallelism().map(|n| n.get()).unwrap_or(4),
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            cache_path: None,
        }
    }
}

impl IndexConfig {
    /// Creates a default configuration over the given roots.
    pub fn with_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parses a (possibly partial) JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: IndexConfig = serde_json::from_str(raw)?;
        Ok(config.validate())
    }

    /// Reads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => IndexError::PathNotFound(path.to_path_buf()),
            _ => IndexError::Io(error),
        })?;
        Self::from_json_str(&raw)
    }

    /// Normalizes extension lists and clamps numeric settings.
    pub fn validate(mut self) -> Self {
        self.include_extensions = normalize_extensions(&self.include_extensions);
        self.exclude_extensions = normalize_extensions(&self.exclude_extensions);
        self.excluded_dirs.retain(|dir| !dir.trim().is_empty());
        self.max_threads = self.max_threads.max(1);
        self.update_interval_secs = self.update_interval_secs.max(1);
        self
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs.max(1))
    }
}

/// Lower-cases, strips leading dots and deduplicates extensions.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}
