//! Value types shared by the indexer, catalog, query engine and facade.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One catalog record.
///
/// Entries are replaced wholesale on update; nothing mutates an entry once it
/// sits in the catalog. Directories never carry content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Filesystem path as it was discovered.
    pub path: PathBuf,
    pub filename: String,
    /// Extension without the leading dot, as-given case. Empty when absent.
    pub extension: String,
    /// Captured text, present only when content indexing applied.
    pub content: Option<String>,
    /// Byte length (0 for directories).
    pub size: u64,
    pub modified_time: SystemTime,
    pub indexed_time: SystemTime,
    /// Non-cryptographic hash of `content` (0 when no content was captured).
    pub content_hash: u64,
    pub is_directory: bool,
}

impl IndexEntry {
    /// Creates a directory record.
    pub fn directory(path: PathBuf, modified_time: SystemTime, indexed_time: SystemTime) -> Self {
        let (filename, extension) = name_parts(&path);
        Self {
            path,
            filename,
            extension,
            content: None,
            size: 0,
            modified_time,
            indexed_time: indexed_time.max(modified_time),
            content_hash: 0,
            is_directory: true,
        }
    }

    /// Creates a file record without content.
    pub fn file(
        path: PathBuf,
        size: u64,
        modified_time: SystemTime,
        indexed_time: SystemTime,
    ) -> Self {
        let (filename, extension) = name_parts(&path);
        Self {
            path,
            filename,
            extension,
            content: None,
            size,
            modified_time,
            indexed_time: indexed_time.max(modified_time),
            content_hash: 0,
            is_directory: false,
        }
    }

    /// Attaches captured content and its hash.
    pub fn with_content(mut self, content: String, content_hash: u64) -> Self {
        if !self.is_directory {
            self.content = Some(content);
            self.content_hash = content_hash;
        }
        self
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Returns true when both entries describe the same on-disk state,
    /// ignoring when they were indexed.
    pub fn same_state(&self, other: &IndexEntry) -> bool {
        self.path == other.path
            && self.is_directory == other.is_directory
            && self.size == other.size
            && self.modified_time == other.modified_time
            && self.content_hash == other.content_hash
    }
}

/// Splits a path into `(filename, extension)`.
pub fn name_parts(path: &Path) -> (String, String) {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();
    (filename, extension)
}

/// Kind filter for catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    #[default]
    All,
    File,
    Directory,
}

impl KindFilter {
    pub fn matches(&self, is_directory: bool) -> bool {
        match self {
            Self::All => true,
            Self::File => !is_directory,
            Self::Directory => is_directory,
        }
    }
}

/// A search request.
///
/// Built with the chained setters and then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub text: String,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub use_regex: bool,
    pub search_content: bool,
    pub search_filenames: bool,
    /// Extension allow-list; empty means any extension.
    pub extensions: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub modified_after: Option<SystemTime>,
    pub modified_before: Option<SystemTime>,
    pub kind: KindFilter,
    /// Result cap; 0 means unlimited.
    pub max_results: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            case_sensitive: false,
            whole_word: false,
            use_regex: false,
            search_content: false,
            search_filenames: true,
            extensions: Vec::new(),
            min_size: None,
            max_size: None,
            modified_after: None,
            modified_before: None,
            kind: KindFilter::All,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Default result cap for new queries.
pub const DEFAULT_MAX_RESULTS: usize = 1000;

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.case_sensitive = value;
        self
    }

    pub fn whole_word(mut self, value: bool) -> Self {
        self.whole_word = value;
        self
    }

    pub fn regex(mut self, value: bool) -> Self {
        self.use_regex = value;
        self
    }

    pub fn content(mut self, value: bool) -> Self {
        self.search_content = value;
        self
    }

    pub fn filenames(mut self, value: bool) -> Self {
        self.search_filenames = value;
        self
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn size_between(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    pub fn modified_between(
        mut self,
        after: Option<SystemTime>,
        before: Option<SystemTime>,
    ) -> Self {
        self.modified_after = after;
        self.modified_before = before;
        self
    }

    pub fn kind(mut self, kind: KindFilter) -> Self {
        self.kind = kind;
        self
    }

    pub fn max_results(mut self, value: usize) -> Self {
        self.max_results = value;
        self
    }
}

/// A byte range into an entry's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    pub offset: usize,
    pub length: usize,
}

impl MatchSpan {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// A ranked hit. `entry` is an owned copy so results outlive the catalog lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub entry: IndexEntry,
    pub score: f32,
    pub matches: Vec<MatchSpan>,
    pub match_context: String,
}

/// Observational counters, recomputed after each index pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub indexed_files: usize,
    pub indexed_directories: usize,
    pub content_indexed_files: usize,
    pub total_bytes: u64,
    /// Paths or roots that could not be read during the last index pass.
    pub errors: usize,
    pub last_index_duration: Duration,
    pub last_search_duration: Duration,
    pub last_indexed_at: Option<SystemTime>,
    pub last_index_cancelled: bool,
}

impl IndexStats {
    /// Recomputes the entry counters from `entries`, keeping durations and
    /// timestamps untouched.
    pub fn recount<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = &'a IndexEntry>,
    {
        self.indexed_files = 0;
        self.indexed_directories = 0;
        self.content_indexed_files = 0;
        self.total_bytes = 0;
        for entry in entries {
            if entry.is_directory {
                self.indexed_directories += 1;
            } else {
                self.indexed_files += 1;
                self.total_bytes += entry.size;
                if entry.has_content() {
                    self.content_indexed_files += 1;
                }
            }
        }
    }
}

/// Kind of an [`IndexUpdateEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Added,
    Modified,
    Removed,
    Started,
    Completed,
    Error,
}

impl UpdateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Notification delivered to update listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexUpdateEvent {
    pub kind: UpdateKind,
    pub path: Option<PathBuf>,
    pub message: String,
    pub timestamp: SystemTime,
}

impl IndexUpdateEvent {
    pub fn new(kind: UpdateKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
            timestamp: UNIX_EPOCH,
        }
    }

    pub fn at(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}
