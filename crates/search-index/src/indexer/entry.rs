//! Builds `IndexEntry` records from filesystem metadata.

use std::fs::{self, File, Metadata};
use std::hash::Hasher;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fnv::FnvHasher;

use crate::classify::is_text_candidate;
use crate::config::IndexConfig;
use crate::types::IndexEntry;

/// Entries whose modification time is this close to their indexing time are
/// always re-read, since a write in the same tick may have gone unnoticed.
const RACY_WINDOW: Duration = Duration::from_secs(2);

/// Stats `path` and builds its entry.
///
/// Returns `None` only when the path cannot be stat'ed (vanished or
/// inaccessible). Content read failures still yield an entry, just without
/// content.
pub fn create_entry(path: &Path, config: &IndexConfig, now: SystemTime) -> Option<IndexEntry> {
    let metadata = stat(path, config.follow_symlinks)?;
    Some(create_entry_from_metadata(path.to_path_buf(), &metadata, config, now))
}

/// Builds an entry for a path whose metadata is already known.
pub fn create_entry_from_metadata(
    path: PathBuf,
    metadata: &Metadata,
    config: &IndexConfig,
    now: SystemTime,
) -> IndexEntry {
    let modified = modified_time(metadata);

    if metadata.is_dir() {
        return IndexEntry::directory(path, modified, now);
    }

    let size = metadata.len();
    let eligible = content_eligible(&path, metadata, config);
    let entry = IndexEntry::file(path, size, modified, now);
    if !eligible {
        return entry;
    }

    match read_text(&entry.path, config.max_file_size) {
        Some(content) => {
            let hash = content_hash(&content);
            entry.with_content(content, hash)
        }
        None => {
            log::debug!("content capture skipped for {}", entry.path.display());
            entry
        }
    }
}

/// Returns true when the previous entry still describes the file and can be
/// kept without re-reading it.
pub fn is_reusable(previous: &IndexEntry, metadata: &Metadata, config: &IndexConfig) -> bool {
    if previous.is_directory != metadata.is_dir() {
        return false;
    }
    if previous.modified_time != modified_time(metadata) {
        return false;
    }
    if previous.is_directory {
        return true;
    }
    if previous.size != metadata.len() {
        return false;
    }
    let racy = previous
        .indexed_time
        .duration_since(previous.modified_time)
        .map(|gap| gap < RACY_WINDOW)
        .unwrap_or(true);
    if racy {
        return false;
    }
    content_eligible(&previous.path, metadata, config) == previous.has_content()
}

/// Whether the file's text should be captured under `config`.
pub fn content_eligible(path: &Path, metadata: &Metadata, config: &IndexConfig) -> bool {
    config.index_content
        && metadata.is_file()
        && metadata.len() <= config.max_file_size
        && is_text_candidate(path)
}

/// Cheap non-cryptographic hash used only for change detection.
pub fn content_hash(content: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(content.as_bytes());
    hasher.finish()
}

/// Stats a path, following symlinks only when asked to.
pub fn stat(path: &Path, follow_symlinks: bool) -> Option<Metadata> {
    let result = if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    };
    result.ok()
}

/// Modification time of `metadata`, or the epoch when unavailable.
pub fn modified_time(metadata: &Metadata) -> SystemTime {
    metadata.modified().unwrap_or(UNIX_EPOCH)
}

/// Reads at most `max_len` bytes of UTF-8 text.
///
/// Returns `None` for oversized files, read errors, invalid UTF-8 or data
/// containing NUL bytes.
fn read_text(path: &Path, max_len: u64) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut bytes = Vec::new();
    file.take(max_len.saturating_add(1))
        .read_to_end(&mut bytes)
        .ok()?;
    if bytes.len() as u64 > max_len || memchr::memchr(0, &bytes).is_some() {
        return None;
    }
    String::from_utf8(bytes).ok()
}
