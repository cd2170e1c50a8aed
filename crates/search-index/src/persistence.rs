//! Index persistence.
//!
//! Snapshots are postcard-encoded and zstd-compressed. File writes go to a
//! temporary file in the destination directory which is then renamed over
//! the target, so a crash never leaves a truncated snapshot behind.
//!
//! Entry content is never persisted; a loaded catalog carries metadata only
//! until the next index pass reads the files again.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::available_parallelism;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{IndexError, Result};
use crate::types::{IndexEntry, IndexStats};

/// Snapshot format version - increment when changing the format.
pub const INDEX_FORMAT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 6;

/// Persisted form of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub version: u32,
    /// Unix seconds at save time.
    pub saved_at: u64,
    pub stats: IndexStats,
    pub entries: Vec<PersistedEntry>,
}

/// Entry metadata without content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub is_directory: bool,
    pub content_hash: u64,
    pub modified_time: SystemTime,
    pub indexed_time: SystemTime,
}

impl From<&IndexEntry> for PersistedEntry {
    fn from(entry: &IndexEntry) -> Self {
        Self {
            path: entry.path.clone(),
            filename: entry.filename.clone(),
            extension: entry.extension.clone(),
            size: entry.size,
            is_directory: entry.is_directory,
            content_hash: entry.content_hash,
            modified_time: entry.modified_time,
            indexed_time: entry.indexed_time,
        }
    }
}

impl From<PersistedEntry> for IndexEntry {
    fn from(entry: PersistedEntry) -> Self {
        Self {
            path: entry.path,
            filename: entry.filename,
            extension: entry.extension,
            content: None,
            size: if entry.is_directory { 0 } else { entry.size },
            modified_time: entry.modified_time,
            indexed_time: entry.indexed_time.max(entry.modified_time),
            content_hash: entry.content_hash,
            is_directory: entry.is_directory,
        }
    }
}

impl PersistedIndex {
    pub fn new<'a, I>(entries: I, stats: IndexStats, saved_at: u64) -> Self
    where
        I: IntoIterator<Item = &'a IndexEntry>,
    {
        Self {
            version: INDEX_FORMAT_VERSION,
            saved_at,
            stats,
            entries: entries.into_iter().map(PersistedEntry::from).collect(),
        }
    }

    /// Converts back to content-less catalog entries.
    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries.into_iter().map(IndexEntry::from).collect()
    }

    fn check_version(self) -> Result<Self> {
        if self.version != INDEX_FORMAT_VERSION {
            return Err(IndexError::VersionMismatch {
                found: self.version,
                expected: INDEX_FORMAT_VERSION,
            });
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Byte streams
// ---------------------------------------------------------------------------

/// Writes a compressed snapshot to any byte sink.
pub fn write_snapshot<W: Write>(writer: W, index: &PersistedIndex) -> Result<()> {
    let mut encoder = zstd::Encoder::new(writer, ZSTD_LEVEL)?;
    let threads = available_parallelism().map(|n| n.get() as u32).unwrap_or(1);
    if let Err(error) = encoder.multithread(threads) {
        log::debug!("multi-threaded zstd unavailable: {error}");
    }
    let encoder = postcard::to_io(index, encoder)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Reads a compressed snapshot from any byte source.
pub fn read_snapshot<R: Read>(reader: R) -> Result<PersistedIndex> {
    let mut decoder = zstd::Decoder::new(reader)?;
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    let index: PersistedIndex = postcard::from_bytes(&bytes)?;
    index.check_version()
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Writes a snapshot file atomically (temp file + rename).
pub fn save_to_file(path: &Path, index: &PersistedIndex) -> Result<()> {
    atomic_write(path, |file| write_snapshot(BufWriter::new(file), index))?;
    log::debug!(
        "wrote index snapshot to {} ({} entries)",
        path.display(),
        index.entries.len()
    );
    Ok(())
}

/// Loads a snapshot file written by [`save_to_file`].
pub fn load_from_file(path: &Path) -> Result<PersistedIndex> {
    let index = read_snapshot(BufReader::new(open(path)?))?;
    log::debug!(
        "loaded index snapshot from {} ({} entries)",
        path.display(),
        index.entries.len()
    );
    Ok(index)
}

/// Writes the snapshot as pretty-printed JSON.
pub fn export_json(path: &Path, index: &PersistedIndex) -> Result<()> {
    atomic_write(path, |file| {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, index)?;
        writer.flush()?;
        Ok(())
    })
}

/// Reads a JSON snapshot written by [`export_json`].
pub fn import_json(path: &Path) -> Result<PersistedIndex> {
    let index: PersistedIndex = serde_json::from_reader(BufReader::new(open(path)?))?;
    index.check_version()
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|error| match error.kind() {
        ErrorKind::NotFound => IndexError::PathNotFound(path.to_path_buf()),
        _ => IndexError::Io(error),
    })
}

fn atomic_write<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|error| {
        IndexError::Internal(format!(
            "failed to create index directory {}: {error}",
            parent.display()
        ))
    })?;

    let mut temp = NamedTempFile::new_in(parent)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| IndexError::Io(error.error))?;
    Ok(())
}
