//! Directory listing source for the scan loop.
//!
//! Polling replaces native filesystem notifications: cloud-synced and network
//! folders rarely deliver reliable change events, but they can always be
//! listed. The [`DirectorySource`] trait keeps the scan loop independent of
//! the real filesystem so it can be driven with synthetic listings in tests.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};

/// A single entry from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name as it appears on disk (not normalized).
    pub name: String,

    /// Whether the entry is a directory. Directories are never tracked.
    pub is_dir: bool,

    /// Last modification time reported by the filesystem.
    pub modified_at: DateTime<Utc>,

    /// Size in bytes.
    pub size: u64,
}

impl DirEntry {
    /// Creates a regular file entry.
    #[must_use]
    pub fn file(name: impl Into<String>, modified_at: DateTime<Utc>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            modified_at,
            size,
        }
    }
}

/// Something that can list the entries of a directory.
pub trait DirectorySource {
    /// Lists the immediate children of `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the directory cannot be read.
    fn list_entries(&self, path: &Path) -> io::Result<Vec<DirEntry>>;
}

/// [`DirectorySource`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDirectory;

impl DirectorySource for FsDirectory {
    fn list_entries(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            // A file can vanish between read_dir and metadata; skip it and let
            // the next scan observe the deletion.
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                modified_at,
                size: metadata.len(),
            });
        }

        Ok(entries)
    }
}
