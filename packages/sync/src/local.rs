//! Enumeration of the local sync root.
//!
//! The root is a single flat layer: every direct entry is one candidate
//! object, keyed by its file name. Subdirectories are reported as
//! non-regular entries and never descended into.

use std::io;
use std::path::{Path, PathBuf};

/// What a directory entry is, after following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Other,
}

/// A direct entry of the sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// File name, used verbatim as the object key.
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
    path: PathBuf,
}

impl LocalFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }
}

/// Lists every entry of `root`, sorted by name.
///
/// Entries whose names are not valid UTF-8 cannot be object keys and are
/// skipped with a warning.
///
/// # Errors
///
/// Returns an I/O error if `root` cannot be read.
pub async fn enumerate(root: &Path) -> io::Result<Vec<LocalFile>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            log::warn!("Skipping non UTF-8 file name: {}", entry.path().display());
            continue;
        };
        files.push(describe(name, entry.path()).await);
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Looks up a single entry of `root` by name.
///
/// # Errors
///
/// Returns [`io::ErrorKind::InvalidInput`] if `name` is not a plain file
/// name, or any error from reading its metadata.
pub async fn lookup(root: &Path, name: &str) -> io::Result<LocalFile> {
    if !is_plain_name(name) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{name:?} is not a file name in the sync root"),
        ));
    }

    let path = root.join(name);
    let metadata = tokio::fs::metadata(&path).await?;
    Ok(LocalFile {
        name: name.to_string(),
        size: metadata.len(),
        kind: kind_of(&metadata),
        path,
    })
}

async fn describe(name: String, path: PathBuf) -> LocalFile {
    // Dangling symlinks and unreadable entries land here as `Other`.
    match tokio::fs::metadata(&path).await {
        Ok(metadata) => LocalFile {
            name,
            size: metadata.len(),
            kind: kind_of(&metadata),
            path,
        },
        Err(e) => {
            log::debug!("stat {} failed: {e}", path.display());
            LocalFile {
                name,
                size: 0,
                kind: EntryKind::Other,
                path,
            }
        }
    }
}

fn kind_of(metadata: &std::fs::Metadata) -> EntryKind {
    if metadata.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains(std::path::MAIN_SEPARATOR)
}
