//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating the source tree depth-first
//! - Opening source files for streaming
//! - Writing streams into a local directory tree

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{EngineError, TransferError};
use crate::key::RelativeKey;
use crate::model::FileItem;

/// Enumerate the regular files under `root`, depth-first, in name order.
///
/// Symlinks are never followed or transferred. A nested directory that cannot
/// be listed is returned as a Failed item so the rest of the tree is still
/// processed.
///
/// # Errors
/// Returns EngineError if the root itself cannot be listed.
pub fn enumerate_tree(root: &Path) -> Result<Vec<FileItem>, EngineError> {
    let entries = read_dir_sorted(root).map_err(|e| EngineError::EnumerationFailed {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut items = Vec::new();
    walk(root, entries, &mut items);
    Ok(items)
}

fn read_dir_sorted(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}

fn walk(root: &Path, entries: Vec<fs::DirEntry>, items: &mut Vec<FileItem>) {
    for entry in entries {
        let path = entry.path();

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat entry");
                let key = RelativeKey::from_paths_lossy(root, &path);
                items.push(FileItem::failed(path, key, false, e.to_string()));
                continue;
            }
        };

        if file_type.is_symlink() {
            debug!(path = %path.display(), "skipping symlink");
            continue;
        }

        if file_type.is_dir() {
            match read_dir_sorted(&path) {
                Ok(children) => walk(root, children, items),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot list directory");
                    let key = RelativeKey::from_paths_lossy(root, &path);
                    let message = format!("cannot list directory: {}", e);
                    items.push(FileItem::failed(path, key, true, message));
                }
            }
            continue;
        }

        if !file_type.is_file() {
            debug!(path = %path.display(), "skipping special file");
            continue;
        }

        let key = match RelativeKey::from_paths(root, &path) {
            Ok(key) => key,
            Err(e) => {
                let key = RelativeKey::from_paths_lossy(root, &path);
                items.push(FileItem::failed(path, key, false, e.to_string()));
                continue;
            }
        };

        match entry.metadata() {
            Ok(metadata) => items.push(FileItem::new(path, key, metadata.len())),
            Err(e) => items.push(FileItem::failed(path, key, false, e.to_string())),
        }
    }
}

/// Open a source file for reading.
pub fn open_source(path: &Path) -> Result<fs::File, TransferError> {
    fs::File::open(path).map_err(|e| TransferError::Open {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Stream `content` into `dst`, creating parent directories as needed.
///
/// Bytes land in a temporary file next to `dst` and are renamed into place,
/// so an interrupted write never leaves a partial file at `dst`.
///
/// # Returns
/// Number of bytes written
pub fn write_stream_to_file(content: &mut dyn Read, dst: &Path) -> io::Result<u64> {
    ensure_parent_dir_exists(dst)?;

    let parent = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(parent)?;
    let bytes_written = io::copy(content, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(dst).map_err(|e| e.error)?;

    Ok(bytes_written)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} exists but is not a directory", parent.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(parent),
        Err(e) => Err(e),
    }
}
