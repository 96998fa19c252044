//! Log file retention management
//!
//! Keeps only the newest few files for each file prefix.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;

/// Delete the oldest `<prefix>*.<extension>` files in `dir` until at most `max_files` remain
///
/// Files are ordered by creation time (modification time where the platform
/// does not report creation). Returns the number of files deleted.
pub fn cleanup_old_files(dir: &Path, prefix: &str, extension: &str, max_files: usize) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let suffix = format!(".{}", extension);
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        // Only process files written with this prefix
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !name.starts_with(prefix) || !name.ends_with(&suffix) {
                continue;
            }
        } else {
            continue;
        }

        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((created, path));
    }

    if files.len() <= max_files {
        return Ok(0);
    }

    files.sort();
    let excess = files.len() - max_files;
    let mut deleted_count = 0;
    for (_, path) in files.into_iter().take(excess) {
        if fs::remove_file(&path).is_ok() {
            deleted_count += 1;
        }
    }

    Ok(deleted_count)
}
