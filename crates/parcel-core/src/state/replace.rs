//! Moving a finished temp file onto the canonical state path.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempPath;

use super::TEMP_PREFIX;

/// Replaces `dest` with the temp file. `rename(2)` already replaces atomically.
#[cfg(unix)]
pub(super) fn persist(temp: TempPath, dest: &Path) -> Result<()> {
    temp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("rename state into {}", dest.display()))?;
    if let Some(dir) = dest.parent() {
        if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
            tracing::debug!(dir = %dir.display(), "state dir fsync failed: {}", e);
        }
    }
    Ok(())
}

/// Replaces `dest` with the temp file where rename cannot overwrite.
#[cfg(not(unix))]
pub(super) fn persist(temp: TempPath, dest: &Path) -> Result<()> {
    replace_with_stash(&temp, dest)
        .with_context(|| format!("replace state file {}", dest.display()))?;
    // Already moved; nothing left for the guard to delete.
    let _ = temp.keep();
    Ok(())
}

/// Moves `src` onto `dest` by renaming any existing `dest` aside first.
///
/// The stashed copy is deleted only after the new file is in place; if that
/// rename fails the stash is renamed back so `dest` keeps its old content.
#[cfg_attr(unix, allow(dead_code))]
pub(super) fn replace_with_stash(src: &Path, dest: &Path) -> io::Result<()> {
    if !dest.exists() {
        return fs::rename(src, dest);
    }
    let stash = stash_path(dest);
    fs::rename(dest, &stash)?;
    match fs::rename(src, dest) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(&stash) {
                tracing::warn!(stash = %stash.display(), "could not remove stashed state: {}", e);
            }
            Ok(())
        }
        Err(e) => {
            if let Err(restore) = fs::rename(&stash, dest) {
                tracing::error!(
                    stash = %stash.display(),
                    "could not restore stashed state: {}",
                    restore
                );
            }
            Err(e)
        }
    }
}

fn stash_path(dest: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let name = format!("{}stash-{}-{}", TEMP_PREFIX, std::process::id(), nanos);
    match dest.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
