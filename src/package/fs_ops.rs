//! Filesystem primitives used by staging.
//!
//! Moves try a plain rename first and fall back to copy + remove when the
//! source and destination live on different filesystems. Ledger-like files
//! are written to a temporary sibling and renamed into place so readers
//! never observe a partial write.

use crate::core::{StagerError, StagerResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs as afs;
use walkdir::WalkDir;

/// Write `contents` to `path` through a temporary sibling + rename.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> StagerResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StagerError::Path(format!("{} has no parent", path.display())))?;
    afs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
    afs::write(&tmp, contents).await?;
    if let Err(e) = afs::rename(&tmp, path).await {
        let _ = afs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

pub async fn exists(path: &Path) -> bool {
    afs::try_exists(path).await.unwrap_or(false)
}

/// Move a file or folder, creating the destination's parents.
pub async fn move_item(from: &Path, to: &Path) -> StagerResult<()> {
    if let Some(parent) = to.parent() {
        afs::create_dir_all(parent).await?;
    }
    match afs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StagerError::ItemsMissing(vec![
            from.display().to_string(),
        ])),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            let (src, dst) = (from.to_path_buf(), to.to_path_buf());
            tokio::task::spawn_blocking(move || copy_recursively(&src, &dst))
                .await
                .map_err(|e| StagerError::Io(io::Error::other(e)))??;
            remove_item(from).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a file or folder. A missing path is not an error.
pub async fn remove_item(path: &Path) -> StagerResult<()> {
    let metadata = match afs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let result = if metadata.is_dir() {
        afs::remove_dir_all(path).await
    } else {
        afs::remove_file(path).await
    };
    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Remove a path, swallowing any error so cleanup never masks the primary one.
pub async fn remove_quietly(path: &Path) {
    if let Err(e) = remove_item(path).await {
        tracing::debug!(path = %path.display(), error = %e, "ignoring cleanup failure");
    }
}

/// Remove empty directories from `start` upwards, stopping at `root`.
pub async fn prune_empty_parents(start: &Path, root: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(root) && current != root {
        // remove_dir only succeeds on empty directories
        if afs::remove_dir(&current).await.is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

/// Hard link `from` to `to`, copying when linking is not possible.
pub async fn link_or_copy(from: &Path, to: &Path) -> StagerResult<()> {
    if let Some(parent) = to.parent() {
        afs::create_dir_all(parent).await?;
    }
    if afs::hard_link(from, to).await.is_err() {
        afs::copy(from, to).await?;
    }
    Ok(())
}

/// Copy a file or a folder tree.
pub fn copy_recursively(from: &Path, to: &Path) -> StagerResult<()> {
    if from.is_file() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
        return Ok(());
    }

    for entry in WalkDir::new(from) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| StagerError::Path(e.to_string()))?;
        let target: PathBuf = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// All files below `root`, as paths relative to it.
pub fn list_files(root: &Path) -> StagerResult<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                files.push(rel.to_path_buf());
            }
        }
    }
    Ok(files)
}
