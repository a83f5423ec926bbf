use crate::core::{StagerError, StagerResult};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Extracts submitted zips into a shared extract folder
pub struct ZipExtractor {
    dest_dir: PathBuf,
}

impl ZipExtractor {
    /// Create a new ZipExtractor
    pub fn new(dest_dir: PathBuf) -> Self {
        Self { dest_dir }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Extract a zip, merging its content into the destination folder
    pub fn extract(&self, archive_path: &Path) -> StagerResult<()> {
        let extension = archive_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if extension.as_deref() != Some("zip") {
            return Err(StagerError::Archive(format!(
                "Unsupported format: {}",
                archive_path.display()
            )));
        }

        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| {
            StagerError::Archive(format!("Invalid zip {}: {}", archive_path.display(), e))
        })?;

        fs::create_dir_all(&self.dest_dir)?;
        archive.extract(&self.dest_dir).map_err(|e| {
            StagerError::Archive(format!(
                "Extract of {} failed: {}",
                archive_path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Extract on the blocking pool
    pub async fn extract_async(&self, archive_path: &Path) -> StagerResult<()> {
        let extractor = ZipExtractor::new(self.dest_dir.clone());
        let archive_path = archive_path.to_path_buf();
        tokio::task::spawn_blocking(move || extractor.extract(&archive_path))
            .await
            .map_err(|e| StagerError::Archive(format!("Extract task failed: {}", e)))?
    }
}
