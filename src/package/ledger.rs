//! On-disk ledger: which content and zip paths belong to which
//! `(id, version)`, and the ordered list of content folders to load.

use crate::core::version::compare_or_lexical;
use crate::core::StagerResult;
use crate::package::fs_ops::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// New files are in place but not yet confirmed; a backup of the
    /// previous version may still exist.
    Staged,
    Valid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub version: String,
    /// Content folders, relative to the content root
    #[serde(default)]
    pub content: Vec<String>,
    /// Zip files, relative to the zips root
    #[serde(default)]
    pub zips: Vec<String>,
    pub state: EntryState,
    #[serde(default)]
    pub submission_id: String,
    #[serde(default)]
    pub email: String,
    /// Previous content, relative to `<backup_folder>/content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_content: Option<Vec<String>>,
    /// Previous zips, relative to `<backup_folder>/zips`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_zips: Option<Vec<String>>,
    /// Backup folder name, relative to the content root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_folder: Option<String>,
}

impl LedgerEntry {
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        content: Vec<String>,
        zips: Vec<String>,
        submission_id: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            content,
            zips,
            state: EntryState::Valid,
            submission_id: submission_id.into(),
            email: email.into(),
            backup_content: None,
            backup_zips: None,
            backup_folder: None,
        }
    }

    pub fn matches(&self, id: &str, version: &str) -> bool {
        self.id == id && self.version == version
    }

    pub fn is_staged(&self) -> bool {
        self.state == EntryState::Staged
    }

    pub fn clear_backup(&mut self) {
        self.backup_content = None;
        self.backup_zips = None;
        self.backup_folder = None;
    }

    /// Whether `rel` is one of this entry's content folders or zips.
    pub fn owns(&self, rel: &str) -> bool {
        self.content.iter().chain(self.zips.iter()).any(|p| p == rel)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    packages: Vec<LedgerEntry>,
}

/// The package-manager file: `{ "packages": [LedgerEntry] }`.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries. A missing or blank file reads as an empty ledger.
    pub async fn read(&self) -> StagerResult<Vec<LedgerEntry>> {
        let Some(content) = read_if_present(&self.path).await? else {
            return Ok(Vec::new());
        };
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed == "[]" {
            return Ok(Vec::new());
        }
        let document: LedgerDocument = serde_json::from_str(trimmed)?;
        Ok(document.packages)
    }

    /// Rewrite the whole file, ordered by id then newest version first.
    pub async fn write(&self, mut entries: Vec<LedgerEntry>) -> StagerResult<()> {
        entries.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then_with(|| compare_or_lexical(&b.version, &a.version))
        });
        let document = LedgerDocument { packages: entries };
        write_atomic(&self.path, serde_json::to_string_pretty(&document)?.as_bytes()).await
    }
}

/// The content-packages file: a JSON array of content folders, in load order.
#[derive(Debug, Clone)]
pub struct ContentPackagesFile {
    path: PathBuf,
}

impl ContentPackagesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> StagerResult<Vec<String>> {
        let Some(content) = read_if_present(&self.path).await? else {
            return Ok(Vec::new());
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn write(&self, folders: &[String]) -> StagerResult<()> {
        write_atomic(&self.path, serde_json::to_string_pretty(folders)?.as_bytes()).await
    }
}

async fn read_if_present(path: &Path) -> StagerResult<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
