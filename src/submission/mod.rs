//! Turning a raw submission into a staged, loaded and committed package.
//!
//! The steps are separate so the handoff can run them in order and clean up
//! after whichever one failed:
//! get -> stage -> load -> save, then cleanup.

use crate::core::path::{relative_to, resolve};
use crate::core::{StagerError, StagerResult, SubmissionLog};
use crate::di::ServiceContainer;
use crate::package::extractor::ZipExtractor;
use crate::package::folders::{
    get_package_folders, get_package_info, setup_package_folder_subfolder, top_level_items,
    verify_items_do_not_exist, zips_mirror_package_folder_structure,
};
use crate::package::fs_ops::{exists, link_or_copy, move_item, remove_quietly};
use crate::package::info::PackageInfo;
use crate::package::ledger::LedgerEntry;
use crate::package::manager::{PackageManager, UpdateArgs, VersionSelector};
use crate::package::platform::Platform;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Folder inside the download folder holding the mirrored zips
const MIRROR_DIR: &str = "zips";

/// A zip uploaded with the submission request
#[derive(Debug, Clone)]
pub struct ZipUpload {
    pub path: PathBuf,
    pub original_name: String,
}

/// A package handoff request
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// URLs of zips to download
    pub assets: Vec<String>,
    pub zip_uploads: Vec<ZipUpload>,
    pub submission_id: String,
    pub email: String,
    /// Allow overwriting an existing package
    pub replace: bool,
}

/// Everything `get_submission` prepared on disk
#[derive(Debug, Clone)]
pub struct SubmissionContent {
    /// Zips, relative to the mirror folder and to the zips root
    pub zips: Vec<String>,
    /// Package folders, relative to the extract folder and to the content root
    pub package_folders: Vec<String>,
    pub top_level_items: Vec<PathBuf>,
    pub download_folder: PathBuf,
    pub extract_folder: PathBuf,
    pub package_info: PackageInfo,
}

impl SubmissionContent {
    pub fn mirror_folder(&self) -> PathBuf {
        self.download_folder.join(MIRROR_DIR)
    }
}

/// Arguments of [`SubmissionManager::cleanup_submission`]
#[derive(Debug)]
pub struct CleanupArgs<'a> {
    pub content: &'a SubmissionContent,
    pub submission_id: &'a str,
    /// Whether a step before cleanup failed
    pub failed: bool,
}

/// Zips of a submission, split by how they are handled
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ZipSet {
    /// Linux and all-platform zips, the ones that get extracted
    pub extract: Vec<PathBuf>,
    /// All-platform zips that need per-platform aliases
    pub all: Vec<PathBuf>,
    pub every: Vec<PathBuf>,
}

/// Check the platform mix of `zips` and decide what to extract.
pub fn classify_zips(zips: &[PathBuf]) -> StagerResult<ZipSet> {
    let mut set = ZipSet::default();
    let mut specific = Vec::new();
    for zip in zips {
        let Some(platform) = Platform::from_path(zip) else {
            continue;
        };
        match platform {
            Platform::All => set.all.push(zip.clone()),
            _ => specific.push(zip.clone()),
        }
        if platform.is_linux_or_all() {
            set.extract.push(zip.clone());
        }
        set.every.push(zip.clone());
    }

    if set.extract.is_empty() {
        return Err(StagerError::MissingLinuxZip);
    }
    if !set.all.is_empty() && !specific.is_empty() {
        let names = set
            .every
            .iter()
            .filter_map(|z| z.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        return Err(StagerError::MixedPlatformZips(names));
    }
    Ok(set)
}

pub struct SubmissionManager {
    packages: Arc<PackageManager>,
    handoff_diff: Arc<PackageManager>,
    services: ServiceContainer,
    scratch_root: PathBuf,
}

impl SubmissionManager {
    pub fn new(
        packages: Arc<PackageManager>,
        handoff_diff: Arc<PackageManager>,
        services: ServiceContainer,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            packages,
            handoff_diff,
            services,
            scratch_root,
        }
    }

    pub fn packages(&self) -> &Arc<PackageManager> {
        &self.packages
    }

    /// Fetch, extract and validate a submission.
    ///
    /// On failure the download and extract folders are removed before the
    /// error is returned.
    pub async fn get_submission(
        &self,
        submission: &Submission,
        log: &SubmissionLog,
    ) -> StagerResult<SubmissionContent> {
        let unique = uuid::Uuid::new_v4();
        let download_folder = self.scratch_root.join(format!("download-{}", unique));
        let extract_folder = self.scratch_root.join(format!("extract-{}", unique));

        let result = self
            .prepare(submission, &download_folder, &extract_folder, log)
            .await;
        if let Err(e) = &result {
            log.error(format!("Submission rejected: {}", e));
            remove_quietly(&download_folder).await;
            remove_quietly(&extract_folder).await;
        }
        result
    }

    async fn prepare(
        &self,
        submission: &Submission,
        download_folder: &Path,
        extract_folder: &Path,
        log: &SubmissionLog,
    ) -> StagerResult<SubmissionContent> {
        fs::create_dir_all(download_folder).await?;
        fs::create_dir_all(extract_folder).await?;

        let mut zips = Vec::new();
        for url in &submission.assets {
            log.info(format!("Fetching {}", url));
            zips.push(self.services.fetcher.fetch(url, download_folder).await?);
        }
        for upload in &submission.zip_uploads {
            let name = Path::new(&upload.original_name)
                .file_name()
                .ok_or_else(|| {
                    StagerError::Package(format!("Bad upload name '{}'", upload.original_name))
                })?;
            let dest = download_folder.join(name);
            move_item(&upload.path, &dest).await?;
            zips.push(dest);
        }
        for ignored in zips.iter().filter(|z| Platform::from_path(z).is_none()) {
            log.warn(format!("Ignoring {}: not a zip", ignored.display()));
        }

        let set = classify_zips(&zips)?;
        let extractor = ZipExtractor::new(extract_folder.to_path_buf());
        for zip in &set.extract {
            log.info(format!("Extracting {}", zip.display()));
            extractor.extract_async(zip).await?;
        }

        let mut every = set.every.clone();
        for all_zip in &set.all {
            let Some(name) = all_zip.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            for platform in Platform::SPECIFIC {
                let alias = download_folder.join(Platform::alias_name(name, platform));
                if !exists(&alias).await {
                    link_or_copy(all_zip, &alias).await?;
                    every.push(alias);
                }
            }
        }

        let folders = get_package_folders(extract_folder)?;
        if folders.is_empty() {
            return Err(StagerError::NothingToHandoff);
        }

        let mut infos: Vec<PackageInfo> = Vec::new();
        for folder in &folders {
            let shown = relative_to(extract_folder, folder).unwrap_or_default();
            let errors = self.services.validator.validate(folder)?;
            if !errors.is_empty() {
                return Err(StagerError::InvalidPackage {
                    folder: shown,
                    errors,
                });
            }
            if folder.as_path() == extract_folder {
                return Err(StagerError::MissingSubfolder(
                    extract_folder.display().to_string(),
                ));
            }
            let info = get_package_info(folder)?;
            if !infos.contains(&info) {
                infos.push(info);
            }
        }
        if infos.len() > 1 {
            return Err(StagerError::MultiplePackages(
                infos.iter().map(|i| i.to_string()).collect(),
            ));
        }
        let package_info = infos.remove(0);

        let mut package_folders = Vec::with_capacity(folders.len());
        for folder in &folders {
            let placed = setup_package_folder_subfolder(extract_folder, folder, &package_info)
                .await?;
            package_folders.push(relative_to(extract_folder, &placed)?);
        }

        let zips = zips_mirror_package_folder_structure(
            &every,
            &package_folders,
            &download_folder.join(MIRROR_DIR),
        )
        .await?;

        log.info(format!(
            "Found {} in {}",
            package_info,
            package_folders.join(", ")
        ));
        Ok(SubmissionContent {
            zips,
            package_folders,
            top_level_items: top_level_items(extract_folder)?,
            download_folder: download_folder.to_path_buf(),
            extract_folder: extract_folder.to_path_buf(),
            package_info,
        })
    }

    /// Stage the package and move its files into the content and zips roots.
    pub async fn stage_submission(
        &self,
        content: &SubmissionContent,
        submission: &Submission,
        log: &SubmissionLog,
    ) -> StagerResult<LedgerEntry> {
        let info = &content.package_info;
        let entry = LedgerEntry::new(
            info.id.clone(),
            info.version.clone(),
            content.package_folders.clone(),
            content.zips.clone(),
            submission.submission_id.clone(),
            submission.email.clone(),
        );

        let replaced = self.packages.find_replaced_entry(&entry).await?;
        if let (Some(existing), false) = (&replaced, submission.replace) {
            log.error(format!(
                "{}@{} already exists, resubmit with replace to overwrite it",
                existing.id, existing.version
            ));
            return Err(StagerError::AlreadyExists {
                id: existing.id.clone(),
                version: existing.version.clone(),
            });
        }

        let owned = |rel: &str| replaced.as_ref().is_some_and(|r| r.owns(rel));
        let mut destinations = Vec::new();
        for rel in entry.content.iter().filter(|r| !owned(r.as_str())) {
            destinations.push(resolve(self.packages.content_root(), rel)?);
        }
        for rel in entry.zips.iter().filter(|r| !owned(r.as_str())) {
            destinations.push(resolve(self.packages.zips_root(), rel)?);
        }
        verify_items_do_not_exist(&destinations).await?;

        let staged = self.packages.stage_package(entry, log).await?;

        for rel in &staged.content {
            move_item(
                &resolve(&content.extract_folder, rel)?,
                &resolve(self.packages.content_root(), rel)?,
            )
            .await?;
        }
        let mirror = content.mirror_folder();
        for rel in &staged.zips {
            move_item(&resolve(&mirror, rel)?, &resolve(self.packages.zips_root(), rel)?).await?;
        }
        log.info(format!("Moved {} into place", info));
        Ok(staged)
    }

    /// Commit a staged entry, and record it in the handoff diff ledger.
    pub async fn save_submission(
        &self,
        entry: LedgerEntry,
        log: &SubmissionLog,
    ) -> StagerResult<LedgerEntry> {
        let committed = self
            .packages
            .update_package(UpdateArgs::commit(entry), log)
            .await?;
        self.handoff_diff
            .update_package(UpdateArgs::record(committed.clone()), log)
            .await?;
        Ok(committed)
    }

    /// Sort the content packages file and reindex.
    pub async fn load_submission(&self, log: &SubmissionLog) -> StagerResult<()> {
        self.packages.sort_packages_file(log).await?;
        self.services.refresher.refresh_database(log).await
    }

    /// Roll back a failed submission that is still staged, then drop the
    /// transient folders.
    pub async fn cleanup_submission(
        &self,
        args: CleanupArgs<'_>,
        log: &SubmissionLog,
    ) -> StagerResult<()> {
        let mut result = Ok(());
        if args.failed {
            result = self.rollback_if_staged(&args, log).await;
        }
        remove_quietly(&args.content.download_folder).await;
        remove_quietly(&args.content.extract_folder).await;
        result
    }

    async fn rollback_if_staged(
        &self,
        args: &CleanupArgs<'_>,
        log: &SubmissionLog,
    ) -> StagerResult<()> {
        let info = &args.content.package_info;
        let current = self
            .packages
            .get_ledger_entry(&info.id, &info.version)
            .await?;
        let Some(staged) = current
            .filter(|e| e.is_staged() && e.submission_id == args.submission_id)
        else {
            return Ok(());
        };

        log.warn(format!("Rolling back {}", info));
        self.packages.rollback_package(&staged, log).await?;
        if let Err(e) = self.load_submission(log).await {
            log.error(format!("Reindex after rollback failed: {}", e));
            return Err(e);
        }
        Ok(())
    }

    /// Delete a package and reindex.
    pub async fn remove_submission(
        &self,
        id: &str,
        version: &VersionSelector,
        log: &SubmissionLog,
    ) -> StagerResult<Vec<LedgerEntry>> {
        let deleted = self.packages.delete_package(id, version, log).await?;
        for entry in &deleted {
            let args = UpdateArgs {
                delete_package: true,
                ..UpdateArgs::record(entry.clone())
            };
            self.handoff_diff.update_package(args, log).await?;
        }
        self.load_submission(log).await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/dl").join(n)).collect()
    }

    #[test]
    fn test_classify_linux_and_windows() {
        let set = classify_zips(&paths(&["foo__linux.zip", "foo__win.zip"])).unwrap();
        assert_eq!(set.extract, paths(&["foo__linux.zip"]));
        assert!(set.all.is_empty());
        assert_eq!(set.every.len(), 2);
    }

    #[test]
    fn test_classify_all_zip() {
        let set = classify_zips(&paths(&["foo.zip"])).unwrap();
        assert_eq!(set.extract, paths(&["foo.zip"]));
        assert_eq!(set.all, paths(&["foo.zip"]));
    }

    #[test]
    fn test_classify_requires_linux_or_all() {
        assert!(matches!(
            classify_zips(&paths(&["foo__win.zip", "foo__macos.zip"])),
            Err(StagerError::MissingLinuxZip)
        ));
        assert!(matches!(
            classify_zips(&paths(&["notes.txt"])),
            Err(StagerError::MissingLinuxZip)
        ));
    }

    #[test]
    fn test_classify_rejects_mixing() {
        match classify_zips(&paths(&["foo__all.zip", "foo__win.zip"])) {
            Err(StagerError::MixedPlatformZips(names)) => {
                assert_eq!(names, vec!["foo__all.zip", "foo__win.zip"])
            }
            other => panic!("Expected MixedPlatformZips, got {:?}", other),
        }
    }
}
