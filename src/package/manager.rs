//! Stage, commit, roll back and delete packages against a ledger.
//!
//! Every operation takes the store lock for its whole duration, so at most
//! one mutation of the ledger, the content-packages file or the files they
//! describe is in flight per manager.

use crate::config::LedgerPaths;
use crate::core::path::{resolve, to_slash, BACKUP_FOLDER_PREFIX};
use crate::core::{StagerError, StagerResult, SubmissionLog};
use crate::package::folders::{get_package_info, verify_items_exist};
use crate::package::fs_ops::{
    exists, list_files, move_item, prune_empty_parents, remove_item, remove_quietly,
    write_atomic,
};
use crate::package::ledger::{ContentPackagesFile, EntryState, LedgerEntry, LedgerFile};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Previous ledger entry, persisted inside its backup folder.
pub const BACKUP_ENTRY_FILE: &str = "entry.json";

const BACKUP_CONTENT_DIR: &str = "content";
const BACKUP_ZIPS_DIR: &str = "zips";

/// Arguments of [`PackageManager::update_package`].
#[derive(Debug, Clone)]
pub struct UpdateArgs {
    pub entry: LedgerEntry,
    /// Discard the live files of the entry being replaced
    pub rollback: bool,
    /// Remove the entry instead of committing it
    pub delete_package: bool,
    /// Leave every file on disk untouched
    pub keep_items: bool,
}

impl UpdateArgs {
    /// A normal commit of `entry`.
    pub fn commit(entry: LedgerEntry) -> Self {
        Self {
            entry,
            rollback: false,
            delete_package: false,
            keep_items: false,
        }
    }

    /// Record `entry` without touching any file.
    pub fn record(entry: LedgerEntry) -> Self {
        Self {
            keep_items: true,
            ..Self::commit(entry)
        }
    }
}

/// Which versions of a package [`PackageManager::delete_package`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Exact(String),
    All,
}

impl VersionSelector {
    fn matches(&self, version: &str) -> bool {
        match self {
            VersionSelector::Exact(v) => v == version,
            VersionSelector::All => true,
        }
    }
}

impl std::fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionSelector::Exact(v) => f.write_str(v),
            VersionSelector::All => f.write_str("all"),
        }
    }
}

/// Edit of the content-packages file. `add` wins over `remove`.
#[derive(Debug, Clone, Default)]
pub struct PackagesFileUpdate {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    pub merge_with_existing: bool,
}

/// Items a staging has moved into its backup folder so far.
#[derive(Debug, Default)]
struct MovedAside {
    backup_root: Option<PathBuf>,
    content: Vec<String>,
    zips: Vec<String>,
}

struct LedgerStore {
    ledger: LedgerFile,
    packages_file: ContentPackagesFile,
}

pub struct PackageManager {
    content_root: PathBuf,
    zips_root: PathBuf,
    store: Mutex<LedgerStore>,
}

impl PackageManager {
    pub fn new(paths: LedgerPaths) -> Self {
        Self {
            content_root: paths.content_root,
            zips_root: paths.zips_root,
            store: Mutex::new(LedgerStore {
                ledger: LedgerFile::new(paths.ledger_file),
                packages_file: ContentPackagesFile::new(paths.content_packages_file),
            }),
        }
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    pub fn zips_root(&self) -> &Path {
        &self.zips_root
    }

    pub async fn get_ledger_entry(
        &self,
        id: &str,
        version: &str,
    ) -> StagerResult<Option<LedgerEntry>> {
        let store = self.store.lock().await;
        let entries = store.ledger.read().await?;
        Ok(entries.into_iter().find(|e| e.matches(id, version)))
    }

    /// Snapshot of every ledger entry.
    pub async fn entries(&self) -> StagerResult<Vec<LedgerEntry>> {
        let store = self.store.lock().await;
        store.ledger.read().await
    }

    /// Current content-packages file, in load order.
    pub async fn packages(&self) -> StagerResult<Vec<String>> {
        let store = self.store.lock().await;
        store.packages_file.read().await
    }

    /// The entry `entry` would replace if staged: the entry with the same id
    /// and version, or else an entry with the same id owning one of its paths.
    pub async fn find_replaced_entry(
        &self,
        entry: &LedgerEntry,
    ) -> StagerResult<Option<LedgerEntry>> {
        let store = self.store.lock().await;
        let entries = store.ledger.read().await?;
        Ok(replaced_index(&entries, entry).map(|i| entries[i].clone()))
    }

    /// Write `entry` as staged, moving the files of the entry it replaces into
    /// a fresh backup folder.
    pub async fn stage_package(
        &self,
        entry: LedgerEntry,
        log: &SubmissionLog,
    ) -> StagerResult<LedgerEntry> {
        let store = self.store.lock().await;
        let mut entries = store.ledger.read().await?;

        if entries
            .iter()
            .any(|e| e.matches(&entry.id, &entry.version) && e.is_staged())
        {
            return Err(StagerError::AlreadyStaged {
                id: entry.id,
                version: entry.version,
            });
        }
        let replaced = replaced_index(&entries, &entry);
        if let Some(old) = replaced.map(|i| &entries[i]) {
            if old.is_staged() {
                return Err(StagerError::AlreadyStaged {
                    id: old.id.clone(),
                    version: old.version.clone(),
                });
            }
        }

        self.check_collisions(&entries, &entry, replaced.map(|i| &entries[i]))
            .await?;

        let mut staged = entry;
        staged.state = EntryState::Staged;
        staged.clear_backup();

        let old = replaced.map(|i| entries.remove(i));
        let mut aside = MovedAside::default();
        if let Err(e) = self
            .record_staged(&store, entries, &mut staged, old.as_ref(), &mut aside, log)
            .await
        {
            self.undo_move_aside(&aside, log).await;
            return Err(e);
        }

        let removed: Vec<String> = old
            .map(|o| {
                o.content
                    .into_iter()
                    .filter(|c| !staged.content.contains(c))
                    .collect()
            })
            .unwrap_or_default();
        update_packages_file_locked(
            &store,
            PackagesFileUpdate {
                add: staged.content.clone(),
                remove: removed,
                merge_with_existing: true,
            },
        )
        .await?;

        log.info(format!("Staged {}@{}", staged.id, staged.version));
        Ok(staged)
    }

    /// Commit or delete an entry.
    pub async fn update_package(
        &self,
        args: UpdateArgs,
        log: &SubmissionLog,
    ) -> StagerResult<LedgerEntry> {
        let store = self.store.lock().await;
        let key = (args.entry.id.clone(), args.entry.version.clone());
        self.update_locked(&store, args, (&key.0, &key.1), log).await
    }

    /// Undo a staging: discard the staged files and bring back the entry the
    /// staging replaced. Returns `None` when there was nothing to restore and
    /// the package was deleted instead.
    pub async fn rollback_package(
        &self,
        entry: &LedgerEntry,
        log: &SubmissionLog,
    ) -> StagerResult<Option<LedgerEntry>> {
        let store = self.store.lock().await;
        let entries = store.ledger.read().await?;
        let current = entries
            .into_iter()
            .find(|e| e.matches(&entry.id, &entry.version))
            .filter(LedgerEntry::is_staged)
            .ok_or_else(|| StagerError::NotStaged {
                id: entry.id.clone(),
                version: entry.version.clone(),
            })?;
        if current.submission_id != entry.submission_id {
            return Err(StagerError::SubmissionMismatch {
                id: current.id,
                version: current.version,
                staged_by: current.submission_id,
                requested_by: entry.submission_id.clone(),
            });
        }

        let Some((previous, backup_root)) = self.read_backup(&current).await? else {
            log.warn(format!(
                "No backup to restore for {}@{}, deleting it",
                current.id, current.version
            ));
            let args = UpdateArgs {
                delete_package: true,
                ..UpdateArgs::commit(current.clone())
            };
            self.update_locked(&store, args, (&current.id, &current.version), log)
                .await?;
            return Ok(None);
        };

        let args = UpdateArgs {
            rollback: true,
            ..UpdateArgs::commit(previous)
        };
        let restored = self
            .update_locked(&store, args, (&current.id, &current.version), log)
            .await?;

        let backup_content = backup_root.join(BACKUP_CONTENT_DIR);
        for rel in current.backup_content.iter().flatten() {
            move_item(&resolve(&backup_content, rel)?, &resolve(&self.content_root, rel)?)
                .await?;
        }
        let backup_zips = backup_root.join(BACKUP_ZIPS_DIR);
        for rel in current.backup_zips.iter().flatten() {
            move_item(&resolve(&backup_zips, rel)?, &resolve(&self.zips_root, rel)?).await?;
        }
        remove_quietly(&backup_root).await;

        log.info(format!(
            "Rolled back {}@{} to {}@{}",
            current.id, current.version, restored.id, restored.version
        ));
        Ok(Some(restored))
    }

    /// Delete one or every version of a package.
    pub async fn delete_package(
        &self,
        id: &str,
        version: &VersionSelector,
        log: &SubmissionLog,
    ) -> StagerResult<Vec<LedgerEntry>> {
        let store = self.store.lock().await;
        let matched: Vec<LedgerEntry> = store
            .ledger
            .read()
            .await?
            .into_iter()
            .filter(|e| e.id == id && version.matches(&e.version))
            .collect();
        if matched.is_empty() {
            log.error(format!(
                "Cannot delete package {} version {}: not found",
                id, version
            ));
            return Err(StagerError::NotFound {
                id: id.to_string(),
                version: version.to_string(),
            });
        }

        let mut deleted = Vec::with_capacity(matched.len());
        for entry in matched {
            let args = UpdateArgs {
                delete_package: true,
                ..UpdateArgs::commit(entry.clone())
            };
            deleted.push(
                self.update_locked(&store, args, (&entry.id, &entry.version), log)
                    .await?,
            );
        }
        Ok(deleted)
    }

    pub async fn update_packages_file(
        &self,
        update: PackagesFileUpdate,
        log: &SubmissionLog,
    ) -> StagerResult<Vec<String>> {
        let store = self.store.lock().await;
        let folders = update_packages_file_locked(&store, update).await?;
        log.info(format!("Content packages file now lists {} folders", folders.len()));
        Ok(folders)
    }

    /// Make the folders of each package id contiguous, ordered by the first
    /// occurrence of the id. Folders without readable metadata go last.
    pub async fn sort_packages_file(&self, log: &SubmissionLog) -> StagerResult<Vec<String>> {
        let store = self.store.lock().await;
        let folders = store.packages_file.read().await?;

        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        let mut unreadable = Vec::new();
        for folder in folders {
            let info = resolve(&self.content_root, &folder)
                .and_then(|path| get_package_info(&path));
            match info {
                Ok(info) => match groups.iter_mut().find(|(id, _)| *id == info.id) {
                    Some((_, members)) => members.push(folder),
                    None => groups.push((info.id, vec![folder])),
                },
                Err(e) => {
                    tracing::debug!(folder = %folder, error = %e, "unreadable package metadata");
                    unreadable.push(folder);
                }
            }
        }

        let sorted: Vec<String> = groups
            .into_iter()
            .flat_map(|(_, members)| members)
            .chain(unreadable)
            .collect();
        store.packages_file.write(&sorted).await?;
        log.info("Sorted content packages file");
        Ok(sorted)
    }

    /// Add ledger entries for content folders the ledger does not know about.
    ///
    /// Zips are inferred from `<zips root>/<folder>/...`. Returns the entries
    /// that were added or extended.
    pub async fn sync_packages_file_to_package_manager_file(
        &self,
        log: &SubmissionLog,
    ) -> StagerResult<Vec<LedgerEntry>> {
        let store = self.store.lock().await;
        let mut entries = store.ledger.read().await?;
        let known: HashSet<String> = entries
            .iter()
            .flat_map(|e| e.content.iter().cloned())
            .collect();

        let mut touched: Vec<(String, String)> = Vec::new();
        for folder in store.packages_file.read().await? {
            if known.contains(&folder) {
                continue;
            }
            let info = match resolve(&self.content_root, &folder)
                .and_then(|path| get_package_info(&path))
            {
                Ok(info) => info,
                Err(e) => {
                    log.warn(format!("Skipping {}: {}", folder, e));
                    continue;
                }
            };

            let zip_dir = resolve(&self.zips_root, &folder)?;
            let zips: Vec<String> = list_files(&zip_dir)?
                .iter()
                .map(|rel| format!("{}/{}", folder, to_slash(rel)))
                .collect();

            match entries.iter_mut().find(|e| e.matches(&info.id, &info.version)) {
                Some(existing) => {
                    existing.content.push(folder.clone());
                    existing.zips.extend(zips);
                }
                None => entries.push(LedgerEntry::new(
                    info.id.clone(),
                    info.version.clone(),
                    vec![folder.clone()],
                    zips,
                    "",
                    "",
                )),
            }
            log.info(format!(
                "Recovered ledger entry for {}@{} from {}",
                info.id, info.version, folder
            ));
            if !touched.contains(&(info.id.clone(), info.version.clone())) {
                touched.push((info.id, info.version));
            }
        }

        if touched.is_empty() {
            return Ok(Vec::new());
        }
        let synced = entries
            .iter()
            .filter(|e| touched.iter().any(|(id, v)| e.matches(id, v)))
            .cloned()
            .collect();
        store.ledger.write(entries).await?;
        Ok(synced)
    }

    /// Commit `args.entry`, replacing the entry keyed by `old_key`.
    async fn update_locked(
        &self,
        store: &LedgerStore,
        args: UpdateArgs,
        old_key: (&str, &str),
        log: &SubmissionLog,
    ) -> StagerResult<LedgerEntry> {
        let mut entries = store.ledger.read().await?;
        let position = entries
            .iter()
            .position(|e| e.matches(old_key.0, old_key.1));
        let old = position.map(|i| entries.remove(i));

        if let (Some(old), false) = (&old, args.keep_items) {
            if args.rollback || args.delete_package {
                self.remove_entry_files(old).await?;
                if args.delete_package {
                    self.discard_backup(old).await;
                }
            } else if old.is_staged() {
                self.discard_backup(old).await;
            }
        }

        let mut entry = args.entry;
        entry.clear_backup();
        let mut update = PackagesFileUpdate {
            merge_with_existing: true,
            ..Default::default()
        };
        if args.delete_package {
            update.remove = entry.content.clone();
            if let Some(old) = &old {
                update.remove.extend(old.content.iter().cloned());
            }
        } else {
            entry.state = EntryState::Valid;
            // Another entry for the new key gives way to it
            entries.retain(|e| !e.matches(&entry.id, &entry.version));
            entries.push(entry.clone());
            update.add = entry.content.clone();
            if let Some(old) = &old {
                update.remove = old
                    .content
                    .iter()
                    .filter(|c| !entry.content.contains(c))
                    .cloned()
                    .collect();
            }
        }

        store.ledger.write(entries).await?;
        update_packages_file_locked(store, update).await?;

        if args.delete_package {
            log.info(format!("Deleted {}@{}", entry.id, entry.version));
        } else {
            log.info(format!("Committed {}@{}", entry.id, entry.version));
        }
        Ok(entry)
    }

    /// Fail if any path of `entry` is already on disk or claimed by another
    /// entry, unless it belongs to the entry being replaced.
    async fn check_collisions(
        &self,
        entries: &[LedgerEntry],
        entry: &LedgerEntry,
        replaced: Option<&LedgerEntry>,
    ) -> StagerResult<()> {
        let candidates = entry
            .content
            .iter()
            .map(|rel| (rel, &self.content_root))
            .chain(entry.zips.iter().map(|rel| (rel, &self.zips_root)));

        let mut collisions = Vec::new();
        for (rel, root) in candidates {
            if replaced.is_some_and(|r| r.owns(rel)) {
                continue;
            }
            let claimed = entries
                .iter()
                .any(|e| !e.matches(&entry.id, &entry.version) && e.owns(rel));
            if claimed || exists(&resolve(root, rel)?).await {
                collisions.push(rel.clone());
            }
        }
        if collisions.is_empty() {
            Ok(())
        } else {
            Err(StagerError::ItemsExist(collisions))
        }
    }

    /// Back up the files of `old`, if any, then write `staged` to the ledger.
    /// Everything moved so far is tracked in `aside`.
    async fn record_staged(
        &self,
        store: &LedgerStore,
        mut entries: Vec<LedgerEntry>,
        staged: &mut LedgerEntry,
        old: Option<&LedgerEntry>,
        aside: &mut MovedAside,
        log: &SubmissionLog,
    ) -> StagerResult<()> {
        if let Some(old) = old {
            let folder = format!("{}{}", BACKUP_FOLDER_PREFIX, uuid::Uuid::new_v4());
            let backup_root = self.content_root.join(&folder);
            aside.backup_root = Some(backup_root.clone());
            self.move_aside(
                &old.content,
                &self.content_root,
                &backup_root.join(BACKUP_CONTENT_DIR),
                &mut aside.content,
            )
            .await?;
            self.move_aside(
                &old.zips,
                &self.zips_root,
                &backup_root.join(BACKUP_ZIPS_DIR),
                &mut aside.zips,
            )
            .await?;
            write_atomic(
                &backup_root.join(BACKUP_ENTRY_FILE),
                serde_json::to_string_pretty(old)?.as_bytes(),
            )
            .await?;
            log.info(format!(
                "Backed up {}@{} into {}",
                old.id, old.version, folder
            ));
            staged.backup_content = Some(aside.content.clone());
            staged.backup_zips = Some(aside.zips.clone());
            staged.backup_folder = Some(folder);
        }

        entries.push(staged.clone());
        store.ledger.write(entries).await
    }

    /// Move the existing items of `items` from `root` to `backup`, recording
    /// each one in `moved` as it goes.
    async fn move_aside(
        &self,
        items: &[String],
        root: &Path,
        backup: &Path,
        moved: &mut Vec<String>,
    ) -> StagerResult<()> {
        for rel in items {
            let src = resolve(root, rel)?;
            if !exists(&src).await {
                tracing::warn!(path = %src.display(), "missing from disk, not backed up");
                continue;
            }
            move_item(&src, &resolve(backup, rel)?).await?;
            if let Some(parent) = src.parent() {
                prune_empty_parents(parent, root).await;
            }
            moved.push(rel.clone());
        }
        Ok(())
    }

    /// Put back whatever a failed staging moved into its backup folder. The
    /// folder itself is only removed once every item is back in place.
    async fn undo_move_aside(&self, aside: &MovedAside, log: &SubmissionLog) {
        let Some(backup_root) = &aside.backup_root else {
            return;
        };
        let mut restored = true;
        for (items, root, dir) in [
            (&aside.content, &self.content_root, BACKUP_CONTENT_DIR),
            (&aside.zips, &self.zips_root, BACKUP_ZIPS_DIR),
        ] {
            for rel in items {
                let result = match (resolve(&backup_root.join(dir), rel), resolve(root, rel)) {
                    (Ok(from), Ok(to)) => move_item(&from, &to).await,
                    (Err(e), _) | (_, Err(e)) => Err(e),
                };
                if let Err(e) = result {
                    restored = false;
                    log.error(format!(
                        "Could not restore {} from {}: {}",
                        rel,
                        backup_root.display(),
                        e
                    ));
                }
            }
        }
        if restored {
            remove_quietly(backup_root).await;
        }
    }

    /// Previous entry and backup folder of a staged entry, if the backup is
    /// still complete on disk.
    async fn read_backup(
        &self,
        staged: &LedgerEntry,
    ) -> StagerResult<Option<(LedgerEntry, PathBuf)>> {
        let Some(folder) = &staged.backup_folder else {
            return Ok(None);
        };
        let backup_root = resolve(&self.content_root, folder)?;
        let previous: LedgerEntry =
            match fs::read_to_string(backup_root.join(BACKUP_ENTRY_FILE)).await {
                Ok(raw) => serde_json::from_str(&raw)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

        let mut items = Vec::new();
        for rel in staged.backup_content.iter().flatten() {
            items.push(resolve(&backup_root.join(BACKUP_CONTENT_DIR), rel)?);
        }
        for rel in staged.backup_zips.iter().flatten() {
            items.push(resolve(&backup_root.join(BACKUP_ZIPS_DIR), rel)?);
        }
        if let Err(e) = verify_items_exist(&items).await {
            tracing::warn!(backup = %folder, error = %e, "backup is incomplete");
            return Ok(None);
        }
        Ok(Some((previous, backup_root)))
    }

    async fn remove_entry_files(&self, entry: &LedgerEntry) -> StagerResult<()> {
        for (items, root) in [
            (&entry.content, &self.content_root),
            (&entry.zips, &self.zips_root),
        ] {
            for rel in items {
                let path = resolve(root, rel)?;
                remove_item(&path).await?;
                if let Some(parent) = path.parent() {
                    prune_empty_parents(parent, root).await;
                }
            }
        }
        Ok(())
    }

    async fn discard_backup(&self, entry: &LedgerEntry) {
        if let Some(folder) = &entry.backup_folder {
            match resolve(&self.content_root, folder) {
                Ok(path) => remove_quietly(&path).await,
                Err(e) => tracing::warn!(backup = %folder, error = %e, "bad backup folder"),
            }
        }
    }
}

fn replaced_index(entries: &[LedgerEntry], entry: &LedgerEntry) -> Option<usize> {
    entries
        .iter()
        .position(|e| e.matches(&entry.id, &entry.version))
        .or_else(|| {
            entries.iter().position(|e| {
                e.id == entry.id && entry.content.iter().chain(&entry.zips).any(|p| e.owns(p))
            })
        })
}

async fn update_packages_file_locked(
    store: &LedgerStore,
    update: PackagesFileUpdate,
) -> StagerResult<Vec<String>> {
    let existing = if update.merge_with_existing {
        store.packages_file.read().await?
    } else {
        Vec::new()
    };

    let mut folders: Vec<String> = Vec::new();
    for folder in existing {
        let removed = update.remove.contains(&folder) && !update.add.contains(&folder);
        if !removed && !folders.contains(&folder) {
            folders.push(folder);
        }
    }
    for folder in update.add {
        if !folders.contains(&folder) {
            folders.push(folder);
        }
    }

    store.packages_file.write(&folders).await?;
    Ok(folders)
}
