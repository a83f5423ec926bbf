//! Static helpers for laying out package folders and their zips.

use crate::core::path::{to_slash, PACKAGE_DESCRIPTOR, PRODUCT_TREE_FOLDER};
use crate::core::{StagerError, StagerResult};
use crate::package::fs_ops::{exists, link_or_copy, move_item};
use crate::package::info::{PackageInfo, PackageType};
use crate::package::platform::Platform;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Folders below `root` that contain a package descriptor, sorted.
pub fn get_package_folders(root: &Path) -> StagerResult<Vec<PathBuf>> {
    let depth = Path::new(PACKAGE_DESCRIPTOR).components().count();
    let mut folders = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().ends_with(PACKAGE_DESCRIPTOR) {
            if let Some(folder) = entry.path().ancestors().nth(depth) {
                folders.push(folder.to_path_buf());
            }
        }
    }
    folders.sort();
    folders.dedup();
    Ok(folders)
}

/// Read and type-normalize the descriptor of `package_folder`.
pub fn get_package_info(package_folder: &Path) -> StagerResult<PackageInfo> {
    PackageInfo::load(package_folder)
}

/// Entries directly inside `root`, sorted.
pub fn top_level_items(root: &Path) -> StagerResult<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut items: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    items.sort();
    Ok(items)
}

/// Move a non-software package under the product tree subfolder of
/// `extract_root` so it can't collide with software package roots.
///
/// Returns the (possibly unchanged) package folder.
pub async fn setup_package_folder_subfolder(
    extract_root: &Path,
    package_folder: &Path,
    info: &PackageInfo,
) -> StagerResult<PathBuf> {
    if info.package_type == PackageType::Software {
        return Ok(package_folder.to_path_buf());
    }

    let rel = package_folder.strip_prefix(extract_root).map_err(|_| {
        StagerError::Path(format!(
            "{} is not inside {}",
            package_folder.display(),
            extract_root.display()
        ))
    })?;
    if let Some(Component::Normal(first)) = rel.components().next() {
        if first == PRODUCT_TREE_FOLDER {
            return Ok(package_folder.to_path_buf());
        }
    }

    let dest = extract_root.join(PRODUCT_TREE_FOLDER).join(rel);
    if dest.starts_with(package_folder) {
        return Err(StagerError::Path(format!(
            "Cannot move {} into {}: the destination is inside the package itself",
            package_folder.display(),
            dest.display()
        )));
    }
    move_item(package_folder, &dest).await?;
    Ok(dest)
}

/// Replicate the package folder tree under `mirror_root`, placing every zip
/// at `<package folder>/<platform>/<zip name>`.
///
/// Returns the mirrored zips relative to `mirror_root`, which is also where
/// they go relative to the zips root once staged.
pub async fn zips_mirror_package_folder_structure(
    zips: &[PathBuf],
    package_folders: &[String],
    mirror_root: &Path,
) -> StagerResult<Vec<String>> {
    let mut mirrored = Vec::new();
    for folder in package_folders {
        for zip in zips {
            let name = zip
                .file_name()
                .ok_or_else(|| StagerError::Path(format!("{} has no file name", zip.display())))?;
            let platform = Platform::from_path(zip).unwrap_or(Platform::All);
            let rel = Path::new(folder).join(platform.dir_name()).join(name);
            link_or_copy(zip, &mirror_root.join(&rel)).await?;
            mirrored.push(to_slash(&rel));
        }
    }
    Ok(mirrored)
}

/// Fail with `ItemsMissing` unless every path exists.
pub async fn verify_items_exist(items: &[PathBuf]) -> StagerResult<()> {
    let mut missing = Vec::new();
    for item in items {
        if !exists(item).await {
            missing.push(item.display().to_string());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StagerError::ItemsMissing(missing))
    }
}

/// Fail with `ItemsExist` if any path exists.
pub async fn verify_items_do_not_exist(items: &[PathBuf]) -> StagerResult<()> {
    let mut present = Vec::new();
    for item in items {
        if exists(item).await {
            present.push(item.display().to_string());
        }
    }
    if present.is_empty() {
        Ok(())
    } else {
        Err(StagerError::ItemsExist(present))
    }
}
