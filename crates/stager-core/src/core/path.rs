use crate::core::error::{StagerError, StagerResult};
use std::path::{Component, Path, PathBuf};

/// Package descriptor location, relative to a package folder.
pub const PACKAGE_DESCRIPTOR: &str = ".metadata/.tirex/package.tirex.json";

/// Subfolder that non-software packages are relocated under.
pub const PRODUCT_TREE_FOLDER: &str = "tirex-product-tree";

/// Prefix of the per-staging backup folders inside the content root.
pub const BACKUP_FOLDER_PREFIX: &str = "backup-";

/// Ledger file name (inside the data directory).
pub const LEDGER_FILE: &str = "package-manager.json";

/// Content packages file name (inside the data directory).
pub const CONTENT_PACKAGES_FILE: &str = "content-packages.json";

/// Directory holding the handoff diff ledger (inside the data directory).
pub const HANDOFF_DIFF_DIR: &str = "handoff-diff";

/// Get the Stager home directory
///
/// Platform-specific locations:
/// - Windows: %APPDATA%\stager
/// - Linux: ~/.config/stager
/// - macOS: ~/Library/Application Support/stager
pub fn stager_home() -> StagerResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| StagerError::Path("Could not determine config directory".to_string()))?;
    Ok(config_dir.join("stager"))
}

/// Get the config file path (`<stager home>/config.yaml`)
pub fn config_file() -> StagerResult<PathBuf> {
    Ok(stager_home()?.join("config.yaml"))
}

/// Get the default data directory
///
/// Platform-specific locations:
/// - Windows: %APPDATA%\stager\data
/// - Linux: ~/.local/share/stager
/// - macOS: ~/Library/Application Support/stager
pub fn default_data_dir() -> StagerResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| StagerError::Path("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("stager"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> StagerResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Path of `path` relative to `base`, using `/` separators.
///
/// Ledger and content-packages entries are always stored in this form so
/// the files stay portable between platforms.
pub fn relative_to(base: &Path, path: &Path) -> StagerResult<String> {
    let rel = path.strip_prefix(base).map_err(|_| {
        StagerError::Path(format!(
            "{} is not inside {}",
            path.display(),
            base.display()
        ))
    })?;
    Ok(to_slash(rel))
}

/// Render a relative path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a `/`-separated ledger path against `root`.
///
/// Rejects absolute paths and `..` components so a tampered ledger cannot
/// point the engine outside its roots.
pub fn resolve(root: &Path, rel: &str) -> StagerResult<PathBuf> {
    let mut out = root.to_path_buf();
    for part in rel.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if part == ".." || Path::new(part).is_absolute() {
            return Err(StagerError::Path(format!(
                "Refusing to resolve {} outside {}",
                rel,
                root.display()
            )));
        }
        out.push(part);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_to() {
        let base = Path::new("/srv/content");
        let rel = relative_to(base, &base.join("tirex-product-tree").join("board")).unwrap();
        assert_eq!(rel, "tirex-product-tree/board");
        assert!(relative_to(base, Path::new("/elsewhere/x")).is_err());
    }

    #[test]
    fn test_resolve() {
        let root = Path::new("/srv/content");
        assert_eq!(
            resolve(root, "foo/bar").unwrap(),
            PathBuf::from("/srv/content/foo/bar")
        );
        assert!(resolve(root, "../etc").is_err());
        assert!(resolve(root, "foo/../../etc").is_err());
    }

    #[test]
    fn test_ensure_dir() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
    }
}
