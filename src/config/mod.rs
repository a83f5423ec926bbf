use crate::core::path::{
    config_file, default_data_dir, ensure_dir, CONTENT_PACKAGES_FILE, HANDOFF_DIFF_DIR,
    LEDGER_FILE,
};
use crate::core::{StagerError, StagerResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the served content tree (defaults to `<data_dir>/content`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_root: Option<String>,

    /// Root of the zip download tree (defaults to `<data_dir>/zips`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zips_root: Option<String>,

    /// Directory holding the ledger files
    ///
    /// Default locations:
    /// - Windows: %APPDATA%\stager
    /// - Linux: ~/.local/share/stager
    /// - macOS: ~/Library/Application Support/stager
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Where submissions are downloaded and extracted (defaults to `<data_dir>/scratch`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,

    /// Command run to reindex content after a package changes
    /// Example: ["node", "refresh.js", "--full"]
    /// When empty the refresh step is skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refresh_command: Vec<String>,

    /// Sender address used for handoff notifications
    #[serde(default = "default_notification_sender")]
    pub notification_sender: String,

    /// Timeout for a single asset download, in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Reconcile the ledger with the content packages file at startup
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,
}

fn default_notification_sender() -> String {
    "no-reply@stager.local".to_string()
}

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_root: None,
            zips_root: None,
            data_dir: None,
            scratch_dir: None,
            refresh_command: Vec::new(),
            notification_sender: default_notification_sender(),
            download_timeout_secs: default_download_timeout_secs(),
            sync_on_startup: true,
        }
    }
}

impl Config {
    /// Load config from the platform-specific config directory, creating a
    /// default one if it doesn't exist
    ///
    /// Config locations:
    /// - Windows: %APPDATA%\stager\config.yaml
    /// - Linux: ~/.config/stager/config.yaml
    /// - macOS: ~/Library/Application Support/stager/config.yaml
    pub fn load() -> StagerResult<Self> {
        let config_path = config_file()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> StagerResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StagerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| StagerError::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save config to an explicit path
    pub fn save_to(&self, path: &Path) -> StagerResult<()> {
        let config_dir = path
            .parent()
            .ok_or_else(|| StagerError::Path("Invalid config path".to_string()))?;
        ensure_dir(config_dir)?;

        let content = serde_yaml::to_string(self)
            .map_err(|e| StagerError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the data directory path
    pub fn get_data_dir(&self) -> StagerResult<PathBuf> {
        match self.data_dir {
            Some(ref dir) => Ok(PathBuf::from(dir)),
            None => default_data_dir(),
        }
    }

    fn dir_or_default(&self, dir: &Option<String>, default: &str) -> StagerResult<PathBuf> {
        match dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(self.get_data_dir()?.join(default)),
        }
    }

    /// Resolve every path the engine works with
    pub fn layout(&self) -> StagerResult<StagingLayout> {
        Ok(StagingLayout::new(
            self.dir_or_default(&self.content_root, "content")?,
            self.dir_or_default(&self.zips_root, "zips")?,
            self.get_data_dir()?,
            self.dir_or_default(&self.scratch_dir, "scratch")?,
        ))
    }
}

/// Files and roots one ledger operates on.
#[derive(Debug, Clone)]
pub struct LedgerPaths {
    pub content_root: PathBuf,
    pub zips_root: PathBuf,
    pub ledger_file: PathBuf,
    pub content_packages_file: PathBuf,
}

/// Directory layout of a running engine.
///
/// The handoff diff ledger shares the content and zip roots with the main
/// ledger but keeps its own files under `<data_dir>/handoff-diff`.
#[derive(Debug, Clone)]
pub struct StagingLayout {
    pub content_root: PathBuf,
    pub zips_root: PathBuf,
    pub data_dir: PathBuf,
    pub scratch_root: PathBuf,
}

impl StagingLayout {
    pub fn new(
        content_root: PathBuf,
        zips_root: PathBuf,
        data_dir: PathBuf,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            content_root,
            zips_root,
            data_dir,
            scratch_root,
        }
    }

    /// Layout with every directory under a single root, handy for tests
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("content"),
            root.join("zips"),
            root.join("data"),
            root.join("scratch"),
        )
    }

    pub fn main_ledger(&self) -> LedgerPaths {
        LedgerPaths {
            content_root: self.content_root.clone(),
            zips_root: self.zips_root.clone(),
            ledger_file: self.data_dir.join(LEDGER_FILE),
            content_packages_file: self.data_dir.join(CONTENT_PACKAGES_FILE),
        }
    }

    pub fn diff_ledger(&self) -> LedgerPaths {
        let diff_dir = self.data_dir.join(HANDOFF_DIFF_DIR);
        LedgerPaths {
            content_root: self.content_root.clone(),
            zips_root: self.zips_root.clone(),
            ledger_file: diff_dir.join(LEDGER_FILE),
            content_packages_file: diff_dir.join(CONTENT_PACKAGES_FILE),
        }
    }

    /// Create every directory of the layout
    pub fn ensure(&self) -> StagerResult<()> {
        ensure_dir(&self.content_root)?;
        ensure_dir(&self.zips_root)?;
        ensure_dir(&self.data_dir)?;
        ensure_dir(&self.data_dir.join(HANDOFF_DIFF_DIR))?;
        ensure_dir(&self.scratch_root)?;
        Ok(())
    }
}
