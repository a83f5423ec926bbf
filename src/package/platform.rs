//! Zip platform naming.
//!
//! Submitted zips carry their platform in the file name:
//! `foo_1.0.0__linux.zip`, `foo_1.0.0__win.zip`, `foo_1.0.0__macos.zip`,
//! `foo_1.0.0__all.zip`. A zip without a platform suffix is treated as an
//! all-platforms zip.

use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
    All,
}

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?P<stem>.+?)__(?P<platform>linux|win|macos|all)\.zip$")
            .expect("valid platform pattern")
    })
}

impl Platform {
    /// Platform-specific platforms, i.e. everything but `All`.
    pub const SPECIFIC: [Platform; 3] = [Platform::Linux, Platform::Windows, Platform::MacOs];

    /// Classify a zip by its file name. Returns `None` for non-zip files.
    pub fn from_zip_name(name: &str) -> Option<Self> {
        if !name.to_ascii_lowercase().ends_with(".zip") {
            return None;
        }
        let Some(caps) = suffix_pattern().captures(name) else {
            return Some(Platform::All);
        };
        match caps["platform"].to_ascii_lowercase().as_str() {
            "linux" => Some(Platform::Linux),
            "win" => Some(Platform::Windows),
            "macos" => Some(Platform::MacOs),
            _ => Some(Platform::All),
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_zip_name)
    }

    /// Name of the folder this platform's zips are kept under.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "win",
            Platform::MacOs => "macos",
            Platform::All => "all",
        }
    }

    /// Zips whose content drives indexing, and which therefore get extracted.
    pub fn is_linux_or_all(&self) -> bool {
        matches!(self, Platform::Linux | Platform::All)
    }

    /// Name of the `platform` alias of an all-platforms zip.
    ///
    /// `foo__all.zip` becomes `foo__linux.zip`; `foo.zip` becomes `foo__linux.zip`.
    pub fn alias_name(all_zip_name: &str, platform: Platform) -> String {
        let stem = match suffix_pattern().captures(all_zip_name) {
            Some(caps) => caps["stem"].to_string(),
            None => all_zip_name[..all_zip_name.len() - ".zip".len()].to_string(),
        };
        format!("{}__{}.zip", stem, platform.dir_name())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
