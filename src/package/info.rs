//! Package descriptors and the identity read from them.

use crate::core::path::PACKAGE_DESCRIPTOR;
use crate::core::version::ANY_VERSION;
use crate::core::{StagerError, StagerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Software,
    Devices,
    Devtools,
}

impl PackageType {
    /// Normalize the `type` field of a descriptor. A missing type means software.
    pub fn parse(value: Option<&str>) -> StagerResult<Self> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("software") => Ok(PackageType::Software),
            Some("devices") | Some("device") => Ok(PackageType::Devices),
            Some("devtools") | Some("devtool") => Ok(PackageType::Devtools),
            Some(other) => Err(StagerError::Package(format!(
                "Unknown package type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageType::Software => f.write_str("software"),
            PackageType::Devices => f.write_str("devices"),
            PackageType::Devtools => f.write_str("devtools"),
        }
    }
}

/// Raw package descriptor as found on disk.
///
/// Fields are optional here; the validator reports which ones are missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PackageDescriptor {
    /// Read the descriptor of `package_folder`.
    ///
    /// The file holds either a single object or a one-element array.
    pub fn load(package_folder: &Path) -> StagerResult<Self> {
        let path = package_folder.join(PACKAGE_DESCRIPTOR);
        let content = fs::read_to_string(&path).map_err(|e| {
            StagerError::Package(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let value = match value {
            serde_json::Value::Array(mut items) if items.len() == 1 => items.remove(0),
            serde_json::Value::Array(items) => {
                return Err(StagerError::Package(format!(
                    "{} must describe exactly one package, found {}",
                    path.display(),
                    items.len()
                )))
            }
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Write a descriptor into `package_folder`, creating the metadata folders.
    pub fn save(&self, package_folder: &Path) -> StagerResult<()> {
        let path = package_folder.join(PACKAGE_DESCRIPTOR);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&[self])?)?;
        Ok(())
    }
}

/// Identity of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageInfo {
    pub id: String,
    pub version: String,
    #[serde(rename = "type")]
    pub package_type: PackageType,
}

impl PackageInfo {
    /// Non-software packages always get the `*` version since only one
    /// instance of each is ever kept.
    pub fn new(id: impl Into<String>, version: impl Into<String>, package_type: PackageType) -> Self {
        let version = match package_type {
            PackageType::Software => version.into(),
            _ => ANY_VERSION.to_string(),
        };
        Self {
            id: id.into(),
            version,
            package_type,
        }
    }

    pub fn from_descriptor(descriptor: &PackageDescriptor) -> StagerResult<Self> {
        let id = descriptor
            .id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| StagerError::Package("Package descriptor has no id".to_string()))?;
        let package_type = PackageType::parse(descriptor.package_type.as_deref())?;
        let version = match package_type {
            PackageType::Software => descriptor.version.clone().ok_or_else(|| {
                StagerError::Package(format!("Package {} has no version", id))
            })?,
            _ => ANY_VERSION.to_string(),
        };
        Ok(Self::new(id.trim(), version.trim(), package_type))
    }

    /// Read and type-normalize the descriptor of `package_folder`
    pub fn load(package_folder: &Path) -> StagerResult<Self> {
        Self::from_descriptor(&PackageDescriptor::load(package_folder)?)
    }
}

impl fmt::Display for PackageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(id: &str, version: &str, package_type: Option<&str>) -> PackageDescriptor {
        PackageDescriptor {
            id: Some(id.to_string()),
            version: Some(version.to_string()),
            package_type: package_type.map(str::to_string),
            name: None,
        }
    }

    #[test]
    fn test_package_type_parse() {
        assert_eq!(PackageType::parse(None).unwrap(), PackageType::Software);
        assert_eq!(
            PackageType::parse(Some("Devices")).unwrap(),
            PackageType::Devices
        );
        assert_eq!(
            PackageType::parse(Some("devtools")).unwrap(),
            PackageType::Devtools
        );
        assert!(PackageType::parse(Some("firmware")).is_err());
    }

    #[test]
    fn test_non_software_uses_any_version() {
        let info =
            PackageInfo::from_descriptor(&descriptor("boards", "2.0.0", Some("devices"))).unwrap();
        assert_eq!(info.version, ANY_VERSION);
        assert_eq!(info.package_type, PackageType::Devices);
    }

    #[test]
    fn test_load_round_trip_through_folder() {
        let temp = TempDir::new().unwrap();
        descriptor("foo", "1.0.0", None).save(temp.path()).unwrap();
        let info = PackageInfo::load(temp.path()).unwrap();
        assert_eq!(info, PackageInfo::new("foo", "1.0.0", PackageType::Software));
        assert_eq!(info.to_string(), "foo@1.0.0");
    }

    #[test]
    fn test_load_accepts_plain_object() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(PACKAGE_DESCRIPTOR);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"id": "bar", "version": "1.2.3.4rc"}"#).unwrap();
        let info = PackageInfo::load(temp.path()).unwrap();
        assert_eq!(info.version, "1.2.3.4rc");
    }

    #[test]
    fn test_load_rejects_multiple_descriptors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(PACKAGE_DESCRIPTOR);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"[{"id": "a", "version": "1.0.0"}, {"id": "b", "version": "1.0.0"}]"#,
        )
        .unwrap();
        assert!(PackageInfo::load(temp.path()).is_err());
    }

    #[test]
    fn test_missing_id_is_an_error() {
        let d = PackageDescriptor {
            version: Some("1.0.0".to_string()),
            ..Default::default()
        };
        assert!(PackageInfo::from_descriptor(&d).is_err());
    }
}
