use crate::core::version;
use crate::core::StagerResult;
use crate::di::PackageValidator;
use crate::package::info::{PackageDescriptor, PackageType};
use std::path::Path;

/// Validates package descriptors before a submission is staged
pub struct DescriptorValidator;

impl DescriptorValidator {
    /// Every problem found in `descriptor`, empty when it is valid
    pub fn check(descriptor: &PackageDescriptor) -> Vec<String> {
        let mut errors = Vec::new();
        let package_type = match PackageType::parse(descriptor.package_type.as_deref()) {
            Ok(t) => Some(t),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        };

        if let Err(e) = Self::validate_id(descriptor.id.as_deref()) {
            errors.push(e);
        }
        if package_type == Some(PackageType::Software) {
            if let Err(e) = Self::validate_version(descriptor.version.as_deref()) {
                errors.push(e);
            }
        }
        errors
    }

    fn validate_id(id: Option<&str>) -> Result<(), String> {
        let id = match id.map(str::trim) {
            None | Some("") => return Err("Package id cannot be empty".to_string()),
            Some(id) => id,
        };

        // Ids become ledger keys and folder names
        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(format!(
                "Package id '{}' contains invalid characters. Use only alphanumeric, '-', '_' or '.'",
                id
            ));
        }
        if id.starts_with('.') {
            return Err(format!("Package id '{}' cannot start with '.'", id));
        }
        Ok(())
    }

    fn validate_version(version: Option<&str>) -> Result<(), String> {
        match version.map(str::trim) {
            None | Some("") => Err("Software packages need a version".to_string()),
            Some(v) if !version::valid(v) => Err(format!(
                "Invalid version format '{}'. Expected MAJOR.MINOR.PATCH with an optional build and qualifier (e.g. '1.2.3' or '1.2.3.4rc')",
                v
            )),
            Some(_) => Ok(()),
        }
    }
}

impl PackageValidator for DescriptorValidator {
    fn validate(&self, package_folder: &Path) -> StagerResult<Vec<String>> {
        match PackageDescriptor::load(package_folder) {
            Ok(descriptor) => Ok(Self::check(&descriptor)),
            Err(e) => Ok(vec![e.to_string()]),
        }
    }
}
