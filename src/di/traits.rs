//! Trait definitions for the engine's external collaborators

use crate::core::{StagerResult, SubmissionLog};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Trait for rebuilding the resource index
///
/// Called after the content packages file changed. The engine only looks at
/// success or failure.
#[async_trait]
pub trait ContentRefresher: Send + Sync {
    async fn refresh_database(&self, log: &SubmissionLog) -> StagerResult<()>;
}

/// Trait for package descriptor schema validation
pub trait PackageValidator: Send + Sync {
    /// Validate the descriptor inside `package_folder`
    ///
    /// Returns the list of schema errors, empty when the package is valid.
    /// `Err` is reserved for failures to run the validation at all.
    fn validate(&self, package_folder: &Path) -> StagerResult<Vec<String>>;
}

/// Trait for fetching submission assets
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download `url` into `dest_dir`, returning the written file
    async fn fetch(&self, url: &str, dest_dir: &Path) -> StagerResult<PathBuf>;
}

/// A file attached to a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: String,
}

/// Message sent to a submitter once their handoff finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub sender: String,
    pub receiver: String,
    pub subject: String,
    pub payload: String,
    pub attachments: Vec<Attachment>,
}

/// Trait for notification (email) delivery
///
/// Delivery is best effort: callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> StagerResult<()>;
}
