use super::{engine, print_outcome};
use indicatif::{ProgressBar, ProgressStyle};
use stager::config::Config;
use stager::core::{StagerError, StagerResult};
use stager::submission::{Submission, ZipUpload};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct UploadOptions {
    pub urls: Vec<String>,
    pub files: Vec<PathBuf>,
    pub replace: bool,
    pub email: Option<String>,
    pub submission_id: Option<String>,
}

pub async fn run(config: &Config, options: UploadOptions) -> StagerResult<()> {
    if options.urls.is_empty() && options.files.is_empty() {
        return Err(StagerError::Package(
            "Nothing to upload: pass --url and/or --file".to_string(),
        ));
    }

    let handoff = engine(config).await?;

    // Uploads are moved into the submission, so hand over copies
    let upload_dir = config
        .layout()?
        .scratch_root
        .join(format!("upload-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&upload_dir).await?;
    let mut zip_uploads = Vec::new();
    for file in &options.files {
        let original_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StagerError::Path(format!("{} is not a file", file.display())))?;
        let copy = upload_dir.join(&original_name);
        tokio::fs::copy(file, &copy).await.map_err(|e| {
            StagerError::Path(format!("Failed to read {}: {}", file.display(), e))
        })?;
        zip_uploads.push(ZipUpload {
            path: copy,
            original_name,
        });
    }

    let submission = Submission {
        assets: options.urls,
        zip_uploads,
        submission_id: options.submission_id.unwrap_or_default(),
        email: options.email.unwrap_or_default(),
        replace: options.replace,
    };

    let submission_id = handoff.upload_package(submission)?;
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Handing off submission {}", submission_id));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = handoff.wait_for(&submission_id).await;
    spinner.finish_and_clear();
    remove_upload_dir(&upload_dir).await;

    let outcome = outcome?;
    print_outcome(&outcome);
    match outcome.error {
        None => Ok(()),
        Some(error) => Err(StagerError::Package(error)),
    }
}

/// Drop the copies handed to the submission. Whatever the engine has not
/// already moved away is removed here.
async fn remove_upload_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove upload folder")
        }
    }
}
