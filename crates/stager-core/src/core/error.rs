use thiserror::Error;

pub type StagerResult<T> = Result<T, StagerError>;

/// Broad classes of failure a submission can end with.
///
/// Validation and conflict errors are raised before the ledger is touched.
/// I/O errors abort and trigger cleanup. Post-commit errors happen after a
/// package was staged and require a rollback plus a second reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    Io,
    PostCommit,
    Service,
}

#[derive(Error, Debug)]
pub enum StagerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WalkDir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version error: {0}")]
    Version(String),

    #[error("Package error: {0}")]
    Package(String),

    /// The package descriptor failed schema validation.
    #[error("Invalid package in {folder}: {}", .errors.join("; "))]
    InvalidPackage { folder: String, errors: Vec<String> },

    #[error("Nothing to handoff: no packages were found in the submission")]
    NothingToHandoff,

    #[error("Submission contains more than one package: {}", .0.join(", "))]
    MultiplePackages(Vec<String>),

    #[error("Submission must include a linux or all-platforms zip")]
    MissingLinuxZip,

    #[error("Submission mixes platform specific zips with all-platforms zips: {}", .0.join(", "))]
    MixedPlatformZips(Vec<String>),

    #[error("Package at {0} is not wrapped in a top-level folder")]
    MissingSubfolder(String),

    #[error("Package {id} version {version} already exists, submit with replace to overwrite it")]
    AlreadyExists { id: String, version: String },

    #[error("Package {id} version {version} is already staged")]
    AlreadyStaged { id: String, version: String },

    #[error("Package {id} version {version} is not staged")]
    NotStaged { id: String, version: String },

    #[error("Package {id} version {version} was staged by submission {staged_by}, not {requested_by}")]
    SubmissionMismatch {
        id: String,
        version: String,
        staged_by: String,
        requested_by: String,
    },

    #[error("Package {id} version {version} not found")]
    NotFound { id: String, version: String },

    #[error("Items already exist: {}", .0.join(", "))]
    ItemsExist(Vec<String>),

    #[error("Items are missing: {}", .0.join(", "))]
    ItemsMissing(Vec<String>),

    #[error("Refresh failed: {0}")]
    Refresh(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl StagerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StagerError::InvalidPackage { .. }
            | StagerError::NothingToHandoff
            | StagerError::MultiplePackages(_)
            | StagerError::MissingLinuxZip
            | StagerError::MixedPlatformZips(_)
            | StagerError::MissingSubfolder(_)
            | StagerError::Version(_)
            | StagerError::Package(_) => ErrorCategory::Validation,
            StagerError::AlreadyExists { .. }
            | StagerError::AlreadyStaged { .. }
            | StagerError::NotStaged { .. }
            | StagerError::SubmissionMismatch { .. }
            | StagerError::NotFound { .. }
            | StagerError::ItemsExist(_) => ErrorCategory::Conflict,
            StagerError::Refresh(_) => ErrorCategory::PostCommit,
            StagerError::ServiceUnavailable(_) | StagerError::InvalidState(_) => {
                ErrorCategory::Service
            }
            StagerError::Io(_)
            | StagerError::Json(_)
            | StagerError::Yaml(_)
            | StagerError::Http(_)
            | StagerError::WalkDir(_)
            | StagerError::Archive(_)
            | StagerError::Path(_)
            | StagerError::Config(_)
            | StagerError::ItemsMissing(_) => ErrorCategory::Io,
        }
    }
}
