//! Core module re-exports.
//!
//! Errors, versions and path helpers live in `stager-core`; the
//! per-submission log lives here since it is tied to `tracing`.

pub use stager_core::core::*;
pub use stager_core::*;

/// Per-submission log.
pub mod log;

pub use log::{LogLevel, LogLine, SubmissionLog};
