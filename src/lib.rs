//! Stager: package lifecycle and staging engine
//!
//! Ingests versioned content packages, stages them into a served content
//! tree, and commits or rolls them back against an on-disk ledger. Errors,
//! versions and path helpers come from `stager-core`.

pub use stager_core::{ErrorCategory, StagerError, StagerResult};

/// Core module re-exported from stager-core, plus the submission log.
pub mod core;

/// Configuration management.
pub mod config;

/// Ledger, staging, commit and rollback of packages.
pub mod package;

/// Submission processing: fetch, extract, validate, stage, load, save.
pub mod submission;

/// Task progress tracking with barrier waits.
pub mod progress;

/// Single-worker task queue.
pub mod queue;

/// Handoff admission and maintenance mode.
pub mod handoff;

/// Dependency injection infrastructure.
pub mod di;

/// Reindexing through an external command.
pub mod refresh;

/// Notification delivery.
pub mod notify;
