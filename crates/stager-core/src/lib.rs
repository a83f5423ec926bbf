//! Core utilities shared by the Stager crates: the error type, the
//! package version comparator and well-known path helpers.

pub mod core;

pub use crate::core::error::{ErrorCategory, StagerError, StagerResult};
pub use crate::core::version;
