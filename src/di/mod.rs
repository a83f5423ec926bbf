//! Dependency injection for the engine's collaborators
//!
//! The staging engine talks to the reindexer, the schema validator, the
//! asset source and the mail system only through the traits in
//! [`traits`], so tests can swap any of them for the mocks in [`mocks`].
//!
//! # Example (Production)
//! ```no_run
//! use stager::config::Config;
//! use stager::di::ServiceContainer;
//!
//! # fn example() -> stager::core::StagerResult<()> {
//! let config = Config::load()?;
//! let container = ServiceContainer::new(&config)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example (Testing)
//! ```
//! use stager::di::{ServiceContainer, mocks::*};
//! use std::sync::Arc;
//!
//! let container = ServiceContainer::with_providers(
//!     Arc::new(MockRefresher::new()),
//!     Arc::new(MockValidator::accepting()),
//!     Arc::new(MockFetcher::new()),
//!     Arc::new(RecordingNotifier::new()),
//! );
//! ```

pub mod container;
pub mod mocks;
pub mod traits;

pub use container::ServiceContainer;
pub use traits::{
    AssetFetcher, Attachment, ContentRefresher, Notification, Notifier, PackageValidator,
};
