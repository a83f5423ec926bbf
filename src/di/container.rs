//! Service container for dependency injection

use super::traits::{AssetFetcher, ContentRefresher, Notifier, PackageValidator};
use crate::config::Config;
use crate::core::StagerResult;
use crate::notify::LogNotifier;
use crate::package::downloader::HttpFetcher;
use crate::package::validator::DescriptorValidator;
use crate::refresh::CommandRefresher;
use std::sync::Arc;
use std::time::Duration;

/// Service container for dependency injection
///
/// Holds every collaborator as an `Arc<dyn Trait>` so the handoff pipeline
/// runs unchanged against real services or test mocks.
#[derive(Clone)]
pub struct ServiceContainer {
    pub refresher: Arc<dyn ContentRefresher>,
    pub validator: Arc<dyn PackageValidator>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub notifier: Arc<dyn Notifier>,
}

impl ServiceContainer {
    /// Create a service container with production implementations
    ///
    /// - the refresh command from the config
    /// - descriptor validation
    /// - an HTTP client with the configured download timeout
    /// - notifications written to the log
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> StagerResult<Self> {
        Ok(Self {
            refresher: Arc::new(CommandRefresher::new(config.refresh_command.clone())),
            validator: Arc::new(DescriptorValidator),
            fetcher: Arc::new(HttpFetcher::new(Duration::from_secs(
                config.download_timeout_secs,
            ))?),
            notifier: Arc::new(LogNotifier),
        })
    }

    /// Create a service container with custom provider implementations
    ///
    /// This is primarily useful for testing, where you can inject mock
    /// implementations of each service.
    pub fn with_providers(
        refresher: Arc<dyn ContentRefresher>,
        validator: Arc<dyn PackageValidator>,
        fetcher: Arc<dyn AssetFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            refresher,
            validator,
            fetcher,
            notifier,
        }
    }
}
