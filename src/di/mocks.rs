//! Mock implementations of service traits for testing

use super::traits::{AssetFetcher, ContentRefresher, Notification, Notifier, PackageValidator};
use crate::core::{StagerError, StagerResult, SubmissionLog};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Mock refresher counting its calls
///
/// Can be told to fail or panic on its next calls, to take some time, or to
/// wait for a gate, which is how tests force a post-commit failure or keep
/// submissions in flight.
///
/// # Example
///
/// ```
/// use stager::di::mocks::MockRefresher;
///
/// let refresher = MockRefresher::new();
/// refresher.fail_next(1);
/// assert_eq!(refresher.calls(), 0);
/// ```
#[derive(Default)]
pub struct MockRefresher {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    panics_remaining: AtomicUsize,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
}

impl MockRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresher that sleeps for `delay` on every call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Refresher whose calls block until [`MockRefresher::release`] lets them through
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Let `n` more gated calls through
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Make the next `n` calls fail
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls panic
    pub fn panic_next(&self, n: usize) {
        self.panics_remaining.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentRefresher for MockRefresher {
    async fn refresh_database(&self, log: &SubmissionLog) -> StagerResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.panics_remaining) {
            panic!("mock refresh panicked");
        }
        if take_one(&self.failures_remaining) {
            log.error("mock refresh failed");
            return Err(StagerError::Refresh("mock refresh failed".to_string()));
        }
        Ok(())
    }
}

/// Decrement `counter` unless it is zero, reporting whether it was positive.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Mock validator returning a fixed list of errors for every package
#[derive(Default)]
pub struct MockValidator {
    errors: Vec<String>,
}

impl MockValidator {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn rejecting(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

impl PackageValidator for MockValidator {
    fn validate(&self, _package_folder: &Path) -> StagerResult<Vec<String>> {
        Ok(self.errors.clone())
    }
}

/// Mock asset fetcher serving files from memory
#[derive(Default)]
pub struct MockFetcher {
    assets: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` as `file_name` at `url`
    pub fn add_asset(&self, url: &str, file_name: &str, data: Vec<u8>) {
        if let Ok(mut assets) = self.assets.lock() {
            assets.insert(url.to_string(), (file_name.to_string(), data));
        }
    }
}

#[async_trait]
impl AssetFetcher for MockFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> StagerResult<PathBuf> {
        let asset = self
            .assets
            .lock()
            .map_err(|_| StagerError::Package("mock fetcher poisoned".to_string()))?
            .get(url)
            .cloned();
        let (file_name, data) =
            asset.ok_or_else(|| StagerError::Package(format!("No asset at {}", url)))?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(file_name);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }
}

/// Notifier keeping every notification it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> StagerResult<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mock_refresher_fails_next_calls() {
        let refresher = MockRefresher::new();
        let log = SubmissionLog::new("s1");
        refresher.fail_next(1);
        assert!(refresher.refresh_database(&log).await.is_err());
        assert!(refresher.refresh_database(&log).await.is_ok());
        assert_eq!(refresher.calls(), 2);
        assert!(log.has_errors());
    }

    #[tokio::test]
    async fn test_gated_refresher_waits_for_release() {
        let refresher = std::sync::Arc::new(MockRefresher::gated());
        let call = {
            let refresher = refresher.clone();
            tokio::spawn(async move {
                let log = SubmissionLog::new("s1");
                refresher.refresh_database(&log).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!call.is_finished());
        assert_eq!(refresher.calls(), 1);

        refresher.release(1);
        call.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_mock_fetcher() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        fetcher.add_asset("https://example.com/a", "a__all.zip", b"zip".to_vec());

        let path = fetcher
            .fetch("https://example.com/a", temp.path())
            .await
            .unwrap();
        assert_eq!(path, temp.path().join("a__all.zip"));
        assert!(fetcher
            .fetch("https://example.com/missing", temp.path())
            .await
            .is_err());
    }
}
