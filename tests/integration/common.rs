//! Common utilities for integration tests

use stager::config::StagingLayout;
use stager::di::mocks::{MockFetcher, MockRefresher, MockValidator, RecordingNotifier};
use stager::di::ServiceContainer;
use stager::handoff::HandoffManager;
use stager::package::{LedgerEntry, PackageManager};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::FileOptions;

pub fn stager_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_stager"))
}

/// Engine on a temp layout, with handles on its mock services
pub struct TestEngine {
    pub temp: TempDir,
    pub layout: StagingLayout,
    pub handoff: HandoffManager,
    pub refresher: Arc<MockRefresher>,
    pub fetcher: Arc<MockFetcher>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_refresher(MockRefresher::new())
    }

    pub fn with_refresher(refresher: MockRefresher) -> Self {
        let temp = TempDir::new().unwrap();
        let layout = StagingLayout::under(temp.path());
        let refresher = Arc::new(refresher);
        let fetcher = Arc::new(MockFetcher::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let services = ServiceContainer::with_providers(
            refresher.clone(),
            Arc::new(MockValidator::accepting()),
            fetcher.clone(),
            notifier.clone(),
        );
        let handoff = HandoffManager::new(&layout, services, "stager@test").unwrap();
        Self {
            temp,
            layout,
            handoff,
            refresher,
            fetcher,
            notifier,
        }
    }

    pub fn content(&self, rel: &str) -> PathBuf {
        self.layout.content_root.join(rel)
    }

    pub fn zip(&self, rel: &str) -> PathBuf {
        self.layout.zips_root.join(rel)
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.handoff.packages().entries().await.unwrap()
    }

    pub async fn diff_entries(&self) -> Vec<LedgerEntry> {
        PackageManager::new(self.layout.diff_ledger())
            .entries()
            .await
            .unwrap()
    }

    /// Names in the content root starting with `backup-`
    pub fn backups(&self) -> Vec<String> {
        std::fs::read_dir(&self.layout.content_root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("backup-"))
            .collect()
    }

    /// Write a zip into the temp dir, to be submitted as an upload
    pub fn upload_file(&self, name: &str, data: Vec<u8>) -> PathBuf {
        let dir = self.temp.path().join("uploads");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }
}

/// Zip of a software package wrapped in a `folder/` top-level directory
pub fn package_zip(folder: &str, id: &str, version: &str, readme: &str) -> Vec<u8> {
    let descriptor = format!(
        r#"[{{"id": "{}", "version": "{}", "type": "software", "name": "{}"}}]"#,
        id, version, id
    );
    build_zip(&[
        (
            format!("{}/.metadata/.tirex/package.tirex.json", folder),
            descriptor,
        ),
        (format!("{}/readme.txt", folder), readme.to_string()),
    ])
}

pub fn build_zip(files: &[(String, String)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer.start_file(name.as_str(), FileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
