//! Submissions rejected before anything is staged

use crate::common::{build_zip, package_zip};
use stager::config::StagingLayout;
use stager::core::SubmissionLog;
use stager::di::mocks::{MockFetcher, MockRefresher, MockValidator, RecordingNotifier};
use stager::di::ServiceContainer;
use stager::package::PackageManager;
use stager::submission::{Submission, SubmissionManager};
use stager::StagerError;
use std::sync::Arc;
use tempfile::TempDir;

struct Rig {
    _temp: TempDir,
    layout: StagingLayout,
    packages: Arc<PackageManager>,
    fetcher: Arc<MockFetcher>,
    manager: SubmissionManager,
}

fn rig(validator: MockValidator) -> Rig {
    let temp = TempDir::new().unwrap();
    let layout = StagingLayout::under(temp.path());
    layout.ensure().unwrap();
    let packages = Arc::new(PackageManager::new(layout.main_ledger()));
    let fetcher = Arc::new(MockFetcher::new());
    let services = ServiceContainer::with_providers(
        Arc::new(MockRefresher::new()),
        Arc::new(validator),
        fetcher.clone(),
        Arc::new(RecordingNotifier::new()),
    );
    let manager = SubmissionManager::new(
        packages.clone(),
        Arc::new(PackageManager::new(layout.diff_ledger())),
        services,
        layout.scratch_root.clone(),
    );
    Rig {
        _temp: temp,
        layout,
        packages,
        fetcher,
        manager,
    }
}

impl Rig {
    /// Submit `zips` as downloads and return the rejection
    async fn reject(&self, zips: Vec<(&str, Vec<u8>)>) -> StagerError {
        let mut assets = Vec::new();
        for (name, data) in zips {
            let url = format!("https://example.com/{}", name);
            self.fetcher.add_asset(&url, name, data);
            assets.push(url);
        }
        let submission = Submission {
            assets,
            submission_id: "s1".to_string(),
            email: "dev@example.com".to_string(),
            ..Default::default()
        };
        let log = SubmissionLog::new("s1");
        let err = self
            .manager
            .get_submission(&submission, &log)
            .await
            .unwrap_err();
        assert!(log.has_errors());
        err
    }

    async fn assert_untouched(&self) {
        assert!(self.packages.entries().await.unwrap().is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(&self.layout.scratch_root)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert!(leftovers.is_empty(), "scratch not cleaned: {:?}", leftovers);
    }
}

fn descriptor(id: &str, version: &str) -> String {
    format!(
        r#"[{{"id": "{}", "version": "{}", "type": "software", "name": "{}"}}]"#,
        id, version, id
    )
}

#[tokio::test]
async fn test_zip_without_descriptor_is_nothing_to_handoff() {
    let rig = rig(MockValidator::accepting());
    let zip = build_zip(&[("foo/readme.txt".to_string(), "v1".to_string())]);

    let err = rig.reject(vec![("foo__linux.zip", zip)]).await;

    assert!(matches!(err, StagerError::NothingToHandoff));
    rig.assert_untouched().await;
}

#[tokio::test]
async fn test_two_packages_in_one_submission_are_rejected() {
    let rig = rig(MockValidator::accepting());
    let zip = build_zip(&[
        (
            "foo/.metadata/.tirex/package.tirex.json".to_string(),
            descriptor("foo", "1.0.0"),
        ),
        (
            "bar/.metadata/.tirex/package.tirex.json".to_string(),
            descriptor("bar", "2.0.0"),
        ),
    ]);

    let err = rig.reject(vec![("foo__linux.zip", zip)]).await;

    match err {
        StagerError::MultiplePackages(found) => assert_eq!(found.len(), 2),
        other => panic!("Expected MultiplePackages, got {:?}", other),
    }
    rig.assert_untouched().await;
}

#[tokio::test]
async fn test_package_at_zip_root_is_missing_subfolder() {
    let rig = rig(MockValidator::accepting());
    let zip = build_zip(&[
        (
            ".metadata/.tirex/package.tirex.json".to_string(),
            descriptor("foo", "1.0.0"),
        ),
        ("readme.txt".to_string(), "v1".to_string()),
    ]);

    let err = rig.reject(vec![("foo__linux.zip", zip)]).await;

    assert!(matches!(err, StagerError::MissingSubfolder(_)));
    rig.assert_untouched().await;
}

#[tokio::test]
async fn test_windows_only_submission_is_missing_linux_zip() {
    let rig = rig(MockValidator::accepting());

    let err = rig
        .reject(vec![(
            "foo__win.zip",
            package_zip("foo", "foo", "1.0.0", "v1"),
        )])
        .await;

    assert!(matches!(err, StagerError::MissingLinuxZip));
    rig.assert_untouched().await;
}

#[tokio::test]
async fn test_all_platform_zip_mixed_with_specific_is_rejected() {
    let rig = rig(MockValidator::accepting());

    let err = rig
        .reject(vec![
            ("foo__all.zip", package_zip("foo", "foo", "1.0.0", "v1")),
            ("foo__win.zip", package_zip("foo", "foo", "1.0.0", "v1")),
        ])
        .await;

    assert!(matches!(err, StagerError::MixedPlatformZips(_)));
    rig.assert_untouched().await;
}

#[tokio::test]
async fn test_validator_errors_reject_the_package() {
    let rig = rig(MockValidator::rejecting(vec![
        "missing license".to_string(),
    ]));

    let err = rig
        .reject(vec![(
            "foo__linux.zip",
            package_zip("foo", "foo", "1.0.0", "v1"),
        )])
        .await;

    match err {
        StagerError::InvalidPackage { folder, errors } => {
            assert_eq!(folder, "foo");
            assert_eq!(errors, vec!["missing license"]);
        }
        other => panic!("Expected InvalidPackage, got {:?}", other),
    }
    assert!(!rig.layout.content_root.join("foo").exists());
    rig.assert_untouched().await;
}
