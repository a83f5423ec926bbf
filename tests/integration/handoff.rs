//! End-to-end handoff scenarios

use super::common::{package_zip, read, TestEngine};
use stager::di::mocks::MockRefresher;
use stager::handoff::{Operation, ServiceState, SubmissionProgress};
use stager::package::{EntryState, VersionSelector};
use stager::progress::ProgressState;
use stager::submission::{Submission, ZipUpload};
use stager::StagerError;
use std::time::Duration;

const FOO_URL: &str = "https://assets.test/foo__linux.zip";

fn upload(url: &str, replace: bool) -> Submission {
    Submission {
        assets: vec![url.to_string()],
        email: "dev@example.com".to_string(),
        replace,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_upload_commits_package() {
    let engine = TestEngine::new();
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );

    let id = engine.handoff.upload_package(upload(FOO_URL, false)).unwrap();
    let outcome = engine.handoff.wait_for(&id).await.unwrap();
    assert!(outcome.succeeded(), "{:?}", outcome.error);
    assert_eq!(outcome.operation, Operation::Upload);

    assert_eq!(read(&engine.content("foo/readme.txt")), "v1");
    assert!(engine.zip("foo/linux/foo__linux.zip").is_file());

    let entries = engine.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, EntryState::Valid);
    assert_eq!(entries[0].content, vec!["foo"]);
    assert_eq!(entries[0].submission_id, id);
    assert_eq!(engine.handoff.packages().packages().await.unwrap(), vec!["foo"]);
    assert_eq!(engine.diff_entries().await.len(), 1);
    assert_eq!(engine.refresher.calls(), 1);

    let sent = engine.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].receiver, "dev@example.com");
    assert!(sent[0].subject.contains("foo@1.0.0"));
    assert!(sent[0].subject.contains("succeeded"));
}

#[tokio::test]
async fn test_upload_from_zip_upload() {
    let engine = TestEngine::new();
    let path = engine.upload_file("bar.zip", package_zip("bar", "bar", "2.0.0", "bar"));
    let submission = Submission {
        zip_uploads: vec![ZipUpload {
            path: path.clone(),
            original_name: "bar.zip".to_string(),
        }],
        ..Default::default()
    };

    let id = engine.handoff.upload_package(submission).unwrap();
    let outcome = engine.handoff.wait_for(&id).await.unwrap();
    assert!(outcome.succeeded(), "{:?}", outcome.error);

    // The all-platforms zip is aliased for every specific platform
    assert!(engine.zip("bar/all/bar.zip").is_file());
    assert!(engine.zip("bar/linux/bar__linux.zip").is_file());
    assert!(engine.zip("bar/win/bar__win.zip").is_file());
    assert!(engine.zip("bar/macos/bar__macos.zip").is_file());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_existing_package_requires_replace() {
    let engine = TestEngine::new();
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );
    let id = engine.handoff.upload_package(upload(FOO_URL, false)).unwrap();
    assert!(engine.handoff.wait_for(&id).await.unwrap().succeeded());

    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.1", "v2"),
    );
    let id = engine.handoff.upload_package(upload(FOO_URL, false)).unwrap();
    let outcome = engine.handoff.wait_for(&id).await.unwrap();
    assert!(outcome.error.unwrap().contains("already exists"));

    assert_eq!(read(&engine.content("foo/readme.txt")), "v1");
    let entries = engine.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].version, "1.0.0");
}

#[tokio::test]
async fn test_failed_refresh_restores_previous_version() {
    let engine = TestEngine::new();
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );
    let id = engine.handoff.upload_package(upload(FOO_URL, false)).unwrap();
    assert!(engine.handoff.wait_for(&id).await.unwrap().succeeded());

    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.1", "v2"),
    );
    engine.refresher.fail_next(1);
    let id = engine.handoff.upload_package(upload(FOO_URL, true)).unwrap();
    let outcome = engine.handoff.wait_for(&id).await.unwrap();
    assert!(!outcome.succeeded());

    // Reindexed once for the failed load and once after the rollback
    assert_eq!(engine.refresher.calls(), 3);
    assert_eq!(read(&engine.content("foo/readme.txt")), "v1");
    assert!(engine.zip("foo/linux/foo__linux.zip").is_file());
    assert!(engine.backups().is_empty());

    let entries = engine.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].version, "1.0.0");
    assert_eq!(entries[0].state, EntryState::Valid);
    assert!(entries[0].backup_folder.is_none());

    // The retry goes through
    let id = engine.handoff.upload_package(upload(FOO_URL, true)).unwrap();
    assert!(engine.handoff.wait_for(&id).await.unwrap().succeeded());
    assert_eq!(read(&engine.content("foo/readme.txt")), "v2");
    assert!(engine.backups().is_empty());
    let entries = engine.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].version, "1.0.1");
}

#[tokio::test]
async fn test_remove_package() {
    let engine = TestEngine::new();
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );
    let id = engine.handoff.upload_package(upload(FOO_URL, false)).unwrap();
    assert!(engine.handoff.wait_for(&id).await.unwrap().succeeded());

    let id = engine
        .handoff
        .remove_package("foo", VersionSelector::All, "dev@example.com")
        .unwrap();
    let outcome = engine.handoff.wait_for(&id).await.unwrap();
    assert!(outcome.succeeded(), "{:?}", outcome.error);
    assert_eq!(outcome.operation, Operation::Remove);
    assert_eq!(outcome.entries.len(), 1);

    assert!(!engine.content("foo").exists());
    assert!(!engine.zip("foo/linux/foo__linux.zip").exists());
    assert!(engine.entries().await.is_empty());
    assert!(engine.handoff.packages().packages().await.unwrap().is_empty());
    assert!(engine.diff_entries().await.is_empty());
}

#[tokio::test]
async fn test_remove_unknown_package_fails() {
    let engine = TestEngine::new();
    let id = engine
        .handoff
        .remove_package("ghost", VersionSelector::Exact("1.0.0".to_string()), "")
        .unwrap();
    let outcome = engine.handoff.wait_for(&id).await.unwrap();
    assert!(!outcome.succeeded());
}

#[tokio::test]
async fn test_maintenance_mode_drains_admitted_work() {
    let engine = TestEngine::with_refresher(MockRefresher::with_delay(Duration::from_millis(200)));
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );

    let id = engine.handoff.upload_package(upload(FOO_URL, false)).unwrap();
    assert!(matches!(
        engine.handoff.get_progress(&id),
        SubmissionProgress::Running(ProgressState::Loading)
    ));

    engine.handoff.maintenance_mode().await.unwrap();
    assert_eq!(engine.handoff.state(), ServiceState::MaintenanceMode);
    match engine.handoff.get_progress(&id) {
        SubmissionProgress::Finished(outcome) => assert!(outcome.succeeded()),
        other => panic!("Expected a finished submission, got {:?}", other),
    }

    let rejected = engine.handoff.upload_package(upload(FOO_URL, true));
    assert!(matches!(rejected, Err(StagerError::ServiceUnavailable(_))));

    engine.handoff.resume_service().await.unwrap();
    assert!(engine.handoff.upload_package(upload(FOO_URL, true)).is_ok());
}

#[tokio::test]
async fn test_submissions_run_one_at_a_time() {
    let engine = TestEngine::with_refresher(MockRefresher::with_delay(Duration::from_millis(50)));
    let urls: Vec<String> = (0..3)
        .map(|i| format!("https://assets.test/pkg{}__linux.zip", i))
        .collect();
    for (i, url) in urls.iter().enumerate() {
        let name = format!("pkg{}", i);
        engine.fetcher.add_asset(
            url,
            &format!("{}__linux.zip", name),
            package_zip(&name, &name, "1.0.0", &name),
        );
    }

    let ids: Vec<String> = urls
        .iter()
        .map(|url| engine.handoff.upload_package(upload(url, false)).unwrap())
        .collect();
    for id in &ids {
        assert!(engine.handoff.wait_for(id).await.unwrap().succeeded());
    }

    assert_eq!(
        engine.handoff.packages().packages().await.unwrap(),
        vec!["pkg0", "pkg1", "pkg2"]
    );
    assert_eq!(engine.refresher.calls(), 3);
}

#[tokio::test]
async fn test_duplicate_submission_id_rejected_while_running() {
    let engine = TestEngine::with_refresher(MockRefresher::with_delay(Duration::from_millis(200)));
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );
    let submission = Submission {
        submission_id: "fixed-id".to_string(),
        ..upload(FOO_URL, false)
    };
    let id = engine.handoff.upload_package(submission.clone()).unwrap();
    assert_eq!(id, "fixed-id");
    assert!(matches!(
        engine.handoff.upload_package(submission),
        Err(StagerError::InvalidState(_))
    ));
    assert!(engine.handoff.wait_for(&id).await.unwrap().succeeded());
}

const BAR_URL: &str = "https://assets.test/bar__linux.zip";

fn scratch_leftovers(engine: &TestEngine) -> Vec<String> {
    std::fs::read_dir(&engine.layout.scratch_root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_teardown_rejects_work_and_drains_every_admitted_job() {
    let engine = TestEngine::with_refresher(MockRefresher::gated());
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );
    engine.fetcher.add_asset(
        BAR_URL,
        "bar__linux.zip",
        package_zip("bar", "bar", "1.0.0", "bar"),
    );
    let ids = [
        engine.handoff.upload_package(upload(FOO_URL, false)).unwrap(),
        engine.handoff.upload_package(upload(BAR_URL, false)).unwrap(),
    ];

    let mut states = engine.handoff.subscribe();
    let handoff = engine.handoff.clone();
    let maintenance = tokio::spawn(async move { handoff.maintenance_mode().await });
    states
        .wait_for(|s| *s == ServiceState::Teardown)
        .await
        .unwrap();

    assert!(matches!(
        engine.handoff.upload_package(upload(FOO_URL, true)),
        Err(StagerError::ServiceUnavailable(_))
    ));
    assert!(matches!(
        engine
            .handoff
            .remove_package("foo", VersionSelector::All, "dev@example.com"),
        Err(StagerError::ServiceUnavailable(_))
    ));
    assert!(matches!(
        engine.handoff.maintenance_mode().await,
        Err(StagerError::InvalidState(_))
    ));

    let handoff = engine.handoff.clone();
    let resume = tokio::spawn(async move { handoff.resume_service().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!maintenance.is_finished());
    assert!(!resume.is_finished());
    assert_eq!(engine.handoff.state(), ServiceState::Teardown);

    engine.refresher.release(2);
    maintenance.await.unwrap().unwrap();
    for id in &ids {
        match engine.handoff.get_progress(id) {
            SubmissionProgress::Finished(outcome) => {
                assert!(outcome.succeeded(), "{:?}", outcome.error)
            }
            other => panic!("Expected a finished submission, got {:?}", other),
        }
    }
    assert_eq!(engine.refresher.calls(), 2);

    resume.await.unwrap().unwrap();
    assert_eq!(engine.handoff.state(), ServiceState::Up);
}

#[tokio::test]
async fn test_maintenance_mode_rejects_removals() {
    let engine = TestEngine::new();
    engine.handoff.maintenance_mode().await.unwrap();

    assert!(matches!(
        engine
            .handoff
            .remove_package("foo", VersionSelector::All, "dev@example.com"),
        Err(StagerError::ServiceUnavailable(_))
    ));
    // Entering it again is a no-op
    engine.handoff.maintenance_mode().await.unwrap();

    engine.handoff.resume_service().await.unwrap();
    assert!(matches!(
        engine.handoff.resume_service().await,
        Err(StagerError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_refresher_panic_restores_previous_version() {
    let engine = TestEngine::new();
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );
    let id = engine.handoff.upload_package(upload(FOO_URL, false)).unwrap();
    assert!(engine.handoff.wait_for(&id).await.unwrap().succeeded());

    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.1", "v2"),
    );
    engine.refresher.panic_next(1);
    let id = engine.handoff.upload_package(upload(FOO_URL, true)).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), engine.handoff.wait_for(&id))
        .await
        .unwrap()
        .unwrap();
    assert!(!outcome.succeeded());

    assert_eq!(read(&engine.content("foo/readme.txt")), "v1");
    assert!(engine.backups().is_empty());
    let entries = engine.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].version, "1.0.0");
    assert_eq!(entries[0].state, EntryState::Valid);
    assert!(scratch_leftovers(&engine).is_empty());

    tokio::time::timeout(Duration::from_secs(10), engine.handoff.maintenance_mode())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_refresher_panicking_during_rollback_still_finishes() {
    let engine = TestEngine::new();
    engine.fetcher.add_asset(
        FOO_URL,
        "foo__linux.zip",
        package_zip("foo", "foo", "1.0.0", "v1"),
    );
    engine.refresher.panic_next(2);

    let id = engine.handoff.upload_package(upload(FOO_URL, false)).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), engine.handoff.wait_for(&id))
        .await
        .unwrap()
        .unwrap();
    assert!(!outcome.succeeded());
    assert_eq!(engine.refresher.calls(), 2);

    assert!(engine.entries().await.is_empty());
    assert!(!engine.content("foo").exists());
    assert!(scratch_leftovers(&engine).is_empty());
    assert_eq!(engine.notifier.sent().len(), 1);

    tokio::time::timeout(Duration::from_secs(10), engine.handoff.maintenance_mode())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(engine.handoff.state(), ServiceState::MaintenanceMode);
}
