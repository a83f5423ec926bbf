//! Tests for the `stager` binary

use super::common::stager_command;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(root: &Path) -> std::path::PathBuf {
    let config = root.join("config.yaml");
    fs::write(
        &config,
        format!(
            "data_dir: {}\nsync_on_startup: false\n",
            root.join("data").display()
        ),
    )
    .unwrap();
    config
}

#[test]
fn test_compare_orders_versions() {
    let output = stager_command()
        .args(["compare", "1.0.0", "1.0.1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "-1");

    Command::cargo_bin("stager")
        .unwrap()
        .args(["compare", "1.2.3.4rc", "1.2.3"])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn test_compare_rejects_invalid_version() {
    Command::cargo_bin("stager")
        .unwrap()
        .args(["compare", "one", "1.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_list_empty_ledger() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    Command::cargo_bin("stager")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages"));
}

#[test]
fn test_list_json() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    let data = temp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(
        data.join("package-manager.json"),
        r#"{"packages": [{"id": "foo", "version": "1.0.0", "content": ["foo"], "zips": [], "state": "valid", "submissionId": "s1"}]}"#,
    )
    .unwrap();

    let output = stager_command()
        .arg("--config")
        .arg(&config)
        .args(["list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed[0]["id"], "foo");
    assert_eq!(parsed[0]["state"], "valid");
}

#[test]
fn test_remove_requires_version_or_all() {
    Command::cargo_bin("stager")
        .unwrap()
        .args(["remove", "foo"])
        .assert()
        .failure();
}

#[test]
fn test_upload_requires_assets() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    Command::cargo_bin("stager")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("upload")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to upload"));
}
