//! Integration tests for the upload-media binary

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the binary with a clean environment
fn upload_cmd() -> Command {
    let mut cmd = Command::cargo_bin("upload-media").expect("Failed to find upload-media binary");
    cmd.env_clear();
    cmd
}

fn media_tree() -> TempDir {
    let src = TempDir::new().expect("Failed to create temp dir");
    fs::create_dir_all(src.path().join("img")).expect("Failed to create dir");
    fs::write(src.path().join("img/a.jpg"), "a").expect("Failed to write file");
    fs::write(src.path().join("img/b.jpg"), "b").expect("Failed to write file");
    src
}

fn as_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn test_local_storage_declined_without_terminal() {
    let src = media_tree();
    let dst = TempDir::new().expect("Failed to create temp dir");

    upload_cmd()
        .env("MEDIA_ROOT", as_str(src.path()))
        .env("LOCAL_STORAGE_ROOT", as_str(dst.path()))
        .write_stdin("y\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Storage backend: local filesystem"))
        .stdout(predicate::str::contains("Aborted: nothing uploaded."));

    assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 0);
}

#[test]
fn test_local_storage_with_yes_uploads_then_skips() {
    let src = media_tree();
    let dst = TempDir::new().expect("Failed to create temp dir");

    upload_cmd()
        .env("MEDIA_ROOT", as_str(src.path()))
        .env("LOCAL_STORAGE_ROOT", as_str(dst.path()))
        .arg("--yes")
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded: img/a.jpg"))
        .stdout(predicate::str::contains("Uploaded: 2 files"))
        .stdout(predicate::str::contains("Errors: 0 files"));

    upload_cmd()
        .env("MEDIA_ROOT", as_str(src.path()))
        .env("LOCAL_STORAGE_ROOT", as_str(dst.path()))
        .arg("--yes")
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped (exists): img/b.jpg"))
        .stdout(predicate::str::contains("Uploaded: 0 files"))
        .stdout(predicate::str::contains("Skipped: 2 files"));
}

#[test]
fn test_failed_files_exit_with_partial_status() {
    let src = media_tree();
    let dst = TempDir::new().expect("Failed to create temp dir");
    // A file where the img/ directory should go makes every write fail.
    fs::write(dst.path().join("img"), "blocker").expect("Failed to write file");

    upload_cmd()
        .args(["--yes", "--media-root", as_str(src.path())])
        .env("LOCAL_STORAGE_ROOT", as_str(dst.path()))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Errors: 2 files"))
        .stdout(predicate::str::contains("Failed files:"))
        .stdout(predicate::str::contains("  img/a.jpg: "))
        .stdout(predicate::str::contains("  img/b.jpg: "));
}

#[test]
fn test_incomplete_cloud_credentials_exit_one() {
    let src = media_tree();

    upload_cmd()
        .env("MEDIA_ROOT", as_str(src.path()))
        .env("AWS_ACCESS_KEY_ID", "AKIA")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("AWS S3 credentials not configured!"))
        .stderr(predicate::str::contains("AWS_SECRET_ACCESS_KEY"));
}

#[test]
fn test_missing_media_root_exit_one() {
    let tmp = TempDir::new().expect("Failed to create temp dir");

    upload_cmd()
        .args(["--yes", "--media-root", as_str(&tmp.path().join("media"))])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Source directory not found"));
}

#[test]
fn test_json_summary_on_stdout() {
    let src = media_tree();
    let dst = TempDir::new().expect("Failed to create temp dir");

    let output = upload_cmd()
        .env("MEDIA_ROOT", as_str(src.path()))
        .env("LOCAL_STORAGE_ROOT", as_str(dst.path()))
        .args(["--yes", "--json"])
        .output()
        .expect("Failed to run binary");

    assert!(output.status.success());
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(summary["transferred"], 2);
    assert_eq!(summary["skipped"], 0);
    assert_eq!(summary["failed"], 0);
    assert_eq!(summary["outcome"], "clean");
}

#[test]
fn test_local_destination_inside_media_root_exit_one() {
    let src = media_tree();

    upload_cmd()
        .env("MEDIA_ROOT", as_str(src.path()))
        .env("LOCAL_STORAGE_ROOT", as_str(&src.path().join("backup")))
        .arg("--yes")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("local destination is inside the media root"));

    assert!(!src.path().join("backup").exists());
}

#[test]
fn test_unknown_backend_flag_rejected() {
    upload_cmd()
        .args(["--backend", "ftp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown storage backend"));
}
