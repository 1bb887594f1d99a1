mod common;

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use common::write_test_image;
use predicates::prelude::*;

fn cli(store: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("capture-queue").unwrap();
    cmd.arg("--store-dir").arg(store.path().join("queue"));
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("capture-queue").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("capture-queue"));
}

#[test]
fn test_subcommand_help() {
    for subcommand in ["profile", "capture", "import", "upload", "status", "prune"] {
        let mut cmd = Command::cargo_bin("capture-queue").unwrap();
        cmd.args([subcommand, "--help"]);
        cmd.assert().success();
    }
}

#[test]
fn test_profile_for_known_hint() {
    let mut cmd = Command::cargo_bin("capture-queue").unwrap();
    cmd.args(["profile", "3g"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1280px"))
        .stdout(predicate::str::contains("Format: JPEG"));
}

#[test]
fn test_profile_unknown_hint_falls_back() {
    let mut cmd = Command::cargo_bin("capture-queue").unwrap();
    cmd.args(["profile", "satellite"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("unknown"))
        .stdout(predicate::str::contains("1024px"));
}

#[test]
fn test_capture_missing_args() {
    let mut cmd = Command::cargo_bin("capture-queue").unwrap();
    cmd.args(["capture", "frame.jpg"]);
    cmd.assert().failure();
}

#[test]
fn test_capture_nonexistent_image() {
    let temp = TempDir::new().unwrap();
    cli(&temp)
        .args(["capture", "missing.jpg", "-i", "INS-1", "-p", "CP-1", "-u", "alice"])
        .assert()
        .failure();
}

#[test]
fn test_capture_then_status() {
    let temp = TempDir::new().unwrap();
    let frame = write_test_image(temp.path(), "frame.jpg", 800, 600);

    cli(&temp)
        .arg("capture")
        .arg(&frame)
        .args(["-i", "INS-1", "-p", "CP-1", "-u", "alice", "-n", "2g", "-k", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued 2 photo(s)"));

    cli(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 task(s)"))
        .stdout(predicate::str::contains("checkpoint-CP-1-"));
}

#[test]
fn test_capture_stops_at_configured_limit() {
    let temp = TempDir::new().unwrap();
    let frame = write_test_image(temp.path(), "frame.jpg", 320, 240);
    let config = temp.child("capture-queue.toml");
    config.write_str("[capture]\nmax_photos = 2\n").unwrap();

    cli(&temp)
        .arg("--config")
        .arg(config.path())
        .arg("capture")
        .arg(&frame)
        .args(["-i", "INS-1", "-p", "CP-9", "-u", "bob", "-k", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 remaining"));

    cli(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 task(s)"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let config = temp.child("bad.toml");
    config.write_str("[queue]\nmax_attempts = 0\n").unwrap();

    cli(&temp)
        .arg("--config")
        .arg(config.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts"));
}

#[test]
fn test_import_directory() {
    let temp = TempDir::new().unwrap();
    let photos = temp.child("photos");
    photos.create_dir_all().unwrap();
    write_test_image(photos.path(), "a.jpg", 300, 200);
    write_test_image(photos.path(), "b.jpg", 200, 300);
    photos.child("notes.txt").write_str("not an image").unwrap();

    cli(&temp)
        .arg("import")
        .arg(photos.path())
        .args(["-n", "3g"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued 2 image(s)"));

    cli(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 task(s)"));
}

#[test]
fn test_import_nonexistent_input() {
    let temp = TempDir::new().unwrap();
    cli(&temp)
        .args(["import", "does-not-exist"])
        .assert()
        .failure();
}

#[test]
fn test_upload_without_endpoint_fails() {
    let temp = TempDir::new().unwrap();
    cli(&temp)
        .arg("upload")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No upload endpoint configured"));
}

#[test]
fn test_upload_with_empty_queue_succeeds() {
    let temp = TempDir::new().unwrap();
    cli(&temp)
        .args(["upload", "--endpoint", "http://127.0.0.1:9/upload"])
        .assert()
        .success();
}

#[test]
fn test_upload_to_unreachable_endpoint_fails_task() {
    let temp = TempDir::new().unwrap();
    let frame = write_test_image(temp.path(), "frame.jpg", 320, 240);
    let config = temp.child("capture-queue.toml");
    config.write_str("[queue]\nmax_attempts = 1\n").unwrap();

    cli(&temp)
        .arg("--config")
        .arg(config.path())
        .arg("capture")
        .arg(&frame)
        .args(["-i", "INS-1", "-p", "CP-1", "-u", "alice"])
        .assert()
        .success();

    cli(&temp)
        .arg("--config")
        .arg(config.path())
        .args(["upload", "--endpoint", "http://127.0.0.1:9/upload"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 1 upload(s) failed"));

    cli(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"failed\s+1\n").unwrap());
}

#[test]
fn test_prune_empty_queue() {
    let temp = TempDir::new().unwrap();
    cli(&temp)
        .arg("prune")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 completed task(s)"));
}
