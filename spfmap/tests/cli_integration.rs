// spfmap/tests/cli_integration.rs

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

/// Helper to create a test domains file
fn create_test_domains_file(domains: &[&str]) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let content = domains.join("\n");
    fs::write(file.path(), content).expect("Failed to write to temp file");
    file
}

fn spfmap() -> Command {
    let mut cmd = Command::cargo_bin("spfmap").unwrap();
    // Keep user config and env out of the picture
    cmd.env_remove("SPFMAP_WORKERS")
        .env_remove("SPFMAP_DB")
        .env_remove("SPFMAP_TIMEOUT")
        .env_remove("SPFMAP_QUEUE_CAPACITY")
        .env_remove("SPFMAP_SCAN")
        .env_remove("SPFMAP_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_shows_flags() {
    spfmap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--target"))
        .stdout(predicate::str::contains("--infile"))
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--spf"))
        .stdout(predicate::str::contains("--dmarc"))
        .stdout(predicate::str::contains("--db"));
}

#[test]
fn test_no_input_fails() {
    spfmap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("You need to provide a target"));
}

#[test]
fn test_target_and_infile_conflict() {
    let file = create_test_domains_file(&["a.com"]);
    spfmap()
        .args(["--target", "a.com", "--infile"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not both"));
}

#[test]
fn test_zero_workers_rejected() {
    spfmap()
        .args(["--target", "a.com", "--workers", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Worker count must be between 1 and 100",
        ));
}

#[test]
fn test_missing_infile_fails_before_scanning() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("out.db");

    spfmap()
        .args(["--infile", "/definitely/not/here/domains.txt", "--db"])
        .arg(&db)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));

    assert!(!db.exists());
}

#[test]
fn test_invalid_timeout_rejected() {
    spfmap()
        .args(["--target", "a.com", "--timeout", "whenever"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid timeout"));
}

#[test]
fn test_invalid_config_file_rejected() {
    let config = create_test_domains_file(&["[defaults]", "workers = 500"]);
    spfmap()
        .args(["--target", "a.com", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}

/// Runs against whatever resolver the machine has. Any lookup outcome is fine,
/// the run must still finish and write one row.
#[test]
fn test_target_scan_json_summary() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scan.db");

    spfmap()
        .current_dir(dir.path())
        .args(["--target", "nonexistent-domain.invalid", "--timeout", "2s", "--json", "--db"])
        .arg(&db)
        .timeout(Duration::from_secs(60))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"domains_scanned\": 1"))
        .stdout(predicate::str::contains("\"records_persisted\": 1"));

    assert!(db.exists());
}

#[test]
fn test_overflowing_timeout_is_config_error() {
    spfmap()
        .args(["--target", "a.invalid", "--timeout", "999999999999999999m"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid timeout"));
}

#[test]
fn test_unreadable_infile_leaves_no_database() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("out.db");

    spfmap()
        .arg("--infile")
        .arg(dir.path())
        .arg("--db")
        .arg(&db)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not a regular file"));

    assert!(!db.exists());
}
