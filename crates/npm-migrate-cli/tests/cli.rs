//! Integration tests for the `npm-migrate-all` binary.

use std::process::{Command, Output};
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let manifest = concat!(env!("CARGO_MANIFEST_DIR"), "/../../Cargo.toml");
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-q", "--manifest-path", manifest]);
    cmd.args(["-p", "npm-migrate-cli", "--bin", "npm-migrate-all", "--"]);
    cmd
}

/// Run from a scratch directory so no project `.npmrc` is picked up.
fn run_isolated(args: &[&str]) -> Output {
    let dir = tempdir().unwrap();
    cargo_bin()
        .args(args)
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run npm-migrate-all")
}

#[test]
fn test_no_arguments_prints_usage() {
    let output = run_isolated(&[]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("--from"), "usage should mention --from: {stdout}");
    assert!(stdout.contains("--to"), "usage should mention --to: {stdout}");
}

#[test]
fn test_missing_packages_prints_usage() {
    let output = run_isolated(&["--from", "http://127.0.0.1:9/", "--to", "http://127.0.0.1:9/"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
}

#[test]
fn test_missing_destination_prints_usage() {
    let output = run_isolated(&["--from", "http://127.0.0.1:9/", "left-pad"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_help_shows_options() {
    let output = run_isolated(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for flag in ["--from", "--to", "--concurrency", "--json", "--verbose"] {
        assert!(stdout.contains(flag), "help should show {flag}: {stdout}");
    }
}

#[test]
fn test_invalid_package_identifier_fails() {
    let output = run_isolated(&[
        "--from",
        "http://127.0.0.1:9/",
        "--to",
        "http://127.0.0.1:9/",
        "bad name",
    ]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_unreachable_source_still_exits_zero() {
    let output = run_isolated(&[
        "--from",
        "http://127.0.0.1:9/",
        "--to",
        "http://127.0.0.1:9/",
        "--json",
        "left-pad",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|_| panic!("stdout should be valid JSON: {stdout}"));
    assert_eq!(json["succeeded"], serde_json::json!([]));
    assert_eq!(json["failed"], serde_json::json!([]));
    assert_eq!(json["skipped"], serde_json::json!([]));
}
