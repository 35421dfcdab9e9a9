//! Integration tests for the `berrylock` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const MINIMAL: &str = include_str!("../../berrylock-core/tests/fixtures/minimal-berry.lock");

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_berrylock"));
    cmd.env_remove("BERRYLOCK_LOCKFILE");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// A temp project holding the minimal fixture as `yarn.lock`.
fn project() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(dir.path().join("yarn.lock"), MINIMAL).expect("Failed to write lockfile");
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    cargo_bin()
        .arg("--cwd")
        .arg(dir)
        .args(args)
        .output()
        .expect("Failed to run berrylock")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

#[test]
fn test_version() {
    let output = cargo_bin().arg("version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("berrylock "), "unexpected: {stdout}");
}

#[test]
fn test_resolve_found() {
    let dir = project();
    let output = run(dir.path(), &["resolve", "lodash", "^4.17.0"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "lodash@npm:4.17.21 4.17.21\n"
    );
}

#[test]
fn test_resolve_json() {
    let dir = project();
    let output = run(dir.path(), &["--json", "resolve", "c", "*"]);
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["key"], "c@workspace:packages/c");
    assert_eq!(json["version"], "0.0.0-use.local");
}

#[test]
fn test_resolve_not_found_exits_1() {
    let dir = project();
    let output = run(dir.path(), &["--json", "resolve", "lodash", "^5.0.0"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["ok"], false);
}

#[test]
fn test_deps() {
    let dir = project();
    let output = run(dir.path(), &["deps", "a@workspace:packages/a"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "c *\nlodash ^4.17.0\n"
    );

    let output = run(dir.path(), &["deps", "zzz@npm:1.0.0"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_check_canonical() {
    let dir = project();
    let output = run(dir.path(), &["--json", "check"]);
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["entries"], 5);
    assert!(json["firstDifferenceLine"].is_null());
}

#[test]
fn test_check_not_canonical_exits_1() {
    let dir = project();
    let reordered = MINIMAL.replacen("  cacheKey: 8\n", "  cacheKey: 8\n\n", 1);
    fs::write(dir.path().join("yarn.lock"), reordered).unwrap();

    let output = run(dir.path(), &["--json", "check"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["ok"], false);
}

#[test]
fn test_prune_to_stdout() {
    let dir = project();
    let output = run(dir.path(), &["prune", "-w", "packages/b"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"b@workspace:packages/b\":\n"));
    assert!(stdout.contains("\"lodash@npm:^3.0.0 || ^4.0.0\":\n"));
    assert!(!stdout.contains("a@workspace:packages/a"));
}

#[test]
fn test_prune_to_file() {
    let dir = project();
    let output = run(
        dir.path(),
        &["--json", "prune", "-w", "packages/a", "-o", "pruned.lock"],
    );
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    assert_eq!(json["kept"], 4);
    assert_eq!(json["dropped"], 1);

    let pruned = fs::read_to_string(dir.path().join("pruned.lock")).unwrap();
    assert!(pruned.contains("\"a@workspace:packages/a\":\n"));
    assert!(!pruned.contains("b@workspace"));

    // The written file is itself canonical.
    let output = run(dir.path(), &["--lockfile", "pruned.lock", "check"]);
    assert!(output.status.success());
}

#[test]
fn test_prune_unknown_workspace_fails() {
    let dir = project();
    let output = run(dir.path(), &["prune", "-w", "packages/zzz"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("packages/zzz"), "unexpected: {stderr}");
}

#[test]
fn test_lockfile_from_env() {
    let dir = project();
    fs::rename(dir.path().join("yarn.lock"), dir.path().join("other.lock")).unwrap();

    let output = cargo_bin()
        .env("BERRYLOCK_LOCKFILE", "other.lock")
        .arg("--cwd")
        .arg(dir.path())
        .args(["resolve", "lodash", "^4.17.0"])
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn test_missing_lockfile_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["check"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("yarn.lock"), "unexpected: {stderr}");
}
