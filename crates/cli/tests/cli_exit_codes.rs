// Exit codes and JSON output of the built `catsync` binary.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn catsync(args: &[&str], home: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_catsync"))
        .args(args)
        .env("HOME", home)
        .env_remove("GITHUB_TOKEN")
        .env_remove("GH_TOKEN")
        .output()
        .unwrap()
}

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok_and(|out| out.status.success())
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    let out = catsync(&["publish", "--no-such-flag"], home.path());
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn publish_outside_a_repository_reports_json_error() {
    if !git_available() {
        return;
    }
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let repo = dir.path().to_str().unwrap();

    let out = catsync(&["publish", "--repo", repo, "--no-prompt", "--no-viewer", "--json"], home.path());

    assert_eq!(out.status.code(), Some(2));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["success"], false);
    assert_eq!(report["error_kind"], "not_a_repository");
}

#[test]
fn status_lists_pending_files_as_json() {
    if !git_available() {
        return;
    }
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let run = |args: &[&str]| {
        let status = Command::new("git").args(args).current_dir(dir.path()).status().unwrap();
        assert!(status.success());
    };
    run(&["init", "--quiet"]);
    run(&["remote", "add", "origin", "git@github.com:acme/catalog.git"]);
    std::fs::write(dir.path().join("catalog.csv"), "sku\n1\n").unwrap();

    let out = catsync(&["status", "--repo", dir.path().to_str().unwrap(), "--json"], home.path());

    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["remote"], "origin");
    assert_eq!(report["protocol"], "ssh-shorthand");
    assert_eq!(report["remote_url"], "git@github.com:acme/catalog.git");
    assert_eq!(report["pending"][0], "?? catalog.csv");
}
