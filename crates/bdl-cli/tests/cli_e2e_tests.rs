//! CLI end-to-end tests that invoke the compiled `bdl` binary.
//!
//! Remotes are plain directories served by the built-in `local` engine
//! through `file://` URLs. Every test runs with its own working directory
//! and user config directory.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use bdl_test_utils::TestRemote;
use predicates::prelude::*;
use tempfile::TempDir;

/// A scratch working directory with a remote holding three files.
struct Workspace {
    dir: TempDir,
    remote: TestRemote,
}

impl Workspace {
    fn new() -> Self {
        let remote = TestRemote::new();
        remote.put("a.jpg", b"A");
        remote.put("b.png", b"B");
        remote.put("c.jpg", b"C");
        Self {
            dir: TempDir::new().unwrap(),
            remote,
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn bdl(&self) -> Command {
        let mut cmd = Command::cargo_bin("bdl").unwrap();
        cmd.current_dir(self.path())
            .env("HOME", self.path().join("home"))
            .env("XDG_CONFIG_HOME", self.path().join("home/.config"))
            .env("NO_COLOR", "1")
            .env_remove("BDL_JOBS")
            .env_remove("RUST_LOG");
        cmd
    }

    fn clone_gallery(&self) {
        self.bdl()
            .args(["clone", &self.remote.url(), "gallery"])
            .assert()
            .success();
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join("gallery").join(name)).unwrap()
    }
}

// ============================================================================
// Basics
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let ws = Workspace::new();
    ws.bdl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("checkout"))
        .stdout(predicate::str::contains("rename"));
}

#[test]
fn test_version_flag() {
    let ws = Workspace::new();
    ws.bdl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bdl"));
}

#[test]
fn test_no_command_prints_hint() {
    let ws = Workspace::new();
    ws.bdl()
        .assert()
        .success()
        .stdout(predicate::str::contains("bdl --help"));
}

#[test]
fn test_engines_lists_local_engine() {
    let ws = Workspace::new();
    ws.bdl()
        .arg("engines")
        .assert()
        .success()
        .stdout(predicate::str::contains("local"))
        .stdout(predicate::str::contains("file"));
}

// ============================================================================
// connect / clone
// ============================================================================

#[test]
fn test_connect_creates_repository_without_downloading() {
    let ws = Workspace::new();
    ws.bdl()
        .args(["co", &ws.remote.url(), "gallery", "--set", "quality=high"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Connected"));

    let config = fs::read_to_string(ws.path().join("gallery/.bdl/config.toml")).unwrap();
    assert!(config.contains("engine = \"local\""));
    assert!(config.contains("quality = \"high\""));
    assert!(!ws.path().join("gallery/0.jpg").exists());
}

#[test]
fn test_connect_twice_fails() {
    let ws = Workspace::new();
    ws.bdl()
        .args(["connect", &ws.remote.url(), "gallery"])
        .assert()
        .success();
    ws.bdl()
        .args(["connect", &ws.remote.url(), "gallery"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_connect_unknown_scheme_fails() {
    let ws = Workspace::new();
    ws.bdl()
        .args(["connect", "gopher://example.test/photos"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No installed engine"));
}

#[test]
fn test_clone_downloads_everything() {
    let ws = Workspace::new();
    ws.bdl()
        .args(["clone", &ws.remote.url(), "gallery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("downloaded 3"));

    assert_eq!(ws.read("0.jpg"), "A");
    assert_eq!(ws.read("1.png"), "B");
    assert_eq!(ws.read("2.jpg"), "C");
}

#[test]
fn test_clone_with_template_and_jobs() {
    let ws = Workspace::new();
    ws.bdl()
        .args([
            "--jobs",
            "1",
            "clone",
            &ws.remote.url(),
            "gallery",
            "--template",
            "{position:03d}-{filename}.{extension}",
        ])
        .assert()
        .success();

    assert_eq!(ws.read("000-a.jpg"), "A");
    assert_eq!(ws.read("002-c.jpg"), "C");
}

// ============================================================================
// Sync modes
// ============================================================================

#[test]
fn test_update_fetches_only_new_items() {
    let ws = Workspace::new();
    ws.clone_gallery();
    ws.remote.put("d.jpg", b"D");

    ws.bdl()
        .args(["up", "gallery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("downloaded 1"));
    assert_eq!(ws.read("3.jpg"), "D");
}

#[test]
fn test_update_from_inside_repository() {
    let ws = Workspace::new();
    ws.clone_gallery();
    ws.remote.put("d.jpg", b"D");

    let mut cmd = ws.bdl();
    cmd.current_dir(ws.path().join("gallery"));
    cmd.arg("update").assert().success();
    assert_eq!(ws.read("3.jpg"), "D");
}

#[test]
fn test_reset_restores_removed_file() {
    let ws = Workspace::new();
    ws.clone_gallery();
    fs::remove_file(ws.path().join("gallery/1.png")).unwrap();

    ws.bdl()
        .args(["reset", "gallery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("downloaded 1"));
    assert_eq!(ws.read("1.png"), "B");
}

#[test]
fn test_stash_overwrites_local_edits() {
    let ws = Workspace::new();
    ws.clone_gallery();
    fs::write(ws.path().join("gallery/0.jpg"), "edited").unwrap();

    ws.bdl().args(["stash", "gallery"]).assert().success();
    assert_eq!(ws.read("0.jpg"), "A");
}

#[test]
fn test_checkout_after_connect() {
    let ws = Workspace::new();
    ws.bdl()
        .args(["connect", &ws.remote.url(), "gallery"])
        .assert()
        .success();

    ws.bdl()
        .args(["-C", ws.path().to_str().unwrap(), "checkout", "gallery"])
        .assert()
        .success();
    assert_eq!(ws.read("2.jpg"), "C");
}

#[test]
fn test_sync_outside_repository_fails() {
    let ws = Workspace::new();
    ws.bdl()
        .args(["update", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not inside a bdl repository"));
}

#[test]
fn test_one_bad_target_fails_the_run_but_syncs_the_rest() {
    let ws = Workspace::new();
    ws.bdl()
        .args(["connect", &ws.remote.url(), "gallery"])
        .assert()
        .success();
    fs::create_dir(ws.path().join("plain")).unwrap();

    ws.bdl()
        .args(["checkout", "plain", "gallery"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 repositories failed"));
    assert_eq!(ws.read("0.jpg"), "A");
}

#[test]
fn test_corrupt_index_is_reported() {
    let ws = Workspace::new();
    ws.clone_gallery();
    fs::write(ws.path().join("gallery/.bdl/index.json"), "{ not json").unwrap();

    ws.bdl()
        .args(["update", "gallery"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt"));
    // Never replaced with an empty index
    assert_eq!(
        fs::read_to_string(ws.path().join("gallery/.bdl/index.json")).unwrap(),
        "{ not json"
    );
}

// ============================================================================
// status / diff / rename
// ============================================================================

#[test]
fn test_status_shows_counts() {
    let ws = Workspace::new();
    ws.clone_gallery();

    ws.bdl()
        .args(["status", "gallery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gallery"))
        .stdout(predicate::str::contains("current 3"));
}

#[test]
fn test_status_json_with_remote() {
    let ws = Workspace::new();
    ws.clone_gallery();
    ws.remote.put("d.jpg", b"D");

    let output = ws
        .bdl()
        .args(["status", "gallery", "--remote", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let status = &value[0];
    assert_eq!(status["name"], "gallery");
    assert_eq!(status["counts"]["current"], 3);
    assert_eq!(status["remote"]["reachable"], true);
    assert_eq!(status["remote"]["unindexed"], 1);
}

#[test]
fn test_status_remote_unreachable_fails() {
    let ws = Workspace::new();
    ws.clone_gallery();
    fs::remove_dir_all(ws.remote.root()).unwrap();

    ws.bdl()
        .args(["status", "gallery", "--remote"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("remote unreachable"));
}

#[test]
fn test_diff_reports_deleted_and_missing() {
    let ws = Workspace::new();
    ws.clone_gallery();
    ws.remote.delete("c.jpg");
    ws.bdl().args(["update", "gallery"]).assert().success();
    fs::remove_file(ws.path().join("gallery/0.jpg")).unwrap();

    ws.bdl()
        .args(["diff", "gallery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("c.jpg"))
        .stdout(predicate::str::contains("no longer listed"))
        .stdout(predicate::str::contains("0.jpg"))
        .stdout(predicate::str::contains("file missing"));
}

#[test]
fn test_rename_applies_template() {
    let ws = Workspace::new();
    ws.clone_gallery();

    ws.bdl()
        .args(["rename", "gallery", "--template", "{position:03d}.{extension}"])
        .assert()
        .success()
        .stdout(predicate::str::contains("renamed 3"));

    assert_eq!(ws.read("000.jpg"), "A");
    assert_eq!(ws.read("001.png"), "B");
    assert!(!ws.path().join("gallery/0.jpg").exists());
}

#[test]
fn test_rename_collision_fails_and_moves_nothing() {
    let ws = Workspace::new();
    ws.clone_gallery();

    ws.bdl()
        .args(["rename", "gallery", "--template", "same.{extension}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("collision"));
    assert_eq!(ws.read("0.jpg"), "A");
}
