//! End-to-end integration test for the full stack
//!
//! Exercises the built-in local engine, the index on disk and the
//! repository lifecycle together: clone -> remote changes -> update ->
//! reset -> rename -> reopen.

use bdl_core::{
    ConnectOptions, ItemStatus, Repository, SettingsResolver, SyncMode, SyncOptions,
};
use bdl_engine::EngineRegistry;
use bdl_fs::NormalizedPath;
use bdl_fs::checksum::{compute_content_checksum, compute_file_checksum};
use bdl_test_utils::TestRemote;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

struct Setup {
    dir: TempDir,
    remote: TestRemote,
    registry: EngineRegistry,
    options: SyncOptions,
}

impl Setup {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let options = SyncOptions {
            resolver: SettingsResolver::with_user_config_dir(dir.path().join("user")),
            ..Default::default()
        };
        let remote = TestRemote::new();
        remote.put("alpha.jpg", b"alpha");
        remote.put("beta.png", b"beta");
        remote.put("gamma.jpg", b"gamma");
        Self {
            dir,
            remote,
            registry: EngineRegistry::with_builtins(),
            options,
        }
    }

    async fn clone(&self) -> Repository {
        let (repo, report) = Repository::clone_remote(
            &self.registry,
            &NormalizedPath::new(self.dir.path()),
            &self.remote.url(),
            &ConnectOptions {
                name: Some("photos".into()),
                ..Default::default()
            },
            &self.options,
        )
        .await
        .unwrap();
        assert!(report.is_success());
        repo
    }

    fn local(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join("photos").join(name)
    }
}

#[tokio::test]
async fn test_full_lifecycle_over_local_engine() {
    let setup = Setup::new();
    let mut repo = setup.clone().await;
    assert_eq!(repo.status().counts.current, 3);

    // Remote changes: one removed, one added
    setup.remote.delete("beta.png");
    setup.remote.put("delta.jpg", b"delta");
    let report = repo
        .sync(&setup.registry, SyncMode::Update, &setup.options)
        .await
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.delisted, 1);
    assert_eq!(report.downloaded, 1);
    assert_eq!(fs::read_to_string(setup.local("3.jpg")).unwrap(), "delta");

    // The delisted item keeps its position and its file
    let beta = repo.index().find_by_remote_id("beta.png").unwrap();
    assert_eq!(beta.position, 1);
    assert_eq!(beta.status, ItemStatus::Deleted);
    assert!(setup.local("1.png").is_file());

    // Lose a file locally, reset restores it
    fs::remove_file(setup.local("0.jpg")).unwrap();
    let report = repo
        .sync(&setup.registry, SyncMode::Reset, &setup.options)
        .await
        .unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(fs::read_to_string(setup.local("0.jpg")).unwrap(), "alpha");

    // Rename and reopen
    let rename = repo.rename(Some("{filename}-{position:02d}.{extension}")).unwrap();
    assert_eq!(rename.renamed, 4);
    assert!(rename.missing.is_empty());

    let reopened = Repository::open(repo.root().clone()).unwrap();
    let names: Vec<_> = reopened
        .index()
        .items()
        .iter()
        .map(|item| item.local_filename.clone().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["alpha-00.jpg", "beta-01.png", "gamma-02.jpg", "delta-03.jpg"]
    );
    for name in &names {
        assert!(setup.local(name).is_file(), "{name} should exist");
    }
}

#[tokio::test]
async fn test_index_on_disk_records_checksums_and_statuses() {
    let setup = Setup::new();
    let repo = setup.clone().await;

    let raw = fs::read_to_string(setup.local(".bdl/index.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["version"], 1);
    assert_eq!(value["template"], "{position}.{extension}");
    assert_eq!(value["next_position"], 3);

    let items = value["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2]["remote_id"], "gamma.jpg");
    assert_eq!(items[2]["status"], "current");
    assert_eq!(items[2]["local_filename"], "2.jpg");

    let item = &repo.index().items()[2];
    let on_disk = compute_file_checksum(&setup.local("2.jpg")).unwrap();
    assert_eq!(item.checksum.as_deref(), Some(on_disk.as_str()));
    assert_eq!(on_disk, compute_content_checksum(b"gamma"));
}

#[tokio::test]
async fn test_unknown_index_fields_survive_sync() {
    let setup = Setup::new();
    let mut repo = setup.clone().await;

    let path = setup.local(".bdl/index.json");
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    value["written_by"] = "a newer bdl".into();
    value["items"][0]["rating"] = 5.into();
    fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    setup.remote.put("delta.jpg", b"delta");
    repo.sync(&setup.registry, SyncMode::Update, &setup.options)
        .await
        .unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["written_by"], "a newer bdl");
    assert_eq!(value["items"][0]["rating"], 5);
    assert_eq!(value["items"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_local_engine_reports_size_metadata() {
    let setup = Setup::new();
    let repo = setup.clone().await;

    let alpha = repo.index().find_by_remote_id("alpha.jpg").unwrap();
    assert_eq!(alpha.metadata["size"].as_i64(), Some(5));
    assert_eq!(
        bdl_core::render("{filename}:{size}", &alpha.keywords()),
        "alpha:5"
    );
}
