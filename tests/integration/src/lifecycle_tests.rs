//! Cross-crate scenarios: interrupted runs, layered settings and several
//! repositories sharing one engine registry.

use std::sync::Arc;
use std::time::Duration;

use bdl_core::{
    ConnectOptions, ExecutorEvent, ItemStatus, Repository, RepositoryConfig, SettingsResolver,
    SyncMode, SyncOptions, SyncOverrides,
};
use bdl_engine::EngineRegistry;
use bdl_fs::{BdlPath, ConfigStore, NormalizedPath};
use bdl_test_utils::MockEngine;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn registry_with(mock: &Arc<MockEngine>) -> EngineRegistry {
    let mut registry = EngineRegistry::with_builtins();
    registry.register(mock.clone()).unwrap();
    registry
}

fn options(dir: &TempDir) -> SyncOptions {
    SyncOptions {
        resolver: SettingsResolver::with_user_config_dir(dir.path().join("user")),
        ..Default::default()
    }
}

fn connect(registry: &EngineRegistry, dir: &TempDir, name: &str) -> Repository {
    Repository::connect(
        registry,
        &NormalizedPath::new(dir.path()),
        MockEngine::URL,
        &ConnectOptions {
            name: Some(name.into()),
            ..Default::default()
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_interrupted_checkout_resumes() {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockEngine::new().with_delay(Duration::from_millis(50)));
    for n in 0..6 {
        mock.add(&format!("{n}.jpg"), format!("content {n}").as_bytes());
    }
    let registry = registry_with(&mock);
    let mut repo = connect(&registry, &dir, "gallery");

    // Cancel as soon as the first download lands
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if matches!(event, ExecutorEvent::Finished { .. }) {
                trigger.cancel();
            }
        }
    });
    let interrupted = SyncOptions {
        overrides: SyncOverrides {
            workers: Some(1),
            ..Default::default()
        },
        cancel,
        events: Some(tx),
        ..options(&dir)
    };

    let report = repo
        .sync(&registry, SyncMode::Checkout, &interrupted)
        .await
        .unwrap();
    drop(interrupted);
    watcher.await.unwrap();

    assert!(!report.is_success());
    assert!(report.cancelled > 0);
    assert_eq!(report.downloaded + report.cancelled + report.failed, 6);

    // What was downloaded is already recorded on disk
    let reopened = Repository::open(repo.root().clone()).unwrap();
    assert_eq!(reopened.status().counts.current, report.downloaded);

    let report = repo
        .sync(&registry, SyncMode::Checkout, &options(&dir))
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(repo.status().counts.current, 6);
    for n in 0..6 {
        assert_eq!(mock.download_attempts(&format!("{n}.jpg")), 1);
    }
}

#[tokio::test]
async fn test_repository_sync_table_limits_workers() {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockEngine::new().with_delay(Duration::from_millis(20)));
    for n in 0..8 {
        mock.add(&format!("{n}.jpg"), b"x");
    }
    let registry = registry_with(&mock);
    let repo = connect(&registry, &dir, "gallery");

    let config_path = repo.root().join(BdlPath::Config.as_str());
    let store = ConfigStore::new();
    let mut config: RepositoryConfig = store.load(&config_path).unwrap();
    config.sync.workers = Some(2);
    store.save(&config_path, &config).unwrap();

    let mut repo = Repository::open(repo.root().clone()).unwrap();
    let report = repo
        .sync(&registry, SyncMode::Checkout, &options(&dir))
        .await
        .unwrap();

    assert_eq!(report.downloaded, 8);
    assert!(mock.peak_concurrency() <= 2);
}

#[tokio::test]
async fn test_command_line_overrides_repository_settings() {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockEngine::new().with_delay(Duration::from_millis(20)));
    for n in 0..4 {
        mock.add(&format!("{n}.jpg"), b"x");
    }
    let registry = registry_with(&mock);
    let repo = connect(&registry, &dir, "gallery");

    let config_path = repo.root().join(BdlPath::Config.as_str());
    let store = ConfigStore::new();
    let mut config: RepositoryConfig = store.load(&config_path).unwrap();
    config.sync.workers = Some(4);
    store.save(&config_path, &config).unwrap();

    let mut repo = Repository::open(repo.root().clone()).unwrap();
    let serial = SyncOptions {
        overrides: SyncOverrides {
            workers: Some(1),
            ..Default::default()
        },
        ..options(&dir)
    };
    repo.sync(&registry, SyncMode::Checkout, &serial)
        .await
        .unwrap();

    assert_eq!(mock.peak_concurrency(), 1);
}

#[tokio::test]
async fn test_repositories_sync_independently() {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockEngine::new());
    mock.add("a.jpg", b"A").add("b.jpg", b"B");
    let registry = registry_with(&mock);
    let mut first = connect(&registry, &dir, "first");
    let mut second = connect(&registry, &dir, "second");
    let opts = options(&dir);

    let (one, two) = tokio::join!(
        first.sync(&registry, SyncMode::Checkout, &opts),
        second.sync(&registry, SyncMode::Update, &opts),
    );
    assert_eq!(one.unwrap().downloaded, 2);
    assert_eq!(two.unwrap().downloaded, 2);

    // Removing a file in one repository leaves the other alone
    std::fs::remove_file(dir.path().join("first/0.jpg")).unwrap();
    first
        .sync(&registry, SyncMode::Update, &opts)
        .await
        .unwrap();
    second
        .sync(&registry, SyncMode::Update, &opts)
        .await
        .unwrap();

    assert_eq!(
        first.index().items()[0].status,
        ItemStatus::Missing
    );
    assert_eq!(
        second.index().items()[0].status,
        ItemStatus::Current
    );
}
