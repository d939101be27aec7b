//! Repository lifecycle
//!
//! A repository is a directory holding downloaded files plus a `.bdl/` state
//! directory with the configuration, the index and the lock file.
//! [`Repository`] ties them together and exposes the user-facing operations.

use std::collections::{BTreeMap, HashSet};

use bdl_engine::EngineRegistry;
use bdl_fs::{BdlPath, ConfigStore, NormalizedPath, RepoLock, io, sanitize_file_name};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{RepoSection, RepositoryConfig, SettingsResolver, SyncOverrides};
use crate::executor::ExecutorEvent;
use crate::index::{Index, StatusCounts};
use crate::item::{Item, ItemStatus};
use crate::sync::{SyncEngine, SyncMode, SyncReport};
use crate::template::{DEFAULT_TEMPLATE, render};
use crate::{Error, Result};

/// Options for creating a repository.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Local name; derived from the URL when `None`
    pub name: Option<String>,
    /// Filename template; [`DEFAULT_TEMPLATE`] when `None`
    pub template: Option<String>,
    /// Settings stored in the `[engine]` table
    pub engine_config: BTreeMap<String, String>,
}

/// Options for one synchronization run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Highest-priority settings layer (command line)
    pub overrides: SyncOverrides,
    pub resolver: SettingsResolver,
    pub cancel: CancellationToken,
    pub events: Option<mpsc::UnboundedSender<ExecutorEvent>>,
}

/// Local view of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryStatus {
    pub name: String,
    pub url: String,
    pub engine: String,
    pub template: String,
    pub counts: StatusCounts,
}

/// Result of probing the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub reachable: bool,
    /// Why the remote could not be listed
    pub error: Option<String>,
    pub listed: usize,
    /// Listed entries not yet in the index
    pub unindexed: usize,
}

/// Items needing attention.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff<'a> {
    /// Items no longer listed remotely
    pub deleted: Vec<&'a Item>,
    /// Items whose recorded local file is absent
    pub missing_files: Vec<&'a Item>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    pub renamed: usize,
    pub unchanged: usize,
    /// Positions whose file was not on disk
    pub missing: Vec<u64>,
}

struct PlannedMove {
    position: u64,
    from: String,
    to: String,
}

impl PlannedMove {
    fn temp_name(&self) -> String {
        format!(".bdl-rename-{}.tmp", self.position)
    }
}

/// A file moved off its old name during a rename.
struct StagedMove<'a> {
    planned: &'a PlannedMove,
    /// Already at its final name
    finished: bool,
}

#[derive(Debug)]
pub struct Repository {
    root: NormalizedPath,
    config: RepositoryConfig,
    index: Index,
}

impl Repository {
    /// Create a repository for `url` under `parent`, without downloading.
    ///
    /// # Errors
    ///
    /// Routing errors ([`Error::NoMatchingEngine`], [`Error::AmbiguousEngine`]),
    /// [`Error::UnnamedRepository`] when no name is given and none can be
    /// derived, [`Error::RepositoryExists`] when the target already holds a
    /// repository.
    pub fn connect(
        registry: &EngineRegistry,
        parent: &NormalizedPath,
        url: &str,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let resolution = registry.resolve(url)?;
        let name = match &options.name {
            Some(name) => name.clone(),
            None => registry
                .repository_name(url)
                .ok_or_else(|| Error::UnnamedRepository {
                    url: url.to_string(),
                })?,
        };
        let name = sanitize_file_name(&name)?;

        let root = parent.join(&name);
        let state_dir = root.join(BdlPath::StateDir.as_str());
        if state_dir.exists() {
            return Err(Error::RepositoryExists {
                path: root.to_native(),
            });
        }
        std::fs::create_dir_all(state_dir.to_native())
            .map_err(|e| bdl_fs::Error::io(state_dir.to_native(), e))?;

        let template = options
            .template
            .clone()
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        let config = RepositoryConfig {
            repo: RepoSection {
                name,
                url: url.to_string(),
                engine: resolution.engine_id,
                site: resolution.site_id,
                template: template.clone(),
                created_at: Utc::now(),
            },
            engine: options.engine_config.clone(),
            sync: SyncOverrides::default(),
        };
        ConfigStore::new().save(&root.join(BdlPath::Config.as_str()), &config)?;

        let index = Index::new(template);
        index.save(&root.join(BdlPath::Index.as_str()))?;

        tracing::info!(
            name = %config.repo.name,
            url,
            engine = %config.repo.engine,
            "Connected repository"
        );
        Ok(Self {
            root,
            config,
            index,
        })
    }

    /// Connect, then download everything with [`SyncMode::Checkout`].
    pub async fn clone_remote(
        registry: &EngineRegistry,
        parent: &NormalizedPath,
        url: &str,
        options: &ConnectOptions,
        sync: &SyncOptions,
    ) -> Result<(Self, SyncReport)> {
        let mut repository = Self::connect(registry, parent, url, options)?;
        let report = repository.sync(registry, SyncMode::Checkout, sync).await?;
        Ok((repository, report))
    }

    /// Open an existing repository.
    ///
    /// # Errors
    ///
    /// [`Error::NotARepository`] when `root` has no configuration,
    /// [`Error::IndexMissing`] or [`Error::IndexCorruption`] for a bad index.
    pub fn open(root: impl Into<NormalizedPath>) -> Result<Self> {
        let root = root.into();
        let config_path = root.join(BdlPath::Config.as_str());
        if !config_path.is_file() {
            return Err(Error::NotARepository {
                path: root.to_native(),
            });
        }
        let config: RepositoryConfig = ConfigStore::new().load(&config_path)?;
        let index = Index::load(&root.join(BdlPath::Index.as_str()))?;
        Ok(Self {
            root,
            config,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.repo.name
    }

    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn template(&self) -> &str {
        self.index.template()
    }

    fn index_path(&self) -> NormalizedPath {
        self.root.join(BdlPath::Index.as_str())
    }

    fn lock(&self) -> Result<RepoLock> {
        RepoLock::acquire(&self.root.join(BdlPath::Lock.as_str())).map_err(|e| match e {
            bdl_fs::Error::Locked { .. } => Error::RepositoryLocked {
                name: self.name().to_string(),
            },
            other => other.into(),
        })
    }

    /// Synchronize with the remote in `mode`.
    ///
    /// Holds the repository lock for the whole run and re-reads the index
    /// once the lock is taken.
    pub async fn sync(
        &mut self,
        registry: &EngineRegistry,
        mode: SyncMode,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let _lock = self.lock()?;
        self.index = Index::load(&self.index_path())?;

        let engine = registry.require(&self.config.repo.engine)?;
        let settings = options
            .resolver
            .resolve(Some(&self.config), &options.overrides)?;
        tracing::debug!(repository = %self.name(), %mode, ?settings, "Starting sync");

        let mut sync = SyncEngine::new(
            engine,
            self.config.descriptor(),
            self.root.clone(),
            settings,
        )
        .with_cancellation(options.cancel.clone());
        if let Some(events) = &options.events {
            sync = sync.with_events(events.clone());
        }
        sync.sync(&mut self.index, mode).await
    }

    /// Item counts per status.
    pub fn status(&self) -> RepositoryStatus {
        RepositoryStatus {
            name: self.config.repo.name.clone(),
            url: self.config.repo.url.clone(),
            engine: self.config.repo.engine.clone(),
            template: self.index.template().to_string(),
            counts: self.index.counts(),
        }
    }

    /// Try listing the remote and count entries the index does not know yet.
    pub async fn remote_status(&self, registry: &EngineRegistry) -> RemoteStatus {
        let unreachable = |error: String| RemoteStatus {
            reachable: false,
            error: Some(error),
            listed: 0,
            unindexed: 0,
        };
        let engine = match registry.require(&self.config.repo.engine) {
            Ok(engine) => engine,
            Err(e) => return unreachable(e.to_string()),
        };
        match engine.discover(&self.config.descriptor()).await {
            Ok(listing) => RemoteStatus {
                reachable: true,
                error: None,
                listed: listing.len(),
                unindexed: listing
                    .iter()
                    .filter(|entry| self.index.find_by_remote_id(&entry.id).is_none())
                    .count(),
            },
            Err(e) => unreachable(e.to_string()),
        }
    }

    /// Deleted items, and items whose local file is gone.
    pub fn diff(&self) -> Diff<'_> {
        Diff {
            deleted: self.index.with_status(ItemStatus::Deleted).collect(),
            missing_files: self
                .index
                .iterate(|item| {
                    item.local_filename
                        .as_deref()
                        .is_some_and(|name| !self.root.join(name).is_file())
                })
                .collect(),
        }
    }

    /// Put files moved by a failed rename back under their old names.
    ///
    /// A file that cannot be moved back keeps the name it has now, and its
    /// record is updated to match before the index is saved.
    fn undo_moves(&mut self, staged: &mut [StagedMove<'_>]) {
        let mut stranded = Vec::new();
        // Final names go back to temporary names first, freeing swapped names
        for staged_move in staged.iter_mut().rev().filter(|s| s.finished) {
            let m = staged_move.planned;
            match io::rename_no_clobber(&self.root.join(&m.to), &self.root.join(&m.temp_name())) {
                Ok(true) => staged_move.finished = false,
                _ => stranded.push((m.position, m.to.clone())),
            }
        }
        for staged_move in staged.iter().filter(|s| !s.finished) {
            let m = staged_move.planned;
            match io::rename_no_clobber(&self.root.join(&m.temp_name()), &self.root.join(&m.from)) {
                Ok(true) => {}
                _ => stranded.push((m.position, m.temp_name())),
            }
        }
        if stranded.is_empty() {
            return;
        }

        for (position, name) in stranded {
            tracing::warn!(position, file = %name, "Could not restore file after failed rename");
            self.index.set_local_filename(position, name);
        }
        if let Err(e) = self.index.save(&self.index_path()) {
            tracing::error!(error = %e, "Could not save index after failed rename");
        }
    }

    /// Switch to `template` (or the default) and rename every downloaded file.
    ///
    /// Files are first moved to temporary names and then to their final
    /// names, so swapping names between items is safe. A file that is not on
    /// disk is skipped with a warning; its record still gets the new name.
    ///
    /// # Errors
    ///
    /// [`Error::RenameCollision`] when two items would share a name, a
    /// target is taken by a file bdl does not track, or a temporary name is
    /// left over from an interrupted rename. Nothing is moved then. When a
    /// move fails halfway, the files already moved are put back first.
    pub fn rename(&mut self, template: Option<&str>) -> Result<RenameReport> {
        let _lock = self.lock()?;
        self.index = Index::load(&self.index_path())?;
        let template = template.unwrap_or(DEFAULT_TEMPLATE).to_string();

        let mut plan = Vec::new();
        let mut targets = HashSet::new();
        for item in self.index.iterate(|item| item.local_filename.is_some()) {
            let Some(from) = item.local_filename.clone() else {
                continue;
            };
            let to = sanitize_file_name(&render(&template, &item.keywords()))?;
            if to == BdlPath::StateDir.as_str() {
                return Err(Error::RenameCollision {
                    target: to,
                    reason: "name is reserved for repository state".into(),
                });
            }
            if !targets.insert(to.clone()) {
                return Err(Error::RenameCollision {
                    target: to,
                    reason: "template renders the same name for several items".into(),
                });
            }
            plan.push(PlannedMove {
                position: item.position,
                from,
                to,
            });
        }

        let sources: HashSet<&str> = plan.iter().map(|m| m.from.as_str()).collect();
        if let Some(blocked) = plan.iter().find(|m| {
            m.from != m.to && !sources.contains(m.to.as_str()) && self.root.join(&m.to).exists()
        }) {
            return Err(Error::RenameCollision {
                target: blocked.to.clone(),
                reason: "an untracked file already has that name".into(),
            });
        }

        for m in plan.iter().filter(|m| m.from != m.to) {
            let temp = m.temp_name();
            if self.root.join(&temp).exists() {
                return Err(Error::RenameCollision {
                    target: temp,
                    reason: "left over from an interrupted rename; move it away first".into(),
                });
            }
        }

        let mut report = RenameReport::default();
        let mut staged = Vec::new();
        let mut moved = Ok(());
        for m in &plan {
            if m.from == m.to {
                report.unchanged += 1;
                continue;
            }
            match io::rename_no_clobber(&self.root.join(&m.from), &self.root.join(&m.temp_name())) {
                Ok(true) => staged.push(StagedMove {
                    planned: m,
                    finished: false,
                }),
                Ok(false) => {
                    tracing::warn!(
                        position = m.position,
                        file = %m.from,
                        "File to rename is missing"
                    );
                    report.missing.push(m.position);
                }
                Err(e) => {
                    moved = Err(e);
                    break;
                }
            }
        }
        if moved.is_ok() {
            for staged_move in &mut staged {
                let m = staged_move.planned;
                if let Err(e) =
                    io::rename_no_clobber(&self.root.join(&m.temp_name()), &self.root.join(&m.to))
                {
                    moved = Err(e);
                    break;
                }
                staged_move.finished = true;
                tracing::debug!(from = %m.from, to = %m.to, "Renamed");
            }
        }
        if let Err(e) = moved {
            self.undo_moves(&mut staged);
            return Err(e.into());
        }
        report.renamed = staged.len();

        for m in &plan {
            if let Some(item) = self.index.get_mut(m.position) {
                item.local_filename = Some(m.to.clone());
                if report.missing.contains(&m.position) && item.status == ItemStatus::Current {
                    item.status = ItemStatus::Missing;
                }
            }
        }
        self.index.update_template(template.as_str());
        self.config.repo.template = template;
        ConfigStore::new().save(&self.root.join(BdlPath::Config.as_str()), &self.config)?;
        self.index.save(&self.index_path())?;

        tracing::info!(
            repository = %self.name(),
            renamed = report.renamed,
            missing = report.missing.len(),
            "Rename finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdl_test_utils::TestRemote;
    use tempfile::TempDir;

    async fn cloned(dir: &TempDir, remote: &TestRemote) -> Repository {
        remote.put("a.jpg", b"A");
        remote.put("b.jpg", b"B");
        let options = SyncOptions {
            resolver: SettingsResolver::with_user_config_dir(dir.path().join("user")),
            ..Default::default()
        };
        let (repo, _) = Repository::clone_remote(
            &EngineRegistry::with_builtins(),
            &NormalizedPath::new(dir.path()),
            &remote.url(),
            &ConnectOptions {
                name: Some("gallery".into()),
                ..Default::default()
            },
            &options,
        )
        .await
        .unwrap();
        repo
    }

    fn read(repo: &Repository, name: &str) -> String {
        std::fs::read_to_string(repo.root().join(name).to_native()).unwrap()
    }

    #[tokio::test]
    async fn test_undo_moves_restores_old_names() {
        let dir = TempDir::new().unwrap();
        let remote = TestRemote::new();
        let mut repo = cloned(&dir, &remote).await;
        let plan = [
            PlannedMove {
                position: 0,
                from: "0.jpg".into(),
                to: "1.jpg".into(),
            },
            PlannedMove {
                position: 1,
                from: "1.jpg".into(),
                to: "0.jpg".into(),
            },
        ];
        // Both staged, the first already at its final name
        for m in &plan {
            let temp = repo.root().join(&m.temp_name());
            io::rename_no_clobber(&repo.root().join(&m.from), &temp).unwrap();
        }
        io::rename_no_clobber(
            &repo.root().join(&plan[0].temp_name()),
            &repo.root().join(&plan[0].to),
        )
        .unwrap();
        let mut staged = vec![
            StagedMove {
                planned: &plan[0],
                finished: true,
            },
            StagedMove {
                planned: &plan[1],
                finished: false,
            },
        ];

        repo.undo_moves(&mut staged);

        assert_eq!(read(&repo, "0.jpg"), "A");
        assert_eq!(read(&repo, "1.jpg"), "B");
        assert!(!repo.root().join(".bdl-rename-0.tmp").exists());
        assert!(!repo.root().join(".bdl-rename-1.tmp").exists());
    }

    #[tokio::test]
    async fn test_undo_moves_records_files_it_cannot_restore() {
        let dir = TempDir::new().unwrap();
        let remote = TestRemote::new();
        let mut repo = cloned(&dir, &remote).await;
        let plan = [PlannedMove {
            position: 0,
            from: "0.jpg".into(),
            to: "zero.jpg".into(),
        }];
        io::rename_no_clobber(
            &repo.root().join("0.jpg"),
            &repo.root().join(&plan[0].temp_name()),
        )
        .unwrap();
        // Something else took the old name meanwhile
        std::fs::write(repo.root().join("0.jpg").to_native(), "other").unwrap();
        let mut staged = vec![StagedMove {
            planned: &plan[0],
            finished: false,
        }];

        repo.undo_moves(&mut staged);

        assert_eq!(read(&repo, ".bdl-rename-0.tmp"), "A");
        let reopened = Repository::open(repo.root().clone()).unwrap();
        assert_eq!(
            reopened.index().items()[0].local_filename.as_deref(),
            Some(".bdl-rename-0.tmp")
        );
    }
}
