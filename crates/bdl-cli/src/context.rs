//! Shared command context and repository root detection
//!
//! Repository arguments may point anywhere inside a repository; the root is
//! found by walking up to the nearest directory holding `.bdl/config.toml`.

use std::path::{Path, PathBuf};

use bdl_core::{SettingsResolver, SyncOptions, SyncOverrides};
use bdl_engine::EngineRegistry;
use bdl_fs::BdlPath;
use tokio_util::sync::CancellationToken;

use crate::error::{CliError, Result};

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub registry: EngineRegistry,
    /// Directory relative paths are resolved against
    pub base: PathBuf,
    pub overrides: SyncOverrides,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(base: PathBuf, jobs: Option<usize>, cancel: CancellationToken) -> Self {
        Self {
            registry: EngineRegistry::with_builtins(),
            base,
            overrides: SyncOverrides {
                workers: jobs,
                ..Default::default()
            },
            cancel,
        }
    }

    /// Sync options for one run, without a progress channel.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            overrides: self.overrides.clone(),
            resolver: SettingsResolver::new(),
            cancel: self.cancel.clone(),
            events: None,
        }
    }

    /// Resolve a repository argument to its root directory.
    pub fn repository_root(&self, target: &Path) -> Result<PathBuf> {
        let start = self.base.join(target);
        find_root(&start).ok_or_else(|| {
            CliError::user(format!(
                "{} is not inside a bdl repository",
                start.display()
            ))
        })
    }
}

/// Walk up from `start` to the nearest repository root.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(BdlPath::Config.as_str()).is_file())
        .map(Path::to_path_buf)
}
