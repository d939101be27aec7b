//! Repository configuration and download settings
//!
//! Every repository keeps a `RepositoryConfig` in `.bdl/config.toml`.
//! Download settings are resolved in layers, later ones overriding earlier:
//!
//! 1. Built-in defaults ([`SyncSettings::default`])
//! 2. User config (`<config_dir>/bdl/config.toml`, `[sync]` table)
//! 3. Repository config (`.bdl/config.toml`, `[sync]` table)
//! 4. Command-line overrides
//!
//! Missing layers are skipped. A layer that exists but does not parse is an
//! error.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use bdl_engine::RepositoryDescriptor;
use bdl_fs::{ConfigStore, NormalizedPath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Contents of `.bdl/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub repo: RepoSection,
    /// Free-form engine settings, handed to the engine on every call
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub engine: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "SyncOverrides::is_empty")]
    pub sync: SyncOverrides,
}

/// The `[repo]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSection {
    pub name: String,
    pub url: String,
    /// Identifier of the engine bound at connect time
    pub engine: String,
    pub site: String,
    pub template: String,
    pub created_at: DateTime<Utc>,
}

impl RepositoryConfig {
    pub fn descriptor(&self) -> RepositoryDescriptor {
        RepositoryDescriptor {
            name: self.repo.name.clone(),
            url: self.repo.url.clone(),
            site: self.repo.site.clone(),
            config: self.engine.clone(),
        }
    }
}

/// Partial download settings, as found in one configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
}

impl SyncOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(&self, settings: &mut SyncSettings) {
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(max_attempts) = self.max_attempts {
            settings.max_attempts = max_attempts;
        }
        if let Some(ms) = self.initial_backoff_ms {
            settings.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_backoff_ms {
            settings.max_backoff = Duration::from_millis(ms);
        }
    }
}

/// Effective download settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Concurrent downloads
    pub workers: usize,
    /// Attempts per item, first try included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl SyncSettings {
    /// Clamp values that would stall the executor.
    fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.max_attempts = self.max_attempts.max(1);
        if self.max_backoff < self.initial_backoff {
            self.max_backoff = self.initial_backoff;
        }
        self
    }
}

/// Shape of the user-level config file.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    sync: SyncOverrides,
}

/// Resolves [`SyncSettings`] from all configuration layers.
#[derive(Debug, Clone, Default)]
pub struct SettingsResolver {
    /// Override for the user config directory (used for testing).
    /// When `None`, `dirs::config_dir()/bdl` is used.
    user_config_dir_override: Option<PathBuf>,
}

impl SettingsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `dir` instead of the platform config directory.
    pub fn with_user_config_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            user_config_dir_override: Some(dir.into()),
        }
    }

    fn user_config_path(&self) -> Option<NormalizedPath> {
        let dir = match &self.user_config_dir_override {
            Some(dir) => dir.clone(),
            None => dirs::config_dir()?.join("bdl"),
        };
        Some(NormalizedPath::new(dir.join("config.toml")))
    }

    /// Merge every layer into the effective settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the user config exists but cannot be parsed.
    pub fn resolve(
        &self,
        repository: Option<&RepositoryConfig>,
        cli: &SyncOverrides,
    ) -> Result<SyncSettings> {
        let mut settings = SyncSettings::default();

        if let Some(path) = self.user_config_path()
            && path.is_file()
        {
            let user: UserConfig = ConfigStore::new().load(&path)?;
            user.sync.apply(&mut settings);
            tracing::debug!(path = %path, "Applied user config");
        }
        if let Some(repository) = repository {
            repository.sync.apply(&mut settings);
        }
        cli.apply(&mut settings);

        Ok(settings.normalized())
    }
}
