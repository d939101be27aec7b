//! Repository synchronization for bdl
//!
//! This crate keeps a local directory in step with a remote collection of
//! files. It sits above the Layer 0 crates and below the CLI:
//!
//! ```text
//!            bdl-cli
//!               |
//!           bdl-core
//!               |
//!      +--------+--------+
//!      |                 |
//!   bdl-fs          bdl-engine
//! ```
//!
//! - **Template**: renders filenames from item keywords
//! - **Index**: persistent, ordered record of every item ever listed
//! - **Executor**: bounded-concurrency downloads with retry
//! - **SyncEngine**: reconciles the index with a remote listing
//! - **Repository**: connect, clone, sync, status, diff and rename
//!
//! # Example
//!
//! ```no_run
//! use bdl_core::{ConnectOptions, Repository, SyncMode, SyncOptions};
//! use bdl_engine::EngineRegistry;
//! use bdl_fs::NormalizedPath;
//!
//! # async fn example() -> bdl_core::Result<()> {
//! let registry = EngineRegistry::with_builtins();
//! let parent = NormalizedPath::new(".");
//! let mut repo = Repository::connect(
//!     &registry,
//!     &parent,
//!     "file:///srv/photos",
//!     &ConnectOptions::default(),
//! )?;
//! let report = repo.sync(&registry, SyncMode::Update, &SyncOptions::default()).await?;
//! println!("{} downloaded", report.downloaded);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod index;
pub mod item;
pub mod repository;
pub mod sync;
pub mod template;

pub use config::{RepoSection, RepositoryConfig, SettingsResolver, SyncOverrides, SyncSettings};
pub use error::{Error, Result};
pub use executor::{
    DownloadExecutor, DownloadJob, ExecutorEvent, FailureCause, ItemFailure, JobResult, Outcome,
};
pub use index::{INDEX_VERSION, Index, StatusCounts};
pub use item::{Item, ItemStatus};
pub use repository::{
    ConnectOptions, Diff, RemoteStatus, RenameReport, Repository, RepositoryStatus, SyncOptions,
};
pub use sync::{Reconciliation, SyncEngine, SyncMode, SyncReport, reconcile};
pub use template::{DEFAULT_TEMPLATE, render};
