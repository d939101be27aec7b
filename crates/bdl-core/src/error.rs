//! Error types for bdl-core

use std::path::PathBuf;

use bdl_engine::EngineError;

/// Result type for bdl-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an operation on one repository.
///
/// Failures of individual downloads are not errors; they are reported as
/// [`ItemFailure`](crate::ItemFailure) values inside a
/// [`SyncReport`](crate::SyncReport).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No installed engine handles {url}")]
    NoMatchingEngine { url: String },

    #[error("Several engines handle {url}: {}", engines.join(", "))]
    AmbiguousEngine { url: String, engines: Vec<String> },

    /// The engine could not list the remote; the index was left untouched
    #[error("Discovery failed for {repository}: {source}")]
    DiscoveryFailed {
        repository: String,
        #[source]
        source: EngineError,
    },

    #[error("Index at {path} is corrupt: {reason}")]
    IndexCorruption { path: PathBuf, reason: String },

    #[error("Index missing at {path}")]
    IndexMissing { path: PathBuf },

    #[error("Repository {name} is locked by another process")]
    RepositoryLocked { name: String },

    #[error("Repository already exists at {path}")]
    RepositoryExists { path: PathBuf },

    #[error("Not a bdl repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("Cannot derive a repository name from {url}")]
    UnnamedRepository { url: String },

    /// Rename would make two files share a name, or overwrite a foreign file
    #[error("Rename collision on {target}: {reason}")]
    RenameCollision { target: String, reason: String },

    // Transparent wrappers for underlying crate errors
    #[error(transparent)]
    Engine(bdl_engine::Error),

    #[error(transparent)]
    Fs(#[from] bdl_fs::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<bdl_engine::Error> for Error {
    fn from(error: bdl_engine::Error) -> Self {
        match error {
            bdl_engine::Error::NoMatchingEngine { url } => Self::NoMatchingEngine { url },
            bdl_engine::Error::AmbiguousEngine { url, engines } => {
                Self::AmbiguousEngine { url, engines }
            }
            other => Self::Engine(other),
        }
    }
}
