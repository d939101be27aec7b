//! Filesystem primitives for bdl
//!
//! Provides normalized path handling, file-name sanitizing, crash-safe
//! writes, advisory repository locks and content checksums.

pub mod checksum;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod lock;
pub mod path;

pub use config::ConfigStore;
pub use constants::BdlPath;
pub use error::{Error, Result};
pub use lock::RepoLock;
pub use path::{NormalizedPath, sanitize_file_name};
