//! Names of the files bdl keeps inside a repository.

use std::path::Path;

/// Standard repository filesystem markers and paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BdlPath {
    /// The `.bdl` directory holding all repository state
    StateDir,
    /// Repository configuration (`.bdl/config.toml`)
    Config,
    /// Persisted item index (`.bdl/index.json`)
    Index,
    /// Advisory lock serializing syncs (`.bdl/lock`)
    Lock,
}

impl BdlPath {
    /// Get the string representation of the path, relative to the repository root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateDir => ".bdl",
            Self::Config => ".bdl/config.toml",
            Self::Index => ".bdl/index.json",
            Self::Lock => ".bdl/lock",
        }
    }
}

impl AsRef<Path> for BdlPath {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for BdlPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for BdlPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
