//! Advisory per-repository lock

use std::fs::{File, OpenOptions};

use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Exclusive advisory lock on a repository.
///
/// Held for the whole duration of a sync or rename; released on drop.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: NormalizedPath,
}

impl RepoLock {
    /// Try to take the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] when another handle already holds it.
    pub fn acquire(path: &NormalizedPath) -> Result<Self> {
        let native = path.to_native();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&native)
            .map_err(|e| Error::io(&native, e))?;

        file.try_lock_exclusive().map_err(|_| Error::Locked {
            path: native.clone(),
        })?;

        tracing::debug!(path = %path, "Repository lock acquired");
        Ok(Self {
            file,
            path: path.clone(),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        tracing::debug!(path = %self.path, "Repository lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = NormalizedPath::new(dir.path().join("lock"));

        let first = RepoLock::acquire(&path).unwrap();
        assert!(matches!(RepoLock::acquire(&path), Err(Error::Locked { .. })));

        drop(first);
        assert!(RepoLock::acquire(&path).is_ok());
    }
}
