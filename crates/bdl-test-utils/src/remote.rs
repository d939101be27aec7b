//! [`TestRemote`]: a temporary directory served through `file://` URLs.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A temporary "remote" directory for the built-in local engine.
///
/// # Example
///
/// ```rust,no_run
/// use bdl_test_utils::TestRemote;
///
/// let remote = TestRemote::new();
/// remote.put("cat.jpg", b"meow");
/// let url = remote.url();
/// assert!(url.starts_with("file://"));
/// ```
pub struct TestRemote {
    temp_dir: TempDir,
}

impl Default for TestRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRemote {
    /// Create an empty remote directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Root of the remote directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// `file://` URL addressing the remote.
    pub fn url(&self) -> String {
        format!("file://{}", self.root().display())
    }

    /// Create or overwrite a remote file.
    pub fn put(&self, name: &str, content: &[u8]) {
        fs::write(self.root().join(name), content).unwrap();
    }

    /// Delete a remote file.
    pub fn delete(&self, name: &str) {
        fs::remove_file(self.root().join(name)).unwrap();
    }
}
