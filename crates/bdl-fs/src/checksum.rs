//! SHA-256 checksum utilities
//!
//! A single canonical checksum format (`sha256:<hex>`) is recorded for every
//! downloaded file.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Incremental checksum for content that arrives in chunks.
#[derive(Debug, Default, Clone)]
pub struct Checksum {
    hasher: Sha256,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed another chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Consume the hasher and return the canonical `sha256:<hex>` string.
    pub fn finish(self) -> String {
        format!("{}{:x}", PREFIX, self.hasher.finalize())
    }
}

/// Compute the SHA-256 checksum of in-memory content.
pub fn compute_content_checksum(content: &[u8]) -> String {
    let mut checksum = Checksum::new();
    checksum.update(content);
    checksum.finish()
}

/// Compute the SHA-256 checksum of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn compute_file_checksum(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(compute_content_checksum(&content))
}
