//! Built-in engine serving plain directories through `file://` URLs

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::engine::{ByteStream, Engine, ItemDescriptor, RemoteEntry, RepositoryDescriptor};
use crate::error::{EngineError, EngineResult};
use crate::site::SiteDefinition;

/// Engine listing the regular files of a local directory.
///
/// Every non-hidden regular file becomes one remote entry, keyed by its
/// file name and listed in name order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEngine;

impl LocalEngine {
    pub const ID: &'static str = "local";

    pub fn new() -> Self {
        Self
    }

    /// Directory addressed by a `file://` URL.
    pub fn directory(url: &str) -> EngineResult<PathBuf> {
        let rest = url
            .strip_prefix("file://")
            .ok_or_else(|| EngineError::Content(format!("not a file URL: {url}")))?;
        let rest = rest.strip_prefix("localhost").unwrap_or(rest);
        if rest.is_empty() {
            return Err(EngineError::Content(format!("missing path in {url}")));
        }
        Ok(PathBuf::from(rest))
    }

    fn entry_path(root: &Path, remote_id: &str) -> EngineResult<PathBuf> {
        let relative = Path::new(remote_id);
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(root.join(relative)),
            _ => Err(EngineError::PermissionDenied(format!(
                "{remote_id} is outside the repository"
            ))),
        }
    }
}

#[async_trait]
impl Engine for LocalEngine {
    fn id(&self) -> &str {
        Self::ID
    }

    fn sites(&self) -> Vec<SiteDefinition> {
        vec![SiteDefinition::new("file").with_pattern(r"^file://(localhost)?/.+")]
    }

    fn repository_name(&self, url: &str) -> Option<String> {
        Self::directory(url)
            .ok()?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    async fn discover(&self, repository: &RepositoryDescriptor) -> EngineResult<Vec<RemoteEntry>> {
        let root = Self::directory(&repository.url)?;
        let mut reader = tokio::fs::read_dir(&root).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            entries.push(RemoteEntry::new(name).with_meta("size", meta.len()));
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::debug!(root = %root.display(), count = entries.len(), "Listed local directory");
        Ok(entries)
    }

    async fn download(
        &self,
        repository: &RepositoryDescriptor,
        item: &ItemDescriptor,
    ) -> EngineResult<ByteStream> {
        let root = Self::directory(&repository.url)?;
        let path = Self::entry_path(&root, &item.remote_id)?;
        let file = tokio::fs::File::open(&path).await?;
        Ok(Box::pin(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_accepts_localhost_form() {
        assert_eq!(
            LocalEngine::directory("file://localhost/srv/a").unwrap(),
            PathBuf::from("/srv/a")
        );
        assert_eq!(
            LocalEngine::directory("file:///srv/a").unwrap(),
            PathBuf::from("/srv/a")
        );
        assert!(LocalEngine::directory("https://srv/a").is_err());
    }

    #[test]
    fn entry_path_rejects_traversal() {
        let root = Path::new("/srv/a");
        assert!(LocalEngine::entry_path(root, "x.jpg").is_ok());
        assert!(LocalEngine::entry_path(root, "../secret").is_err());
        assert!(LocalEngine::entry_path(root, "sub/x.jpg").is_err());
        assert!(LocalEngine::entry_path(root, "/etc/passwd").is_err());
    }
}
