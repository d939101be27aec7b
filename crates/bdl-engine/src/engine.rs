//! The engine capability trait and the descriptors passed across it

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::EngineResult;
use crate::metadata::{MetaValue, Metadata};
use crate::site::SiteDefinition;

/// Content of one remote file, read incrementally.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// What an engine needs to know about the repository it works for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub url: String,
    pub site: String,
    /// Free-form engine settings stored with the repository
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// One file as reported by [`Engine::discover`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    /// Engine-specific key identifying the same file across listings
    pub id: String,
    pub metadata: Metadata,
}

impl RemoteEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata keyword.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The indexed item an engine is asked to download.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDescriptor {
    pub position: u64,
    pub remote_id: String,
    pub metadata: Metadata,
}

/// Capability contract every engine implements.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Stable engine identifier, stored in repository configuration.
    fn id(&self) -> &str;

    /// Sites this engine handles.
    fn sites(&self) -> Vec<SiteDefinition>;

    /// Derive a repository name from a URL, when the engine knows better
    /// than the generic last-path-segment rule.
    fn repository_name(&self, _url: &str) -> Option<String> {
        None
    }

    /// List the files currently present in the remote repository.
    async fn discover(&self, repository: &RepositoryDescriptor) -> EngineResult<Vec<RemoteEntry>>;

    /// Open the content of one file.
    async fn download(
        &self,
        repository: &RepositoryDescriptor,
        item: &ItemDescriptor,
    ) -> EngineResult<ByteStream>;
}
