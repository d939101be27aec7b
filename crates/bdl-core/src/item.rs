//! Indexed items and their status

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bdl_engine::{ItemDescriptor, MetaValue, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of an item.
///
/// There is no terminal state: every status can be left again by a later
/// synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Listed remotely, never downloaded
    New,
    /// Listed remotely and present on disk
    Current,
    /// No longer listed remotely; the local file is left alone
    Deleted,
    /// Listed remotely and downloaded once, but the local file is gone
    Missing,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 4] = [Self::New, Self::Current, Self::Deleted, Self::Missing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Current => "current",
            Self::Deleted => "deleted",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown item status: {s}"))
    }
}

/// One remote file known to a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable, never reused
    pub position: u64,
    pub remote_id: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub metadata: Metadata,
    /// Name of the file under the repository root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_filename: Option<String>,
    /// Checksum of the last downloaded content (`sha256:<hex>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Fields written by newer versions, kept across rewrites
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Item {
    pub fn new(position: u64, remote_id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            position,
            remote_id: remote_id.into(),
            status: ItemStatus::New,
            metadata,
            local_filename: None,
            checksum: None,
            last_synced_at: None,
            extra: BTreeMap::new(),
        }
    }

    /// Keywords available to filename templates.
    ///
    /// Metadata keywords plus the base keywords `position`, `filename` and
    /// `extension`. When the metadata lacks `filename` or `extension` they
    /// are derived from the last segment of the remote identifier.
    pub fn keywords(&self) -> Metadata {
        let mut keywords = self.metadata.clone();
        let (stem, extension) = split_remote_name(&self.remote_id);
        keywords
            .entry("filename".to_string())
            .or_insert_with(|| MetaValue::from(stem));
        keywords
            .entry("extension".to_string())
            .or_insert_with(|| MetaValue::from(extension));
        keywords.insert("position".to_string(), MetaValue::from(self.position));
        keywords
    }

    /// What an engine needs to download this item.
    pub fn descriptor(&self) -> ItemDescriptor {
        ItemDescriptor {
            position: self.position,
            remote_id: self.remote_id.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Overlay fresh metadata; keys the listing no longer carries are kept.
    pub fn merge_metadata(&mut self, fresh: Metadata) {
        self.metadata.extend(fresh);
    }
}

/// Split the last path segment of a remote identifier into stem and extension.
///
/// Query strings and fragments are ignored. A leading dot does not start an
/// extension (`.profile` has none).
pub fn split_remote_name(remote_id: &str) -> (String, String) {
    let path = remote_id
        .split(['?', '#'])
        .next()
        .unwrap_or(remote_id)
        .trim_end_matches('/');
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);

    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem.to_string(), extension.to_string()),
        _ => (name.to_string(), String::new()),
    }
}
