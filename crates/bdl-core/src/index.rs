//! The per-repository item index
//!
//! The index is the single source of truth for what a repository knows about
//! its remote: every item ever listed, in position order, plus the current
//! filename template. It is persisted as JSON and always rewritten
//! atomically. Unknown top-level keys and unknown item keys are preserved
//! across rewrites.

use std::collections::{BTreeMap, HashMap};

use bdl_engine::Metadata;
use bdl_fs::{NormalizedPath, io};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::{Item, ItemStatus};
use crate::template::DEFAULT_TEMPLATE;
use crate::{Error, Result};

/// Index format written by this version.
pub const INDEX_VERSION: u32 = 1;

/// Number of items in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub new: usize,
    pub current: usize,
    pub deleted: usize,
    pub missing: usize,
}

impl StatusCounts {
    pub fn get(&self, status: ItemStatus) -> usize {
        match status {
            ItemStatus::New => self.new,
            ItemStatus::Current => self.current,
            ItemStatus::Deleted => self.deleted,
            ItemStatus::Missing => self.missing,
        }
    }

    pub fn total(&self) -> usize {
        self.new + self.current + self.deleted + self.missing
    }

    fn bump(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::New => self.new += 1,
            ItemStatus::Current => self.current += 1,
            ItemStatus::Deleted => self.deleted += 1,
            ItemStatus::Missing => self.missing += 1,
        }
    }
}

/// Ordered collection of items keyed by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    version: u32,
    template: String,
    next_position: u64,
    items: Vec<Item>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
    /// remote id -> offset into `items`
    #[serde(skip)]
    by_remote_id: HashMap<String, usize>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.template == other.template
            && self.next_position == other.next_position
            && self.items == other.items
            && self.extra == other.extra
    }
}

impl Index {
    /// Create an empty index using `template` for new filenames.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            version: INDEX_VERSION,
            template: template.into(),
            next_position: 0,
            items: Vec::new(),
            extra: BTreeMap::new(),
            by_remote_id: HashMap::new(),
        }
    }

    /// Load and validate an index.
    ///
    /// # Errors
    ///
    /// [`Error::IndexMissing`] when the file does not exist and
    /// [`Error::IndexCorruption`] when it cannot be parsed or is structurally
    /// invalid. A stale `next_position` is repaired in memory with a warning.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        if !path.exists() {
            return Err(Error::IndexMissing {
                path: path.to_native(),
            });
        }
        let content = io::read_text(path)?;
        let mut index: Index =
            serde_json::from_str(&content).map_err(|e| Error::IndexCorruption {
                path: path.to_native(),
                reason: e.to_string(),
            })?;

        if index.version > INDEX_VERSION {
            tracing::warn!(
                path = %path,
                version = index.version,
                "Index written by a newer bdl; unknown fields will be preserved"
            );
        }

        index
            .validate()
            .map_err(|reason| Error::IndexCorruption {
                path: path.to_native(),
                reason,
            })?;
        Ok(index)
    }

    /// Write the index atomically.
    pub fn save(&self, path: &NormalizedPath) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        io::write_atomic(path, &content)?;
        tracing::trace!(path = %path, items = self.items.len(), "Index saved");
        Ok(())
    }

    /// Check structural invariants and rebuild the lookup table.
    fn validate(&mut self) -> std::result::Result<(), String> {
        for pair in self.items.windows(2) {
            if pair[1].position == pair[0].position {
                return Err(format!("duplicate position {}", pair[1].position));
            }
            if pair[1].position < pair[0].position {
                return Err(format!(
                    "positions out of order: {} after {}",
                    pair[1].position, pair[0].position
                ));
            }
        }

        self.by_remote_id.clear();
        for (offset, item) in self.items.iter().enumerate() {
            if self
                .by_remote_id
                .insert(item.remote_id.clone(), offset)
                .is_some()
            {
                return Err(format!("duplicate remote id {:?}", item.remote_id));
            }
        }

        if let Some(last) = self.items.last()
            && self.next_position <= last.position
        {
            tracing::warn!(
                stored = self.next_position,
                repaired = last.position + 1,
                "Repairing stale next_position"
            );
            self.next_position = last.position + 1;
        }
        Ok(())
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn update_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
    }

    /// Position the next appended item will get.
    pub fn next_position(&self) -> u64 {
        self.next_position
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in position order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Register a newly listed remote file with status [`ItemStatus::New`].
    ///
    /// Appending an identifier that is already indexed returns the existing
    /// item untouched; positions are never handed out twice.
    pub fn append_new(&mut self, remote_id: impl Into<String>, metadata: Metadata) -> &Item {
        let remote_id = remote_id.into();
        if let Some(&offset) = self.by_remote_id.get(&remote_id) {
            return &self.items[offset];
        }

        let position = self.next_position;
        self.next_position += 1;
        self.by_remote_id.insert(remote_id.clone(), self.items.len());
        self.items.push(Item::new(position, remote_id, metadata));
        tracing::debug!(position, "Indexed new item");
        &self.items[self.items.len() - 1]
    }

    pub fn find_by_remote_id(&self, remote_id: &str) -> Option<&Item> {
        self.by_remote_id
            .get(remote_id)
            .map(|&offset| &self.items[offset])
    }

    pub fn get(&self, position: u64) -> Option<&Item> {
        self.offset(position).map(|offset| &self.items[offset])
    }

    pub fn get_mut(&mut self, position: u64) -> Option<&mut Item> {
        self.offset(position).map(|offset| &mut self.items[offset])
    }

    /// Items matching `filter`, in position order.
    pub fn iterate<'a, F>(&'a self, filter: F) -> impl Iterator<Item = &'a Item> + 'a
    where
        F: Fn(&Item) -> bool + 'a,
    {
        self.items.iter().filter(move |item| filter(item))
    }

    /// Items in the given status, in position order.
    pub fn with_status(&self, status: ItemStatus) -> impl Iterator<Item = &Item> + '_ {
        self.iterate(move |item| item.status == status)
    }

    /// Returns `false` when no item has that position.
    pub fn set_status(&mut self, position: u64, status: ItemStatus) -> bool {
        match self.get_mut(position) {
            Some(item) => {
                item.status = status;
                true
            }
            None => false,
        }
    }

    /// Returns `false` when no item has that position.
    pub fn set_local_filename(&mut self, position: u64, name: impl Into<String>) -> bool {
        match self.get_mut(position) {
            Some(item) => {
                item.local_filename = Some(name.into());
                true
            }
            None => false,
        }
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for item in &self.items {
            counts.bump(item.status);
        }
        counts
    }

    /// Items are sorted by position, so lookup is a binary search.
    fn offset(&self, position: u64) -> Option<usize> {
        self.items
            .binary_search_by_key(&position, |item| item.position)
            .ok()
    }
}
