//! The synchronization engine
//!
//! A sync runs in three steps:
//!
//! 1. **Discover**: ask the engine for the current remote listing.
//! 2. **Reconcile**: classify every indexed item against the listing and the
//!    local disk. This always happens in full, whatever the mode.
//! 3. **Download**: queue the items the mode asks for and hand them to the
//!    [`DownloadExecutor`]. Results flow back into the index as they arrive.
//!
//! The index is saved after reconciliation, periodically while downloads
//! complete, and once more at the end. Files are moved into place before
//! the index records them, so an interrupted sync never leaves a `current`
//! item without its file.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bdl_engine::{Engine, RemoteEntry, RepositoryDescriptor};
use bdl_fs::{BdlPath, NormalizedPath, sanitize_file_name};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SyncSettings;
use crate::executor::{
    DownloadExecutor, DownloadJob, ExecutorEvent, FailureCause, ItemFailure, Outcome,
};
use crate::index::Index;
use crate::item::{Item, ItemStatus};
use crate::template::render;
use crate::{Error, Result};

/// Minimum time between intermediate index saves.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(1);

/// Which items a sync downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// Items never downloaded
    Update,
    /// Every item, re-downloading present ones
    Stash,
    /// Items whose local file is gone
    Reset,
    /// Everything not already present locally
    Checkout,
}

impl SyncMode {
    pub const ALL: [SyncMode; 4] = [Self::Update, Self::Stash, Self::Reset, Self::Checkout];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Stash => "stash",
            Self::Reset => "reset",
            Self::Checkout => "checkout",
        }
    }

    /// Whether an item is queued in this mode.
    ///
    /// `has_file` tells whether the item's recorded local file is on disk.
    pub fn wants(&self, status: ItemStatus, has_file: bool) -> bool {
        let lost = status == ItemStatus::Missing || (status == ItemStatus::Deleted && !has_file);
        match self {
            Self::Update => status == ItemStatus::New,
            Self::Stash => true,
            Self::Reset => lost,
            Self::Checkout => status == ItemStatus::New || lost,
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown sync mode: {s}"))
    }
}

/// What reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Entries in the remote listing
    pub discovered: usize,
    /// Newly indexed items
    pub added: usize,
    /// Deleted items listed again
    pub relisted: usize,
    /// Items that dropped out of the listing
    pub delisted: usize,
    /// Listed items whose local file disappeared
    pub missing: usize,
}

/// Classify the index against a fresh listing.
///
/// Listed items become `current` when their file is on disk, `missing` when
/// they were downloaded before but the file is gone, and `new` otherwise.
/// Unknown identifiers are appended in listing order. Indexed items absent
/// from the listing become `deleted`. Metadata from the listing is merged
/// over the stored map.
pub fn reconcile<F>(index: &mut Index, listing: Vec<RemoteEntry>, has_file: F) -> Reconciliation
where
    F: Fn(&Item) -> bool,
{
    let mut summary = Reconciliation {
        discovered: listing.len(),
        ..Default::default()
    };
    let mut listed: HashSet<String> = HashSet::with_capacity(listing.len());

    for entry in listing {
        if !listed.insert(entry.id.clone()) {
            tracing::warn!(remote_id = %entry.id, "Remote listed the same item twice");
            continue;
        }
        let Some(position) = index.find_by_remote_id(&entry.id).map(|item| item.position) else {
            index.append_new(entry.id, entry.metadata);
            summary.added += 1;
            continue;
        };
        let Some(item) = index.get_mut(position) else {
            continue;
        };

        item.merge_metadata(entry.metadata);
        let next = if has_file(&*item) {
            ItemStatus::Current
        } else if item.local_filename.is_some() {
            ItemStatus::Missing
        } else {
            ItemStatus::New
        };

        if item.status == ItemStatus::Deleted {
            summary.relisted += 1;
        }
        if next == ItemStatus::Missing && item.status != ItemStatus::Missing {
            summary.missing += 1;
        }
        if next != item.status {
            tracing::debug!(position, from = %item.status, to = %next, "Reclassified item");
            item.status = next;
        }
    }

    let gone: Vec<u64> = index
        .iterate(|item| item.status != ItemStatus::Deleted && !listed.contains(&item.remote_id))
        .map(|item| item.position)
        .collect();
    for position in gone {
        index.set_status(position, ItemStatus::Deleted);
        summary.delisted += 1;
    }

    summary
}

/// Outcome of one synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub repository: String,
    pub mode: SyncMode,
    pub discovered: usize,
    pub added: usize,
    pub delisted: usize,
    pub queued: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Indexed items that were not queued
    pub unchanged: usize,
    /// Queued items never started because the sync was cancelled
    pub cancelled: usize,
    /// Per-item failures, by position
    pub failures: Vec<ItemFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0
    }
}

struct Checkpoint {
    interval: Duration,
    last: Instant,
}

impl Checkpoint {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    fn due(&mut self) -> bool {
        if self.last.elapsed() < self.interval {
            return false;
        }
        self.last = Instant::now();
        true
    }
}

/// Synchronizes one repository's index with its remote.
pub struct SyncEngine {
    engine: Arc<dyn Engine>,
    repository: RepositoryDescriptor,
    root: NormalizedPath,
    index_path: NormalizedPath,
    settings: SyncSettings,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<ExecutorEvent>>,
}

impl SyncEngine {
    /// Create an engine for the repository rooted at `root`.
    pub fn new(
        engine: Arc<dyn Engine>,
        repository: RepositoryDescriptor,
        root: NormalizedPath,
        settings: SyncSettings,
    ) -> Self {
        let index_path = root.join(BdlPath::Index.as_str());
        Self {
            engine,
            repository,
            root,
            index_path,
            settings,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<ExecutorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn has_file(&self, item: &Item) -> bool {
        item.local_filename
            .as_deref()
            .is_some_and(|name| self.root.join(name).is_file())
    }

    /// Run one synchronization pass in `mode`.
    ///
    /// # Errors
    ///
    /// [`Error::DiscoveryFailed`] when the remote cannot be listed; the index
    /// is not modified in that case. Index write failures are also errors.
    /// Individual download failures are not; they are listed in the report.
    pub async fn sync(&self, index: &mut Index, mode: SyncMode) -> Result<SyncReport> {
        let listing = self
            .engine
            .discover(&self.repository)
            .await
            .map_err(|source| Error::DiscoveryFailed {
                repository: self.repository.name.clone(),
                source,
            })?;
        tracing::debug!(
            repository = %self.repository.name,
            entries = listing.len(),
            "Remote listed"
        );

        let reconciliation = reconcile(index, listing, |item| self.has_file(item));
        let (jobs, mut failures) = self.plan(index, mode);
        index.save(&self.index_path)?;

        let queued = jobs.len() + failures.len();
        let mut executor = DownloadExecutor::new(
            Arc::clone(&self.engine),
            self.repository.clone(),
            self.root.clone(),
            self.settings.clone(),
        )
        .with_cancellation(self.cancel.clone());
        if let Some(events) = &self.events {
            executor = executor.with_events(events.clone());
        }

        let mut checkpoint = Checkpoint::new(CHECKPOINT_INTERVAL);
        let index_path = &self.index_path;
        let results = executor
            .run(jobs, |result| {
                if let Outcome::Downloaded {
                    filename, checksum, ..
                } = &result.outcome
                {
                    record_download(index, result.position, filename, checksum);
                    if checkpoint.due() {
                        index.save(index_path)?;
                    }
                }
                Ok::<(), Error>(())
            })
            .await?;

        let mut downloaded = 0;
        let mut cancelled = 0;
        for result in &results {
            match &result.outcome {
                Outcome::Downloaded { .. } => downloaded += 1,
                Outcome::Cancelled => cancelled += 1,
                Outcome::Failed(_) => {}
            }
            failures.extend(result.failure());
        }
        failures.sort_by_key(|failure| failure.position);
        index.save(&self.index_path)?;

        let report = SyncReport {
            repository: self.repository.name.clone(),
            mode,
            discovered: reconciliation.discovered,
            added: reconciliation.added,
            delisted: reconciliation.delisted,
            queued,
            downloaded,
            failed: failures.len(),
            unchanged: index.len().saturating_sub(queued),
            cancelled,
            failures,
        };
        tracing::info!(
            repository = %report.repository,
            mode = %mode,
            discovered = report.discovered,
            downloaded = report.downloaded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Sync finished"
        );
        Ok(report)
    }

    /// Build download jobs for the items `mode` wants.
    ///
    /// Items that already own a file are downloaded over it. Others get a
    /// name rendered from the template; a name that is invalid, reserved, or
    /// already owned by another item fails that item up front.
    fn plan(&self, index: &Index, mode: SyncMode) -> (Vec<DownloadJob>, Vec<ItemFailure>) {
        let mut claimed: HashSet<String> = index
            .items()
            .iter()
            .filter_map(|item| item.local_filename.clone())
            .collect();
        let mut jobs = Vec::new();
        let mut failures = Vec::new();

        for item in index.iterate(|item| mode.wants(item.status, self.has_file(item))) {
            let fail = |cause| ItemFailure {
                position: item.position,
                remote_id: item.remote_id.clone(),
                cause,
            };

            if let Some(name) = &item.local_filename {
                jobs.push(DownloadJob {
                    item: item.descriptor(),
                    target: name.clone(),
                    replace: true,
                });
                continue;
            }

            let rendered = render(index.template(), &item.keywords());
            match sanitize_file_name(&rendered) {
                Err(e) => failures.push(fail(FailureCause::InvalidName(e.to_string()))),
                Ok(name) if name == BdlPath::StateDir.as_str() || !claimed.insert(name.clone()) => {
                    failures.push(fail(FailureCause::Collision { target: name }));
                }
                Ok(name) => jobs.push(DownloadJob {
                    item: item.descriptor(),
                    target: name,
                    replace: false,
                }),
            }
        }

        for failure in &failures {
            tracing::warn!(position = failure.position, cause = %failure.cause, "Item not queued");
        }
        (jobs, failures)
    }
}

/// Apply a successful download to the index.
///
/// A `deleted` item keeps its status: the remote still does not list it.
fn record_download(index: &mut Index, position: u64, filename: &str, checksum: &str) {
    if let Some(item) = index.get_mut(position) {
        item.local_filename = Some(filename.to_string());
        item.checksum = Some(checksum.to_string());
        item.last_synced_at = Some(Utc::now());
        if item.status != ItemStatus::Deleted {
            item.status = ItemStatus::Current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdl_engine::Metadata;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(SyncMode::Update, ItemStatus::New, false, true)]
    #[case(SyncMode::Update, ItemStatus::Missing, false, false)]
    #[case(SyncMode::Stash, ItemStatus::Current, true, true)]
    #[case(SyncMode::Stash, ItemStatus::Deleted, true, true)]
    #[case(SyncMode::Reset, ItemStatus::Missing, false, true)]
    #[case(SyncMode::Reset, ItemStatus::Deleted, false, true)]
    #[case(SyncMode::Reset, ItemStatus::Deleted, true, false)]
    #[case(SyncMode::Reset, ItemStatus::New, false, false)]
    #[case(SyncMode::Checkout, ItemStatus::New, false, true)]
    #[case(SyncMode::Checkout, ItemStatus::Current, true, false)]
    #[case(SyncMode::Checkout, ItemStatus::Deleted, false, true)]
    fn mode_queues(
        #[case] mode: SyncMode,
        #[case] status: ItemStatus,
        #[case] has_file: bool,
        #[case] queued: bool,
    ) {
        assert_eq!(mode.wants(status, has_file), queued);
    }

    fn listing(ids: &[&str]) -> Vec<RemoteEntry> {
        ids.iter().map(|id| RemoteEntry::new(*id)).collect()
    }

    #[test]
    fn reconcile_adds_and_delists() {
        let mut index = Index::default();
        reconcile(&mut index, listing(&["a", "b"]), |_| false);
        index.set_status(0, ItemStatus::Current);
        index.set_local_filename(0, "0.jpg");

        let summary = reconcile(&mut index, listing(&["b", "c"]), |item| {
            item.local_filename.is_some()
        });
        assert_eq!(summary.added, 1);
        assert_eq!(summary.delisted, 1);
        assert_eq!(index.get(0).unwrap().status, ItemStatus::Deleted);
        assert_eq!(index.get(1).unwrap().status, ItemStatus::New);
        assert_eq!(index.get(2).unwrap().remote_id, "c");
    }

    #[test]
    fn relisted_items_follow_the_disk() {
        let mut index = Index::default();
        reconcile(&mut index, listing(&["kept", "lost", "never"]), |_| false);
        for (position, name) in [(0, "0.jpg"), (1, "1.jpg")] {
            index.set_local_filename(position, name);
        }
        reconcile(&mut index, Vec::new(), |_| false);
        assert!(index.items().iter().all(|i| i.status == ItemStatus::Deleted));

        let summary = reconcile(
            &mut index,
            listing(&["kept", "lost", "never"]),
            |item| item.local_filename.as_deref() == Some("0.jpg"),
        );
        assert_eq!(summary.relisted, 3);
        let statuses: Vec<_> = index.items().iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![ItemStatus::Current, ItemStatus::Missing, ItemStatus::New]
        );
    }

    #[test]
    fn duplicate_listing_entries_are_indexed_once() {
        let mut index = Index::default();
        let summary = reconcile(&mut index, listing(&["a", "a", "b"]), |_| false);
        assert_eq!(summary.added, 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn listing_metadata_is_merged() {
        let mut index = Index::default();
        reconcile(
            &mut index,
            vec![RemoteEntry::new("a").with_meta("title", "One").with_meta("w", 10)],
            |_| false,
        );
        reconcile(
            &mut index,
            vec![RemoteEntry::new("a").with_meta("w", 20)],
            |_| false,
        );
        let meta: &Metadata = &index.get(0).unwrap().metadata;
        assert_eq!(meta["title"].as_str(), Some("One"));
        assert_eq!(meta["w"].as_i64(), Some(20));
    }

    #[test]
    fn mode_names_parse() {
        for mode in SyncMode::ALL {
            assert_eq!(mode.to_string().parse::<SyncMode>().unwrap(), mode);
        }
    }
}
