//! [`MockEngine`]: an in-memory remote with failure injection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bdl_engine::{
    ByteStream, Engine, EngineError, EngineResult, ItemDescriptor, MetaValue, Metadata,
    RemoteEntry, RepositoryDescriptor, SiteDefinition,
};

#[derive(Debug, Clone)]
struct MockFile {
    id: String,
    content: Vec<u8>,
    metadata: Metadata,
    listed: bool,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    error: EngineError,
    /// `None` fails forever
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct MockState {
    files: Vec<MockFile>,
    failures: HashMap<String, InjectedFailure>,
    listing_failure: Option<EngineError>,
    downloads: HashMap<String, usize>,
}

/// Scripted engine for `mock://` URLs.
///
/// Files are listed in insertion order. A file can be *delisted*: it
/// disappears from [`Engine::discover`] but stays downloadable, which models
/// remotes whose listing drops entries that are still fetchable.
#[derive(Debug)]
pub struct MockEngine {
    id: String,
    state: Mutex<MockState>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub const URL: &'static str = "mock://remote/gallery";

    /// Create an engine with id `mock` handling `mock://` URLs.
    pub fn new() -> Self {
        Self::with_id("mock")
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(MockState::default()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Make every download take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a file.
    pub fn add(&self, id: &str, content: &[u8]) -> &Self {
        self.add_with_meta(id, content, Metadata::new())
    }

    /// Publish a file with metadata keywords.
    pub fn add_with_meta(&self, id: &str, content: &[u8], metadata: Metadata) -> &Self {
        let mut state = self.state();
        if let Some(file) = state.files.iter_mut().find(|f| f.id == id) {
            file.content = content.to_vec();
            file.metadata = metadata;
            file.listed = true;
        } else {
            state.files.push(MockFile {
                id: id.to_string(),
                content: content.to_vec(),
                metadata,
                listed: true,
            });
        }
        self
    }

    /// Set one metadata keyword on a published file.
    pub fn set_meta(&self, id: &str, key: &str, value: impl Into<MetaValue>) {
        if let Some(file) = self.state().files.iter_mut().find(|f| f.id == id) {
            file.metadata.insert(key.to_string(), value.into());
        }
    }

    /// Hide a file from listings while keeping it downloadable.
    pub fn delist(&self, id: &str) {
        if let Some(file) = self.state().files.iter_mut().find(|f| f.id == id) {
            file.listed = false;
        }
    }

    /// Remove a file entirely.
    pub fn remove(&self, id: &str) {
        self.state().files.retain(|f| f.id != id);
    }

    /// Fail downloads of `id` with `error`, `times` times (`None` = always).
    pub fn fail_download(&self, id: &str, error: EngineError, times: Option<usize>) {
        self.state().failures.insert(
            id.to_string(),
            InjectedFailure {
                error,
                remaining: times,
            },
        );
    }

    /// Stop failing downloads of `id`.
    pub fn heal(&self, id: &str) {
        self.state().failures.remove(id);
    }

    /// Fail every listing with `error` until cleared with `None`.
    pub fn fail_listing(&self, error: Option<EngineError>) {
        self.state().listing_failure = error;
    }

    /// Number of download attempts made for `id`.
    pub fn download_attempts(&self, id: &str) -> usize {
        self.state().downloads.get(id).copied().unwrap_or(0)
    }

    /// Total download attempts across all files.
    pub fn total_attempts(&self) -> usize {
        self.state().downloads.values().sum()
    }

    /// Forget recorded download attempts.
    pub fn reset_counters(&self) {
        self.state().downloads.clear();
    }

    /// Highest number of downloads observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn attempt(&self, id: &str) -> EngineResult<Vec<u8>> {
        let mut state = self.state();
        *state.downloads.entry(id.to_string()).or_default() += 1;

        if let Some(failure) = state.failures.get_mut(id) {
            match failure.remaining {
                None => return Err(failure.error.clone()),
                Some(0) => {}
                Some(ref mut n) => {
                    *n -= 1;
                    return Err(failure.error.clone());
                }
            }
        }

        state
            .files
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.content.clone())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn sites(&self) -> Vec<SiteDefinition> {
        vec![SiteDefinition::new("remote").with_pattern(r"^mock://")]
    }

    async fn discover(&self, _repository: &RepositoryDescriptor) -> EngineResult<Vec<RemoteEntry>> {
        let state = self.state();
        if let Some(error) = &state.listing_failure {
            return Err(error.clone());
        }
        Ok(state
            .files
            .iter()
            .filter(|f| f.listed)
            .map(|f| RemoteEntry {
                id: f.id.clone(),
                metadata: f.metadata.clone(),
            })
            .collect())
    }

    async fn download(
        &self,
        _repository: &RepositoryDescriptor,
        item: &ItemDescriptor,
    ) -> EngineResult<ByteStream> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.attempt(&item.remote_id);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        result.map(|content| Box::pin(std::io::Cursor::new(content)) as ByteStream)
    }
}
