//! Concurrent download executor
//!
//! Downloads run as tokio tasks gated by a semaphore, so at most `workers`
//! engine calls are in flight. Every job is independent: a failure is
//! recorded in that job's [`JobResult`] and never aborts the batch.
//!
//! Content is streamed into a temporary file next to its destination, hashed
//! on the way, and only then moved into place. A destination that already
//! exists is a collision unless it is the item's own file or already holds
//! identical content.

use std::convert::Infallible;
use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bdl_engine::{Engine, EngineError, ItemDescriptor, RepositoryDescriptor};
use bdl_fs::NormalizedPath;
use bdl_fs::checksum::{Checksum, compute_file_checksum};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::SyncSettings;

const CHUNK_SIZE: usize = 64 * 1024;

/// One item to download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub item: ItemDescriptor,
    /// File name under the repository root
    pub target: String,
    /// `target` is this item's own file and may be overwritten
    pub replace: bool,
}

/// Why a single item could not be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureCause {
    #[error("{error} (gave up after {attempts} attempts)")]
    Transient { error: EngineError, attempts: u32 },

    #[error("{0}")]
    Permanent(EngineError),

    #[error("{target} already exists and holds different content")]
    Collision { target: String },

    #[error("cannot name file: {0}")]
    InvalidName(String),

    #[error("cannot write {target}: {message}")]
    Write { target: String, message: String },

    #[error("download task aborted: {0}")]
    Aborted(String),
}

/// A failed item, as listed in a sync report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub position: u64,
    pub remote_id: String,
    pub cause: FailureCause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Downloaded {
        filename: String,
        checksum: String,
        bytes: u64,
    },
    Failed(FailureCause),
    /// Never started because the run was cancelled
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub position: u64,
    pub remote_id: String,
    pub outcome: Outcome,
}

impl JobResult {
    pub fn failure(&self) -> Option<ItemFailure> {
        match &self.outcome {
            Outcome::Failed(cause) => Some(ItemFailure {
                position: self.position,
                remote_id: self.remote_id.clone(),
                cause: cause.clone(),
            }),
            _ => None,
        }
    }
}

/// Progress notifications, sent when an event channel is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    Queued { total: usize },
    Started { position: u64, remote_id: String },
    Finished { position: u64, filename: String, bytes: u64 },
    Failed { position: u64, remote_id: String, cause: FailureCause },
}

struct JobContext {
    engine: Arc<dyn Engine>,
    repository: RepositoryDescriptor,
    root: NormalizedPath,
    settings: SyncSettings,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<ExecutorEvent>>,
}

impl JobContext {
    fn emit(&self, event: ExecutorEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching
            let _ = events.send(event);
        }
    }
}

/// Runs download jobs for one repository.
pub struct DownloadExecutor {
    engine: Arc<dyn Engine>,
    repository: RepositoryDescriptor,
    root: NormalizedPath,
    settings: SyncSettings,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<ExecutorEvent>>,
}

impl DownloadExecutor {
    pub fn new(
        engine: Arc<dyn Engine>,
        repository: RepositoryDescriptor,
        root: NormalizedPath,
        settings: SyncSettings,
    ) -> Self {
        Self {
            engine,
            repository,
            root,
            settings,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Stop starting new jobs once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<ExecutorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run every job and collect the results, in completion order.
    pub async fn download_all(&self, jobs: Vec<DownloadJob>) -> Vec<JobResult> {
        let Ok(results) = self.run(jobs, |_| Ok::<(), Infallible>(())).await;
        results
    }

    /// Run every job, handing each result to `on_result` as it completes.
    ///
    /// An error from `on_result` stops the run; jobs still in flight are
    /// abandoned.
    pub async fn run<F, E>(
        &self,
        jobs: Vec<DownloadJob>,
        mut on_result: F,
    ) -> std::result::Result<Vec<JobResult>, E>
    where
        F: FnMut(&JobResult) -> std::result::Result<(), E>,
    {
        let ctx = Arc::new(JobContext {
            engine: Arc::clone(&self.engine),
            repository: self.repository.clone(),
            root: self.root.clone(),
            settings: self.settings.clone(),
            cancel: self.cancel.clone(),
            events: self.events.clone(),
        });
        let total = jobs.len();
        ctx.emit(ExecutorEvent::Queued { total });

        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut set = JoinSet::new();
        for job in jobs {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let position = job.item.position;
                let remote_id = job.item.remote_id.clone();
                // Inner task so a panicking engine still yields a result
                match tokio::spawn(run_job(ctx, semaphore, job)).await {
                    Ok(result) => result,
                    Err(e) => JobResult {
                        position,
                        remote_id,
                        outcome: Outcome::Failed(FailureCause::Aborted(e.to_string())),
                    },
                }
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    on_result(&result)?;
                    results.push(result);
                }
                Err(e) => tracing::error!(error = %e, "Download task failed to join"),
            }
        }
        Ok(results)
    }
}

/// A fully written temporary file.
struct Fetched {
    temp: NamedTempFile,
    checksum: String,
    bytes: u64,
}

enum AttemptError {
    Engine(EngineError),
    Write(String),
    /// Cancelled while waiting to retry
    Cancelled,
}

/// Attempt a download until it succeeds, fails permanently, runs out of
/// attempts or the run is cancelled. Returns the number of attempts made.
///
/// An attempt in progress always completes; cancellation only cuts the
/// wait before the next one.
async fn fetch_with_retry(
    ctx: &JobContext,
    item: &ItemDescriptor,
    mut policy: ExponentialBackoff,
) -> (std::result::Result<Fetched, AttemptError>, u32) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match fetch(ctx, item).await {
            Ok(fetched) => return (Ok(fetched), attempt),
            Err(AttemptError::Engine(error))
                if error.is_transient() && attempt < ctx.settings.max_attempts =>
            {
                error
            }
            Err(e) => return (Err(e), attempt),
        };
        let Some(delay) = policy.next_backoff() else {
            return (Err(AttemptError::Engine(error)), attempt);
        };
        tracing::debug!(
            position = item.position,
            attempt,
            %error,
            ?delay,
            "Transient failure, retrying"
        );
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return (Err(AttemptError::Cancelled), attempt),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_job(ctx: Arc<JobContext>, semaphore: Arc<Semaphore>, job: DownloadJob) -> JobResult {
    let position = job.item.position;
    let finish = |outcome| JobResult {
        position,
        remote_id: job.item.remote_id.clone(),
        outcome,
    };

    let _permit = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => return finish(Outcome::Cancelled),
        permit = Arc::clone(&semaphore).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return finish(Outcome::Cancelled),
        },
    };

    ctx.emit(ExecutorEvent::Started {
        position,
        remote_id: job.item.remote_id.clone(),
    });
    tracing::debug!(position, remote_id = %job.item.remote_id, target = %job.target, "Downloading");

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(ctx.settings.initial_backoff)
        .with_max_interval(ctx.settings.max_backoff)
        .with_max_elapsed_time(None)
        .build();
    let (fetched, attempts) = fetch_with_retry(&ctx, &job.item, policy).await;

    let outcome = match fetched {
        Ok(fetched) => {
            let root = ctx.root.clone();
            let placing = job.clone();
            tokio::task::spawn_blocking(move || place(&root, &placing, fetched))
                .await
                .unwrap_or_else(|e| Outcome::Failed(FailureCause::Aborted(e.to_string())))
        }
        Err(AttemptError::Engine(error)) if error.is_transient() => {
            Outcome::Failed(FailureCause::Transient { error, attempts })
        }
        Err(AttemptError::Engine(error)) => Outcome::Failed(FailureCause::Permanent(error)),
        Err(AttemptError::Write(message)) => Outcome::Failed(FailureCause::Write {
            target: job.target.clone(),
            message,
        }),
        Err(AttemptError::Cancelled) => Outcome::Cancelled,
    };

    match &outcome {
        Outcome::Downloaded {
            filename, bytes, ..
        } => ctx.emit(ExecutorEvent::Finished {
            position,
            filename: filename.clone(),
            bytes: *bytes,
        }),
        Outcome::Failed(cause) => {
            tracing::warn!(position, remote_id = %job.item.remote_id, %cause, "Download failed");
            ctx.emit(ExecutorEvent::Failed {
                position,
                remote_id: job.item.remote_id.clone(),
                cause: cause.clone(),
            });
        }
        Outcome::Cancelled => {}
    }
    finish(outcome)
}

/// One attempt: stream the content into a fresh temporary file.
async fn fetch(
    ctx: &JobContext,
    item: &ItemDescriptor,
) -> std::result::Result<Fetched, AttemptError> {
    let write_error = |e: std::io::Error| AttemptError::Write(e.to_string());

    let mut stream = ctx
        .engine
        .download(&ctx.repository, item)
        .await
        .map_err(AttemptError::Engine)?;

    let temp = tempfile::Builder::new()
        .prefix(".bdl-")
        .suffix(".part")
        .tempfile_in(ctx.root.to_native())
        .map_err(write_error)?;
    let mut file = tokio::fs::File::from_std(temp.as_file().try_clone().map_err(write_error)?);

    let mut hasher = Checksum::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut bytes = 0u64;
    loop {
        let n = stream
            .read(&mut buffer)
            .await
            .map_err(|e| AttemptError::Engine(EngineError::from(e)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        file.write_all(&buffer[..n]).await.map_err(write_error)?;
        bytes += n as u64;
    }
    file.flush().await.map_err(write_error)?;
    file.sync_all().await.map_err(write_error)?;

    Ok(Fetched {
        temp,
        checksum: hasher.finish(),
        bytes,
    })
}

/// Move a fetched file to its destination.
fn place(root: &NormalizedPath, job: &DownloadJob, fetched: Fetched) -> Outcome {
    let Fetched {
        temp,
        checksum,
        bytes,
    } = fetched;
    let destination = root.join(&job.target).to_native();
    let downloaded = |checksum| Outcome::Downloaded {
        filename: job.target.clone(),
        checksum,
        bytes,
    };
    let collision = || {
        Outcome::Failed(FailureCause::Collision {
            target: job.target.clone(),
        })
    };

    if !job.replace && destination.exists() {
        return match compute_file_checksum(&destination) {
            Ok(existing) if existing == checksum => {
                tracing::debug!(target = %job.target, "Destination already holds this content");
                downloaded(checksum)
            }
            _ => collision(),
        };
    }

    let persisted = if job.replace {
        temp.persist(&destination).map(drop)
    } else {
        temp.persist_noclobber(&destination).map(drop)
    };
    match persisted {
        Ok(()) => downloaded(checksum),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => collision(),
        Err(e) => Outcome::Failed(FailureCause::Write {
            target: job.target.clone(),
            message: e.error.to_string(),
        }),
    }
}
