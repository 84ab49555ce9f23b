//! Upload-and-encode queue.
//!
//! Staged videos are admitted with [`EncodeQueue::enqueue`] and handed to a
//! single background worker, so at most one video is transcoded at a time and
//! jobs finish in admission order. Every transition is written to the
//! [`StatusStore`] so pollers can follow a job without touching the queue.

use crate::infrastructure::storage::s3::{ObjectStorage, StorageError};
use crate::infrastructure::transcoder::ffmpeg::MASTER_PLAYLIST;
use crate::infrastructure::transcoder::{TranscodeError, Transcoder};
use crate::modules::media::model::{EncodingStatus, Job};
use crate::modules::media::repository::{StatusStore, StoreError};
use async_channel::{Receiver, Sender};
use futures_util::FutureExt;
use futures_util::future::join_all;
use std::panic::AssertUnwindSafe;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{0} has no usable file name")]
    InvalidSource(String),

    #[error("failed to record status for {job}: {source}")]
    Status {
        job: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: EncodingStatus,
        to: EncodingStatus,
    },

    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("transcode of {0} timed out")]
    TimedOut(String),

    #[error("upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no master playlist produced for {0}")]
    MissingMasterPlaylist(String),

    #[error("worker panicked while encoding {0}")]
    Panicked(String),

    #[error("encode queue is shut down")]
    QueueClosed,

    #[error("job {0} was dropped before completing")]
    Abandoned(String),
}

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// Each job transcodes into `<output_root>/<job id>`.
    pub output_root: PathBuf,
    /// Objects land under `<key_prefix>/<job id>/...`.
    pub key_prefix: String,
    /// Deadline for the transcode step. `None` waits forever.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub encoding: Option<String>,
}

type Outcome = Result<String, EncodeError>;

struct QueuedJob {
    job: Job,
    reply: oneshot::Sender<Outcome>,
}

/// Resolves with the playback URL once the job's encode and upload finish.
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    rx: oneshot::Receiver<Outcome>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn wait(self) -> Outcome {
        self.rx
            .await
            .unwrap_or_else(|_| Err(EncodeError::Abandoned(self.id)))
    }
}

struct WorkerContext {
    transcoder: Arc<dyn Transcoder>,
    storage: Arc<dyn ObjectStorage>,
    statuses: Arc<dyn StatusStore>,
    settings: EncoderSettings,
    encoding: Mutex<Option<String>>,
}

/// Cloneable handle to the process-wide encode queue.
#[derive(Clone)]
pub struct EncodeQueue {
    tx: Sender<QueuedJob>,
    ctx: Arc<WorkerContext>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EncodeQueue {
    /// Spawns the worker. Must be called from within a tokio runtime.
    pub fn start(
        transcoder: Arc<dyn Transcoder>,
        storage: Arc<dyn ObjectStorage>,
        statuses: Arc<dyn StatusStore>,
        settings: EncoderSettings,
    ) -> Self {
        let (tx, rx) = async_channel::unbounded();
        let ctx = Arc::new(WorkerContext {
            transcoder,
            storage,
            statuses,
            settings,
            encoding: Mutex::new(None),
        });

        let worker = tokio::spawn(run_worker(ctx.clone(), rx));
        info!("🎥 Encode worker started");

        Self {
            tx,
            ctx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Records the job as pending and queues it behind every job admitted
    /// before it. Only the status write can fail here; encode failures are
    /// reported through the returned handle and the status store.
    pub async fn enqueue(&self, source_path: impl Into<PathBuf>) -> Result<JobHandle, EncodeError> {
        if self.tx.is_closed() {
            return Err(EncodeError::QueueClosed);
        }

        let source_path = source_path.into();
        let job = Job::new(&source_path, &self.ctx.settings.output_root)
            .ok_or_else(|| EncodeError::InvalidSource(source_path.display().to_string()))?;
        let id = job.id.clone();

        // Pending must be stored before the worker can see the job.
        self.ctx
            .statuses
            .upsert(&job.status_record(""))
            .await
            .map_err(|source| EncodeError::Status {
                job: id.clone(),
                source,
            })?;

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueuedJob { job, reply })
            .await
            .map_err(|_| EncodeError::QueueClosed)?;

        info!(job = %id, "📥 Queued video for encoding");
        Ok(JobHandle { id, rx })
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.tx.len(),
            encoding: self.ctx.encoding.lock().await.clone(),
        }
    }

    /// Stops admission, lets the worker drain every admitted job, then waits
    /// for it to exit.
    pub async fn shutdown(&self) {
        self.tx.close();

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            info!("🛑 Draining encode queue ({} pending)", self.tx.len());
            if let Err(e) = worker.await {
                error!("Encode worker ended abnormally: {}", e);
            }
        }
    }
}

async fn run_worker(ctx: Arc<WorkerContext>, rx: Receiver<QueuedJob>) {
    while let Ok(QueuedJob { job, reply }) = rx.recv().await {
        let id = job.id.clone();
        *ctx.encoding.lock().await = Some(id.clone());

        let outcome = AssertUnwindSafe(ctx.handle(job))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(EncodeError::Panicked(id.clone())));

        *ctx.encoding.lock().await = None;

        // The caller may have stopped listening.
        let _ = reply.send(outcome);
    }

    info!("🎥 Encode worker exiting, queue closed");
}

impl WorkerContext {
    async fn handle(&self, mut job: Job) -> Outcome {
        let started = Instant::now();

        let processing = self.transition(&mut job, EncodingStatus::Processing, "").await;
        let result = match processing {
            Ok(()) => {
                info!(job = %job.id, "⚙️ Encoding started");
                AssertUnwindSafe(self.encode(&job))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(EncodeError::Panicked(job.id.clone())))
            }
            Err(e) => Err(e),
        };

        let result = match result {
            Ok(playback_url) => self
                .transition(&mut job, EncodingStatus::Success, "")
                .await
                .map(|()| playback_url),
            Err(e) => Err(e),
        };

        match result {
            Ok(playback_url) => {
                self.clean_up(&job).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(job = %job.id, elapsed_ms, "✅ Encoded and uploaded: {}", playback_url);
                Ok(playback_url)
            }
            Err(err) => {
                error!(job = %job.id, "❌ Encoding failed: {}", err);
                self.record_failure(&mut job, &err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Transcode and upload every output file. Local files are left alone;
    /// they are removed only once Success is recorded.
    async fn encode(&self, job: &Job) -> Outcome {
        let transcode = self.transcoder.transcode(&job.source_path, &job.output_dir);
        match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, transcode)
                .await
                .map_err(|_| EncodeError::TimedOut(job.id.clone()))??,
            None => transcode.await?,
        }

        let files = collect_files(&job.output_dir).await?;
        info!(job = %job.id, "⬆️ Uploading {} file(s)", files.len());

        let uploads = files.iter().map(|relative| {
            let key = object_key(&self.settings.key_prefix, &job.id, relative);
            let path = job.output_dir.join(relative);
            async move {
                let content_type = content_type_for(&path);
                self.storage
                    .put_file(&key, &path, &content_type)
                    .await
                    .map_err(|source| EncodeError::Upload {
                        key: key.clone(),
                        source,
                    })
            }
        });
        // Every upload runs to completion, even after a sibling has failed.
        let stored = join_all(uploads)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let master_key = object_key(&self.settings.key_prefix, &job.id, Path::new(MASTER_PLAYLIST));
        stored
            .into_iter()
            .find(|object| object.key == master_key)
            .map(|object| object.url)
            .ok_or_else(|| EncodeError::MissingMasterPlaylist(job.id.clone()))
    }

    async fn clean_up(&self, job: &Job) {
        if let Err(e) = tokio::fs::remove_file(&job.source_path).await {
            warn!(job = %job.id, "Could not remove source {}: {}", job.source_path.display(), e);
        }
        if let Err(e) = tokio::fs::remove_dir_all(&job.output_dir).await {
            warn!(job = %job.id, "Could not clean up {}: {}", job.output_dir.display(), e);
        }
    }

    /// Moves the job forward to Failed. A job that never reached Processing
    /// passes through it first.
    async fn record_failure(&self, job: &mut Job, message: &str) {
        if job.status == EncodingStatus::Pending {
            if let Err(e) = self.transition(job, EncodingStatus::Processing, "").await {
                error!(job = %job.id, "Failed to record failure: {}", e);
                return;
            }
        }
        if let Err(e) = self.transition(job, EncodingStatus::Failed, message).await {
            error!(job = %job.id, "Failed to record failure: {}", e);
        }
    }

    /// The job only takes the new status once the store has accepted it.
    async fn transition(
        &self,
        job: &mut Job,
        next: EncodingStatus,
        message: &str,
    ) -> Result<(), EncodeError> {
        let mut advanced = job.clone();
        advanced
            .transition(next)
            .map_err(|(from, to)| EncodeError::InvalidTransition { from, to })?;

        self.statuses
            .upsert(&advanced.status_record(message))
            .await
            .map_err(|source| EncodeError::Status {
                job: job.id.clone(),
                source,
            })?;

        *job = advanced;
        Ok(())
    }
}

/// Every file below `root`, as sorted paths relative to it.
async fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                dirs.push(path);
            } else {
                let relative = path.strip_prefix(root).map(Path::to_path_buf).unwrap_or(path);
                files.push(relative);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn object_key(prefix: &str, job_id: &str, relative: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let prefix = prefix.trim_matches('/');
    if !prefix.is_empty() {
        parts.push(prefix.to_string());
    }
    parts.push(job_id.to_string());
    parts.extend(relative.components().filter_map(|c| match c {
        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
    }));
    parts.join("/")
}

fn content_type_for(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        Some("m4s") => "video/iso.segment".to_string(),
        _ => mime_guess::from_path(path)
            .first_or(mime::APPLICATION_OCTET_STREAM)
            .to_string(),
    }
}
