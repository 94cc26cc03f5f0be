//! The client upload orchestrator.
//!
//! Drives one task per source file: initiate a session, transfer parts
//! inside a bounded concurrency window, retry transient part failures,
//! report progress, and complete. Cancellation is cooperative: it takes
//! effect at the next part boundary, never mid-transfer.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use cine_models::{ClientUploadTask, CompletedPart, TaskId, TaskStatus, UploadId, VariantId};
use cine_upload::{CompletedUpload, InitiateRequest, InitiatedUpload, UploadCoordinator};

use crate::error::{UploaderError, UploaderResult};
use crate::progress::ProgressBus;
use crate::retry::PartRetryPolicy;
use crate::source::PartSource;
use crate::tasks::TaskStore;
use crate::transport::PartTransport;

/// Default part-transfer concurrency window.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Files at or above this size upload with a window of 1 to bound memory.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Default per-part network timeout.
pub const DEFAULT_PART_TIMEOUT_SECS: u64 = 120;

/// Default stuck-task timeout: no byte progress for this long means the
/// session is considered orphaned.
pub const DEFAULT_STUCK_TIMEOUT_SECS: u64 = 300;

/// Default retention of finished tasks before they leave the active set.
pub const DEFAULT_RETENTION_GRACE_SECS: u64 = 120;

/// Orchestrator configuration.
///
/// Three independent timers live here and must not be conflated: the
/// per-part network timeout (transient-fault detection), the stuck-task
/// timeout (abandonment sweep), and, elsewhere entirely, the signed-grant
/// TTL on the delivery path.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Concurrency window for part transfers.
    pub concurrency: usize,
    /// Files at least this large transfer with a window of 1.
    pub large_file_threshold: u64,
    /// Per-part network timeout.
    pub part_timeout: Duration,
    /// Retry policy for individual parts.
    pub retry: PartRetryPolicy,
    /// No byte progress for this long marks a task stuck.
    pub stuck_timeout: Duration,
    /// How long finished tasks stay visible before removal.
    pub retention_grace: Duration,
    /// Interval of the background sweep.
    pub sweep_interval: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            part_timeout: Duration::from_secs(DEFAULT_PART_TIMEOUT_SECS),
            retry: PartRetryPolicy::default(),
            stuck_timeout: Duration::from_secs(DEFAULT_STUCK_TIMEOUT_SECS),
            retention_grace: Duration::from_secs(DEFAULT_RETENTION_GRACE_SECS),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl UploaderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |name: &str, default: u64| {
            Duration::from_secs(
                std::env::var(name)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };

        Self {
            concurrency: std::env::var("UPLOADER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(defaults.concurrency),
            large_file_threshold: std::env::var("UPLOADER_LARGE_FILE_THRESHOLD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.large_file_threshold),
            part_timeout: secs("UPLOADER_PART_TIMEOUT_SECS", DEFAULT_PART_TIMEOUT_SECS),
            retry: defaults.retry,
            stuck_timeout: secs("UPLOADER_STUCK_TIMEOUT_SECS", DEFAULT_STUCK_TIMEOUT_SECS),
            retention_grace: secs("UPLOADER_RETENTION_GRACE_SECS", DEFAULT_RETENTION_GRACE_SECS),
            sweep_interval: defaults.sweep_interval,
        }
    }
}

/// The server-side session operations the orchestrator drives.
///
/// Implemented in-process by [`UploadCoordinator`] and over HTTP by
/// [`HttpSessionClient`](crate::http::HttpSessionClient).
#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn initiate(&self, request: InitiateRequest) -> UploaderResult<InitiatedUpload>;

    async fn record_parts(
        &self,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> UploaderResult<()>;

    async fn complete(
        &self,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> UploaderResult<CompletedUpload>;

    async fn abort(&self, upload_id: &UploadId) -> UploaderResult<()>;
}

#[async_trait]
impl SessionClient for UploadCoordinator {
    async fn initiate(&self, request: InitiateRequest) -> UploaderResult<InitiatedUpload> {
        UploadCoordinator::initiate(self, request)
            .await
            .map_err(|e| UploaderError::session(e.to_string()))
    }

    async fn record_parts(
        &self,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> UploaderResult<()> {
        UploadCoordinator::record_parts(self, upload_id, parts)
            .await
            .map_err(|e| UploaderError::session(e.to_string()))
    }

    async fn complete(
        &self,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> UploaderResult<CompletedUpload> {
        UploadCoordinator::complete(self, upload_id, parts)
            .await
            .map_err(|e| UploaderError::session(e.to_string()))
    }

    async fn abort(&self, upload_id: &UploadId) -> UploaderResult<()> {
        UploadCoordinator::abort(self, upload_id)
            .await
            .map_err(|e| UploaderError::session(e.to_string()))
    }
}

/// Per-task state the transfer loop needs across attempts: the source, the
/// session, and which parts already landed (so a manual retry only uploads
/// what is missing).
struct TaskRuntime {
    source: Arc<dyn PartSource>,
    variant_id: VariantId,
    file_name: String,
    content_type: String,
    session: Option<InitiatedUpload>,
    completed: BTreeMap<u32, String>,
}

/// Drives uploads from the client side. Cheap to clone; clones share the
/// same task store, event bus and runtime state.
#[derive(Clone)]
pub struct UploadOrchestrator {
    config: UploaderConfig,
    client: Arc<dyn SessionClient>,
    transport: Arc<dyn PartTransport>,
    tasks: Arc<TaskStore>,
    bus: Arc<ProgressBus>,
    runtime: Arc<Mutex<HashMap<TaskId, TaskRuntime>>>,
}

impl UploadOrchestrator {
    pub fn new(
        config: UploaderConfig,
        client: Arc<dyn SessionClient>,
        transport: Arc<dyn PartTransport>,
    ) -> Self {
        Self {
            config,
            client,
            transport,
            tasks: Arc::new(TaskStore::new()),
            bus: Arc::new(ProgressBus::new()),
            runtime: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The task store, for UI listings.
    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    /// The progress event bus.
    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    /// Enqueue a file for upload. The transfer runs in the background; its
    /// lifecycle is observable through the task store and the progress bus.
    pub async fn enqueue(
        &self,
        source: Arc<dyn PartSource>,
        variant_id: VariantId,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> TaskId {
        let file_name = file_name.into();
        let task = ClientUploadTask::new(variant_id.clone(), file_name.clone(), source.byte_size());
        let task_id = task.task_id.clone();

        self.tasks.insert(task.clone()).await;
        self.bus.task_updated(&task);

        self.runtime.lock().await.insert(
            task_id.clone(),
            TaskRuntime {
                source,
                variant_id,
                file_name,
                content_type: content_type.into(),
                session: None,
                completed: BTreeMap::new(),
            },
        );

        let this = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            this.run_task(&id).await;
        });

        task_id
    }

    /// Manually retry a task that surfaced an error. Only the parts that
    /// never landed are uploaded; the existing session is reused.
    pub async fn retry(&self, task_id: &TaskId) -> UploaderResult<()> {
        let task = self.tasks.get(task_id).await?;
        if task.status != TaskStatus::Error {
            return Err(UploaderError::session(format!(
                "task {} is {}, not error",
                task_id, task.status
            )));
        }

        let updated = self
            .tasks
            .update(task_id, |t| {
                t.status = TaskStatus::Uploading;
                t.error = None;
                t.completed_at = None;
                t.last_progress_at = chrono::Utc::now();
            })
            .await?;
        self.bus.task_updated(&updated);

        let this = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            this.run_task(&id).await;
        });

        Ok(())
    }

    /// Cancel a task: abort the session on the coordinator and stop part
    /// transfers at the next part boundary.
    pub async fn cancel(&self, task_id: &TaskId) -> UploaderResult<()> {
        self.tasks.request_cancel(task_id).await?;

        let task = self.tasks.get(task_id).await?;
        if let Some(upload_id) = &task.upload_id {
            if let Err(e) = self.client.abort(upload_id).await {
                warn!(task_id = %task_id, "Abort on cancel failed: {}", e);
            }
        }

        let updated = self.tasks.set_status(task_id, TaskStatus::Cancelled).await?;
        self.bus.task_updated(&updated);
        self.publish_overall().await;

        self.runtime.lock().await.remove(task_id);
        info!(task_id = %task_id, "Upload cancelled");
        Ok(())
    }

    /// Force-abort and remove tasks whose byte progress has not advanced
    /// within the stuck timeout. Actively progressing tasks are untouched.
    /// Returns the number of tasks reclaimed.
    pub async fn clear_stuck_tasks(&self) -> usize {
        let stuck = self.tasks.stuck_tasks(self.config.stuck_timeout).await;
        let count = stuck.len();

        for task in stuck {
            warn!(
                task_id = %task.task_id,
                file_name = %task.file_name,
                bytes_sent = task.bytes_sent,
                "Reclaiming stuck upload task"
            );

            if let Some(upload_id) = &task.upload_id {
                if let Err(e) = self.client.abort(upload_id).await {
                    warn!(task_id = %task.task_id, "Abort of stuck session failed: {}", e);
                }
            }

            self.tasks.remove(&task.task_id).await;
            self.runtime.lock().await.remove(&task.task_id);
        }

        if count > 0 {
            self.publish_overall().await;
        }
        count
    }

    /// Drop finished tasks past the retention grace period.
    pub async fn purge_finished(&self) -> usize {
        let removed = self.tasks.purge_finished(self.config.retention_grace).await;
        if removed > 0 {
            let live: Vec<TaskId> = self
                .tasks
                .snapshot()
                .await
                .into_iter()
                .map(|t| t.task_id)
                .collect();
            self.runtime.lock().await.retain(|id, _| live.contains(id));
        }
        removed
    }

    async fn run_task(&self, task_id: &TaskId) {
        match self.transfer(task_id).await {
            Ok(()) => {}
            Err(UploaderError::Cancelled) => {
                debug!(task_id = %task_id, "Transfer stopped by cancellation");
            }
            Err(e) => {
                let retries = match &e {
                    UploaderError::PartFailed { attempts, .. } => attempts.saturating_sub(1),
                    _ => 0,
                };
                warn!(task_id = %task_id, "Upload failed: {}", e);

                if let Ok(task) = self.tasks.mark_error(task_id, e.to_string(), retries).await {
                    self.bus.task_updated(&task);
                    self.bus.task_failed(task_id, e.to_string());
                }
                self.publish_overall().await;
            }
        }
    }

    async fn transfer(&self, task_id: &TaskId) -> UploaderResult<()> {
        let (source, session) = self.ensure_session(task_id).await?;
        let byte_size = source.byte_size();

        // A single very large file transfers with a window of 1 so at most
        // window * part_size bytes are ever resident.
        let window = if byte_size >= self.config.large_file_threshold {
            1
        } else {
            self.config.concurrency.max(1)
        };

        let already_done: BTreeMap<u32, String> = {
            let runtime = self.runtime.lock().await;
            runtime
                .get(task_id)
                .map(|rt| rt.completed.clone())
                .unwrap_or_default()
        };

        let semaphore = Arc::new(Semaphore::new(window));
        let mut workers: JoinSet<UploaderResult<Option<(CompletedPart, u64, u32)>>> =
            JoinSet::new();

        for part_url in &session.presigned_urls {
            if already_done.contains_key(&part_url.part_number) {
                continue;
            }

            let part_number = part_url.part_number;
            let url = part_url.url.clone();
            let part_size = session.part_size;
            let offset = (part_number as u64 - 1) * part_size;
            let part_len = byte_size.saturating_sub(offset).min(part_size);

            let semaphore = Arc::clone(&semaphore);
            let source = Arc::clone(&source);
            let transport = Arc::clone(&self.transport);
            let tasks = Arc::clone(&self.tasks);
            let retry = self.config.retry.clone();
            let task_id = task_id.clone();

            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");

                // Cancellation takes effect here, at the part boundary.
                if tasks.is_cancel_requested(&task_id).await {
                    return Ok(None);
                }

                let attempts = AtomicU32::new(0);
                let result = retry
                    .run(&format!("part {}", part_number), || {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        let source = Arc::clone(&source);
                        let transport = Arc::clone(&transport);
                        let url = url.clone();
                        async move {
                            // Re-read on every attempt so no extra copy of
                            // the part outlives a failed transfer.
                            let bytes = source.read_part(part_number, part_size).await?;
                            transport.put_part(&url, bytes).await
                        }
                    })
                    .await;

                match result {
                    Ok(etag) => {
                        let extra_retries = attempts.load(Ordering::SeqCst).saturating_sub(1);
                        Ok(Some((
                            CompletedPart::new(part_number, etag),
                            part_len,
                            extra_retries,
                        )))
                    }
                    Err((e, attempts)) => Err(UploaderError::PartFailed {
                        part_number,
                        attempts,
                        message: e.to_string(),
                    }),
                }
            });
        }

        let mut first_error: Option<UploaderError> = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined
                .map_err(|e| UploaderError::transport(format!("part worker panicked: {}", e)))?;

            match outcome {
                Ok(Some((part, part_len, extra_retries))) => {
                    self.on_part_uploaded(task_id, &session, part, part_len, extra_retries)
                        .await;
                }
                Ok(None) => {} // skipped at a cancellation boundary
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            // The session stays live and abortable; the task surfaces the
            // error with manual retry/cancel affordances.
            return Err(e);
        }

        if self.tasks.is_cancel_requested(task_id).await {
            return Err(UploaderError::Cancelled);
        }

        let parts: Vec<CompletedPart> = {
            let runtime = self.runtime.lock().await;
            let rt = runtime
                .get(task_id)
                .ok_or_else(|| UploaderError::TaskNotFound(task_id.to_string()))?;
            rt.completed
                .iter()
                .map(|(&part_number, etag)| CompletedPart {
                    part_number,
                    etag: etag.clone(),
                })
                .collect()
        };

        let updated = self.tasks.set_status(task_id, TaskStatus::Completed).await?;
        self.bus.task_updated(&updated);

        let completed = self.client.complete(&session.upload_id, &parts).await?;

        let updated = self.tasks.set_status(task_id, TaskStatus::Ready).await?;
        self.bus.task_updated(&updated);
        self.publish_overall().await;

        info!(
            task_id = %task_id,
            storage_key = %completed.storage_key,
            bytes = completed.file_size_bytes,
            "Upload complete"
        );
        Ok(())
    }

    /// Initiate the session on first run; reuse it on retry.
    async fn ensure_session(
        &self,
        task_id: &TaskId,
    ) -> UploaderResult<(Arc<dyn PartSource>, InitiatedUpload)> {
        let request = {
            let runtime = self.runtime.lock().await;
            let rt = runtime
                .get(task_id)
                .ok_or_else(|| UploaderError::TaskNotFound(task_id.to_string()))?;

            if let Some(session) = &rt.session {
                return Ok((Arc::clone(&rt.source), session.clone()));
            }

            InitiateRequest {
                variant_id: rt.variant_id.clone(),
                file_name: rt.file_name.clone(),
                file_size: rt.source.byte_size(),
                content_type: rt.content_type.clone(),
            }
        };

        let session = self.client.initiate(request).await?;

        let source = {
            let mut runtime = self.runtime.lock().await;
            let rt = runtime
                .get_mut(task_id)
                .ok_or_else(|| UploaderError::TaskNotFound(task_id.to_string()))?;
            rt.session = Some(session.clone());
            Arc::clone(&rt.source)
        };

        let updated = self
            .tasks
            .set_upload_id(task_id, session.upload_id.clone())
            .await?;
        self.bus.task_updated(&updated);

        Ok((source, session))
    }

    async fn on_part_uploaded(
        &self,
        task_id: &TaskId,
        session: &InitiatedUpload,
        part: CompletedPart,
        part_len: u64,
        extra_retries: u32,
    ) {
        {
            let mut runtime = self.runtime.lock().await;
            if let Some(rt) = runtime.get_mut(task_id) {
                rt.completed.insert(part.part_number, part.etag.clone());
            }
        }

        // Server-side bookkeeping is best-effort; completion validation is
        // the real gate.
        if let Err(e) = self.client.record_parts(&session.upload_id, &[part]).await {
            warn!(task_id = %task_id, "Part report failed: {}", e);
        }

        match self.tasks.add_bytes(task_id, part_len).await {
            Ok(mut task) => {
                if extra_retries > 0 {
                    task = self
                        .tasks
                        .update(task_id, |t| t.retries += extra_retries)
                        .await
                        .unwrap_or(task);
                }
                self.bus.task_updated(&task);
            }
            Err(e) => debug!(task_id = %task_id, "Progress update skipped: {}", e),
        }

        self.publish_overall().await;
    }

    async fn publish_overall(&self) {
        let (fraction, active) = self.tasks.overall_progress().await;
        self.bus.overall(fraction, active);
    }
}
