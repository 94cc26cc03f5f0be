//! The client-side task store.
//!
//! An explicit, injected registry of in-flight uploads with a defined
//! lifecycle: tasks enter on enqueue, leave after a grace period once
//! terminal, or immediately on cancel/clear.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;

use cine_models::{ClientUploadTask, TaskId, TaskStatus, UploadId};

use crate::error::{UploaderError, UploaderResult};

/// Store of client upload tasks.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, ClientUploadTask>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: ClientUploadTask) {
        self.tasks.write().await.insert(task.task_id.clone(), task);
    }

    pub async fn get(&self, task_id: &TaskId) -> UploaderResult<ClientUploadTask> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| UploaderError::TaskNotFound(task_id.to_string()))
    }

    /// Apply a mutation to a task and return the updated copy.
    pub async fn update<F>(&self, task_id: &TaskId, mutate: F) -> UploaderResult<ClientUploadTask>
    where
        F: FnOnce(&mut ClientUploadTask),
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| UploaderError::TaskNotFound(task_id.to_string()))?;
        mutate(task);
        Ok(task.clone())
    }

    /// Advance a task's byte progress, refreshing its stuck-sweep clock.
    pub async fn add_bytes(&self, task_id: &TaskId, bytes: u64) -> UploaderResult<ClientUploadTask> {
        self.update(task_id, |task| {
            task.bytes_sent += bytes;
            task.last_progress_at = Utc::now();
        })
        .await
    }

    pub async fn set_upload_id(
        &self,
        task_id: &TaskId,
        upload_id: UploadId,
    ) -> UploaderResult<ClientUploadTask> {
        self.update(task_id, |task| task.upload_id = Some(upload_id)).await
    }

    pub async fn set_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
    ) -> UploaderResult<ClientUploadTask> {
        self.update(task_id, |task| {
            task.status = status;
            if status.is_terminal() {
                task.completed_at = Some(Utc::now());
            }
        })
        .await
    }

    pub async fn mark_error(
        &self,
        task_id: &TaskId,
        message: impl Into<String>,
        retries: u32,
    ) -> UploaderResult<ClientUploadTask> {
        let message = message.into();
        self.update(task_id, |task| {
            task.status = TaskStatus::Error;
            task.error = Some(message);
            task.retries += retries;
            task.completed_at = Some(Utc::now());
        })
        .await
    }

    /// Flag a task for cooperative cancellation.
    pub async fn request_cancel(&self, task_id: &TaskId) -> UploaderResult<ClientUploadTask> {
        self.update(task_id, |task| task.cancel_requested = true).await
    }

    pub async fn is_cancel_requested(&self, task_id: &TaskId) -> bool {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|t| t.cancel_requested)
            .unwrap_or(true)
    }

    pub async fn remove(&self, task_id: &TaskId) -> Option<ClientUploadTask> {
        self.tasks.write().await.remove(task_id)
    }

    /// All tasks, for UI listings.
    pub async fn snapshot(&self) -> Vec<ClientUploadTask> {
        let mut tasks: Vec<_> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// Mean fractional progress across active tasks, with the active count.
    pub async fn overall_progress(&self) -> (f64, usize) {
        let tasks = self.tasks.read().await;
        let active: Vec<_> = tasks.values().filter(|t| t.is_active()).collect();

        if active.is_empty() {
            return (0.0, 0);
        }

        let sum: f64 = active.iter().map(|t| t.progress()).sum();
        (sum / active.len() as f64, active.len())
    }

    /// Tasks whose byte progress has not advanced within `timeout`.
    pub async fn stuck_tasks(&self, timeout: Duration) -> Vec<ClientUploadTask> {
        let now = Utc::now();
        let timeout = ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::MAX);

        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.is_stuck(now, timeout))
            .cloned()
            .collect()
    }

    /// Drop terminal tasks whose grace period has elapsed. Returns the
    /// number removed.
    pub async fn purge_finished(&self, grace: Duration) -> usize {
        let now = Utc::now();
        let grace = ChronoDuration::from_std(grace).unwrap_or(ChronoDuration::MAX);

        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| {
            !(task.status.is_terminal()
                && task
                    .completed_at
                    .map(|done| now - done > grace)
                    .unwrap_or(false))
        });
        before - tasks.len()
    }
}
