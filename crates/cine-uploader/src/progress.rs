//! Upload progress events.
//!
//! The orchestrator publishes task-level and aggregate progress on a
//! broadcast channel; UI layers subscribe and render. Rendering itself is
//! out of scope; the channel is the contract.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use cine_models::{ClientUploadTask, TaskId, TaskStatus};

/// Capacity of the event channel; laggy subscribers lose oldest events.
const CHANNEL_CAPACITY: usize = 256;

/// An upload progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// A task's status or byte progress changed.
    TaskUpdated {
        task_id: TaskId,
        status: TaskStatus,
        bytes_sent: u64,
        byte_size: u64,
        progress: f64,
    },
    /// A task failed with a human-readable message.
    TaskFailed { task_id: TaskId, message: String },
    /// Mean fractional progress across all active tasks.
    OverallProgress { fraction: f64, active_tasks: usize },
}

/// Broadcast channel for upload progress events.
pub struct ProgressBus {
    tx: broadcast::Sender<UploadEvent>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Events without subscribers are dropped.
    pub fn publish(&self, event: UploadEvent) {
        let _ = self.tx.send(event);
    }

    /// Publish the current state of a task.
    pub fn task_updated(&self, task: &ClientUploadTask) {
        self.publish(UploadEvent::TaskUpdated {
            task_id: task.task_id.clone(),
            status: task.status,
            bytes_sent: task.bytes_sent,
            byte_size: task.byte_size,
            progress: task.progress(),
        });
    }

    /// Publish a task failure.
    pub fn task_failed(&self, task_id: &TaskId, message: impl Into<String>) {
        self.publish(UploadEvent::TaskFailed {
            task_id: task_id.clone(),
            message: message.into(),
        });
    }

    /// Publish aggregate progress.
    pub fn overall(&self, fraction: f64, active_tasks: usize) {
        self.publish(UploadEvent::OverallProgress {
            fraction,
            active_tasks,
        });
    }
}
