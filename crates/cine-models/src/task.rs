//! Client-side upload task bookkeeping.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::session::UploadId;
use crate::variant::VariantId;

/// Unique identifier for a client upload task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a client upload task.
///
/// `converting` is reported by the server for post-upload processing; the
/// orchestrator itself moves tasks `uploading -> completed -> ready` (or to
/// `error`/`cancelled`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Parts are being transferred
    Uploading,
    /// Server-side processing after upload
    Converting,
    /// All bytes sent, completion submitted
    Completed,
    /// Variant confirmed playable
    Ready,
    /// Transfer failed; manual retry or cancel available
    Error,
    /// Cancelled by the user or the stuck sweep
    Cancelled,
}

impl TaskStatus {
    /// Terminal tasks are eligible for grace-period removal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Ready | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Uploading => "uploading",
            TaskStatus::Converting => "converting",
            TaskStatus::Completed => "completed",
            TaskStatus::Ready => "ready",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client-local bookkeeping for one file being uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientUploadTask {
    pub task_id: TaskId,
    pub variant_id: VariantId,
    pub file_name: String,
    pub byte_size: u64,
    pub bytes_sent: u64,
    pub status: TaskStatus,
    /// Upload session, once initiated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<UploadId>,
    /// Part-level retry attempts consumed so far.
    pub retries: u32,
    /// Human-readable failure message, when status is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cooperative cancellation flag; honored at the next part boundary.
    #[serde(default)]
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    /// Last time `bytes_sent` advanced; drives the stuck sweep.
    pub last_progress_at: DateTime<Utc>,
    /// Set when the task reaches a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ClientUploadTask {
    pub fn new(variant_id: VariantId, file_name: impl Into<String>, byte_size: u64) -> Self {
        let now = Utc::now();
        Self {
            task_id: TaskId::new(),
            variant_id,
            file_name: file_name.into(),
            byte_size,
            bytes_sent: 0,
            status: TaskStatus::Uploading,
            upload_id: None,
            retries: 0,
            error: None,
            cancel_requested: false,
            created_at: now,
            last_progress_at: now,
            completed_at: None,
        }
    }

    /// Fractional progress, 0.0..=1.0.
    pub fn progress(&self) -> f64 {
        if self.byte_size == 0 {
            return 0.0;
        }
        (self.bytes_sent as f64 / self.byte_size as f64).min(1.0)
    }

    /// Whether the task counts toward aggregate progress.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// A task is stuck when it is still uploading but its byte progress has
    /// not advanced within `timeout`.
    pub fn is_stuck(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == TaskStatus::Uploading && now - self.last_progress_at > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> ClientUploadTask {
        ClientUploadTask::new(VariantId::from("v-1"), "movie.mp4", 1000)
    }

    #[test]
    fn test_progress_fraction() {
        let mut t = task();
        assert_eq!(t.progress(), 0.0);
        t.bytes_sent = 250;
        assert_eq!(t.progress(), 0.25);
        t.bytes_sent = 2000; // over-report is clamped
        assert_eq!(t.progress(), 1.0);
    }

    #[test]
    fn test_zero_byte_file_has_zero_progress() {
        let t = ClientUploadTask::new(VariantId::from("v-1"), "empty.mp4", 0);
        assert_eq!(t.progress(), 0.0);
    }

    #[test]
    fn test_stuck_detection() {
        let mut t = task();
        let now = t.last_progress_at + Duration::seconds(90);

        assert!(t.is_stuck(now, Duration::seconds(60)));
        assert!(!t.is_stuck(now, Duration::seconds(120)));

        // Terminal tasks are never stuck
        t.status = TaskStatus::Error;
        assert!(!t.is_stuck(now, Duration::seconds(60)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Ready.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Uploading.is_terminal());
        assert!(!TaskStatus::Converting.is_terminal());
        assert!(!TaskStatus::Completed.is_terminal());
    }
}
