//! Multipart upload session models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::variant::VariantId;

/// Identifier of a multipart upload session.
///
/// This is the storage backend's upload ID, used verbatim so the session can
/// be correlated with the backend's own bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(pub String);

impl UploadId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UploadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A presigned PUT URL for one part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrl {
    /// 1-based part number
    pub part_number: u32,
    /// Presigned URL the client PUTs raw bytes to
    pub url: String,
}

/// A part the client finished uploading, reported back for completion.
///
/// Wire casing follows the storage backend's convention (`PartNumber`,
/// `ETag`). The ETag is normalized here, in the constructor, and nowhere
/// else: storage backends return it wrapped in quote characters and the
/// completion call wants it bare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,

    #[serde(rename = "ETag")]
    pub etag: String,
}

impl CompletedPart {
    /// Create a part record, stripping surrounding quotes from the ETag.
    pub fn new(part_number: u32, etag: impl AsRef<str>) -> Self {
        Self {
            part_number,
            etag: etag.as_ref().trim_matches('"').to_string(),
        }
    }
}

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no part activity reported yet
    Initiated,
    /// At least one part has been reported
    InProgress,
    /// Backend completion succeeded; result cached for idempotent replay
    Completed,
    /// Aborted; storage resources released
    Aborted,
}

impl SessionState {
    /// A live session blocks new sessions for the same variant.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Initiated | SessionState::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initiated => "initiated",
            SessionState::InProgress => "in_progress",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One in-flight multipart transfer.
///
/// Invariant (enforced by the coordinator): at most one session with a live
/// state per `variant_id`.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: UploadId,
    pub variant_id: VariantId,
    pub storage_key: String,
    pub content_type: String,
    pub file_size_bytes: u64,
    pub part_size: u64,
    pub total_parts: u32,
    /// Parts reported so far, keyed by part number (ordered).
    pub parts: BTreeMap<u32, String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        upload_id: UploadId,
        variant_id: VariantId,
        storage_key: impl Into<String>,
        content_type: impl Into<String>,
        file_size_bytes: u64,
        part_size: u64,
        total_parts: u32,
    ) -> Self {
        Self {
            upload_id,
            variant_id,
            storage_key: storage_key.into(),
            content_type: content_type.into(),
            file_size_bytes,
            part_size,
            total_parts,
            parts: BTreeMap::new(),
            state: SessionState::Initiated,
            created_at: Utc::now(),
        }
    }

    /// Record a reported part. Re-reports overwrite (the backend keeps the
    /// last uploaded bytes for a part number).
    pub fn record_part(&mut self, part: &CompletedPart) {
        self.parts.insert(part.part_number, part.etag.clone());
        if self.state == SessionState::Initiated {
            self.state = SessionState::InProgress;
        }
    }

    /// Parts reported so far.
    pub fn recorded_parts(&self) -> u32 {
        self.parts.len() as u32
    }

    /// Fraction of parts reported, 0.0..=1.0.
    pub fn progress(&self) -> f64 {
        if self.total_parts == 0 {
            return 0.0;
        }
        self.parts.len() as f64 / self.total_parts as f64
    }
}

/// Compute the number of parts for a file, `ceil(file_size / part_size)`.
pub fn part_count(file_size: u64, part_size: u64) -> u32 {
    debug_assert!(part_size > 0);
    file_size.div_ceil(part_size) as u32
}
