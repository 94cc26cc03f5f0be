//! Content variant models.
//!
//! A content variant is one language/audio rendition of a content item
//! (e.g. the dubbed vs. subtitled cut of the same movie). Variants own the
//! storage key of their media object and track the upload lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a content item (movie, episode).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a content variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub String);

impl VariantId {
    /// Generate a new random variant ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VariantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How the rendition carries its language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageType {
    /// Audio track re-recorded in the target language.
    Dubbed,
    /// Original audio with subtitles in the target language.
    Subtitled,
}

impl LanguageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageType::Dubbed => "dubbed",
            LanguageType::Subtitled => "subtitled",
        }
    }
}

impl fmt::Display for LanguageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upload lifecycle state of a variant.
///
/// `ready` is terminal unless an explicit re-upload request forces
/// `ready -> uploading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Created, no upload started yet
    #[default]
    Pending,
    /// A multipart session is live for this variant
    Uploading,
    /// Media fully uploaded and playable
    Ready,
    /// Upload aborted or failed
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Ready => "ready",
            UploadStatus::Error => "error",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One language/audio rendition of a content item.
///
/// Invariant (enforced by the registry): at most one variant with
/// `is_default = true` per `content_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentVariant {
    /// Unique variant ID
    pub id: VariantId,

    /// Owning content item
    pub content_id: ContentId,

    /// Dubbed or subtitled rendition
    pub language_type: LanguageType,

    /// BCP 47-ish language code ("pt-BR", "en")
    pub language_code: String,

    /// Display name ("Português (Brasil)")
    pub language_name: String,

    /// Whether this is the playback default for its content item
    pub is_default: bool,

    /// Object-storage key of the uploaded media, set when ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,

    /// Upload lifecycle state
    #[serde(default)]
    pub upload_status: UploadStatus,

    /// Final media size in bytes, set when ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,

    /// Optional quality label ("1080p")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ContentVariant {
    /// Create a new variant in `pending` state.
    pub fn new(
        content_id: ContentId,
        language_type: LanguageType,
        language_code: impl Into<String>,
        language_name: impl Into<String>,
        is_default: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VariantId::new(),
            content_id,
            language_type,
            language_code: language_code.into(),
            language_name: language_name.into(),
            is_default,
            storage_key: None,
            upload_status: UploadStatus::Pending,
            file_size_bytes: None,
            quality: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether playback consumers may use this variant.
    pub fn is_playable(&self) -> bool {
        self.upload_status == UploadStatus::Ready && self.storage_key.is_some()
    }

    /// Read contract for playback-selection consumers.
    pub fn summary(&self) -> VariantSummary {
        VariantSummary {
            id: self.id.clone(),
            language_type: self.language_type,
            language_code: self.language_code.clone(),
            language_name: self.language_name.clone(),
            is_default: self.is_default,
            upload_status: self.upload_status,
        }
    }
}

/// The variant read contract exposed to playback consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSummary {
    pub id: VariantId,
    pub language_type: LanguageType,
    pub language_code: String,
    pub language_name: String,
    pub is_default: bool,
    pub upload_status: UploadStatus,
}
