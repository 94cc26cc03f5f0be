//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage and delivery operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Delivery signing is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Failed to initiate multipart upload: {0}")]
    InitiateFailed(String),

    #[error("Failed to presign part URL: {0}")]
    PresignFailed(String),

    #[error("Failed to complete multipart upload: {0}")]
    CompleteFailed(String),

    #[error("Failed to abort multipart upload: {0}")]
    AbortFailed(String),

    #[error("Signing failed: {0}")]
    SignFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    pub fn initiate_failed(msg: impl Into<String>) -> Self {
        Self::InitiateFailed(msg.into())
    }

    pub fn complete_failed(msg: impl Into<String>) -> Self {
        Self::CompleteFailed(msg.into())
    }
}
