//! Upload coordination error types.

use thiserror::Error;

use cine_catalog::CatalogError;
use cine_models::{SessionState, UploadId, VariantId};
use cine_storage::StorageError;

/// Result type for upload coordination.
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors surfaced by the upload coordinator.
///
/// Structural errors (`SessionExists`, `SessionNotFound`, `SessionClosed`,
/// `PartSetMismatch` and the validation variants) indicate a protocol
/// violation and must not be retried; the caller re-initiates instead.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File size must be greater than zero")]
    InvalidFileSize,

    #[error("File size {size} exceeds the maximum of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Variant {0} already has a live upload session")]
    SessionExists(VariantId),

    #[error("Upload session not found: {0}")]
    SessionNotFound(UploadId),

    #[error("Upload session {upload_id} is {state}")]
    SessionClosed {
        upload_id: UploadId,
        state: SessionState,
    },

    #[error("Part set mismatch: {0}")]
    PartSetMismatch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}
