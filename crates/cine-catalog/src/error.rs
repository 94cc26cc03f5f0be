//! Catalog error types.

use thiserror::Error;

use cine_models::UploadStatus;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors that can occur in the variant registry.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Variant not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: UploadStatus, to: UploadStatus },

    #[error("Store error: {0}")]
    Store(String),
}

impl CatalogError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn invalid_transition(from: UploadStatus, to: UploadStatus) -> Self {
        Self::InvalidTransition { from, to }
    }
}
