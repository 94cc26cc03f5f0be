//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use cine_catalog::CatalogError;
use cine_storage::StorageError;
use cine_upload::UploadError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Structural errors map to client-fault statuses and are never retried;
// configuration errors surface as 503 so callers can degrade.

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::InvalidFileSize
            | UploadError::FileTooLarge { .. }
            | UploadError::UnsupportedContentType(_)
            | UploadError::PartSetMismatch(_) => ApiError::BadRequest(e.to_string()),
            UploadError::SessionExists(_) | UploadError::SessionClosed { .. } => {
                ApiError::Conflict(e.to_string())
            }
            UploadError::SessionNotFound(_) => ApiError::NotFound(e.to_string()),
            UploadError::Storage(inner) => inner.into(),
            UploadError::Catalog(inner) => inner.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(_) => ApiError::NotFound(e.to_string()),
            CatalogError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
            CatalogError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotConfigured(_)
            | StorageError::ConfigError(_)
            | StorageError::InvalidKey(_) => ApiError::ServiceUnavailable(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::ServiceUnavailable(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    match self {
                        ApiError::ServiceUnavailable(_) => "Service unavailable".to_string(),
                        _ => "An internal error occurred".to_string(),
                    }
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse { detail };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cine_models::{UploadId, VariantId};

    #[test]
    fn test_structural_errors_are_client_faults() {
        let e: ApiError = UploadError::PartSetMismatch("missing: 3".to_string()).into();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);

        let e: ApiError = UploadError::SessionExists(VariantId::from("v")).into();
        assert_eq!(e.status_code(), StatusCode::CONFLICT);

        let e: ApiError = UploadError::SessionNotFound(UploadId::from("u")).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_configuration_errors_are_503() {
        let e: ApiError = StorageError::not_configured("CDN_DOMAIN not set").into();
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_nested_catalog_error_keeps_status() {
        let e: ApiError = UploadError::Catalog(CatalogError::not_found("v")).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
    }
}
