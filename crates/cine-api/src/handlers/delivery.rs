//! Signed delivery grant handlers.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use cine_storage::{CookieGrant, SignedUrl};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request for a signed URL covering one resource.
#[derive(Deserialize)]
pub struct SignUrlRequest {
    pub resource_path: String,
    pub ttl_seconds: Option<u64>,
}

/// Request for a cookie grant covering a resource prefix.
#[derive(Deserialize)]
pub struct CookieGrantRequest {
    pub resource_prefix: String,
    pub ttl_seconds: Option<u64>,
}

/// Issue a signed URL for a single resource.
pub async fn sign_url(
    State(state): State<AppState>,
    Json(request): Json<SignUrlRequest>,
) -> ApiResult<Json<SignedUrl>> {
    ensure_configured(&state)?;

    let grant = state
        .delivery
        .signed_url(
            &request.resource_path,
            request.ttl_seconds.map(Duration::from_secs),
        )
        .await?;

    Ok(Json(grant))
}

/// Issue a cookie grant authorizing a whole resource prefix, e.g. every
/// segment of an adaptive-bitrate stream.
pub async fn sign_cookies(
    State(state): State<AppState>,
    Json(request): Json<CookieGrantRequest>,
) -> ApiResult<Json<CookieGrant>> {
    ensure_configured(&state)?;

    let grant = state
        .delivery
        .cookie_grant(
            &request.resource_prefix,
            request.ttl_seconds.map(Duration::from_secs),
        )
        .await?;

    Ok(Json(grant))
}

/// Delivery degrades to 503 when signing is not configured, instead of
/// failing deep inside a grant attempt.
fn ensure_configured(state: &AppState) -> ApiResult<()> {
    if !state.delivery.is_configured() {
        return Err(ApiError::service_unavailable(
            "signed delivery is not configured",
        ));
    }
    Ok(())
}
