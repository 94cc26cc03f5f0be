//! Upload lifecycle handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use cine_models::{CompletedPart, UploadId};
use cine_upload::{InitiateRequest, InitiatedUpload, UploadStatusReport};

use crate::error::ApiResult;
use crate::state::AppState;

/// Part reports from the client, `{PartNumber, ETag}` per entry.
#[derive(Deserialize)]
pub struct PartsBody {
    pub parts: Vec<CompletedPart>,
}

/// Completion response for playback consumers.
#[derive(Serialize)]
pub struct CompleteUploadResponse {
    pub video_url: String,
    pub file_size_bytes: u64,
}

/// Initiate a multipart upload for a variant.
pub async fn initiate_upload(
    State(state): State<AppState>,
    Json(request): Json<InitiateRequest>,
) -> ApiResult<Json<InitiatedUpload>> {
    let initiated = state.coordinator.initiate(request).await?;
    Ok(Json(initiated))
}

/// Record parts the client finished uploading.
pub async fn record_parts(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    Json(body): Json<PartsBody>,
) -> ApiResult<Json<UploadStatusReport>> {
    let upload_id = UploadId::from_string(upload_id);
    state.coordinator.record_parts(&upload_id, &body.parts).await?;
    let status = state.coordinator.status(&upload_id).await?;
    Ok(Json(status))
}

/// Progress of an upload session.
pub async fn get_upload_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStatusReport>> {
    let upload_id = UploadId::from_string(upload_id);
    let status = state.coordinator.status(&upload_id).await?;
    Ok(Json(status))
}

/// Complete a multipart upload. The submitted part set must be exactly
/// `{1..total_parts}`; the call is idempotent for identical replays.
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    Json(body): Json<PartsBody>,
) -> ApiResult<Json<CompleteUploadResponse>> {
    let upload_id = UploadId::from_string(upload_id);
    let completed = state.coordinator.complete(&upload_id, &body.parts).await?;

    Ok(Json(CompleteUploadResponse {
        video_url: completed.storage_key,
        file_size_bytes: completed.file_size_bytes,
    }))
}

/// Abort an upload session, releasing reserved storage.
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<StatusCode> {
    let upload_id = UploadId::from_string(upload_id);
    state.coordinator.abort(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
