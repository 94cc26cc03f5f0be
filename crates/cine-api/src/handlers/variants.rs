//! Content variant handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use cine_catalog::NewVariant;
use cine_models::{ContentId, ContentVariant, LanguageType, VariantId, VariantSummary};

use crate::error::ApiResult;
use crate::state::AppState;

/// Request to create a variant.
#[derive(Deserialize)]
pub struct CreateVariantRequest {
    pub content_id: String,
    pub language_type: LanguageType,
    pub language_code: String,
    pub language_name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Create a variant in `pending` state.
pub async fn create_variant(
    State(state): State<AppState>,
    Json(request): Json<CreateVariantRequest>,
) -> ApiResult<Json<ContentVariant>> {
    let variant = state
        .catalog
        .create(NewVariant {
            content_id: ContentId::from_string(request.content_id),
            language_type: request.language_type,
            language_code: request.language_code,
            language_name: request.language_name,
            is_default: request.is_default,
        })
        .await?;

    Ok(Json(variant))
}

/// Variants of a content item, default first: the playback read contract.
pub async fn list_variants(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
) -> ApiResult<Json<Vec<VariantSummary>>> {
    let variants = state
        .catalog
        .list_by_content(&ContentId::from_string(content_id))
        .await?;

    Ok(Json(variants.iter().map(|v| v.summary()).collect()))
}

/// Explicitly allow re-uploading a `ready` variant.
pub async fn request_reupload(
    State(state): State<AppState>,
    Path(variant_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .catalog
        .request_reupload(&VariantId::from_string(variant_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Promote a variant to its content item's default.
pub async fn set_default(
    State(state): State<AppState>,
    Path(variant_id): Path<String>,
) -> ApiResult<Json<ContentVariant>> {
    let variant = state
        .catalog
        .set_default(&VariantId::from_string(variant_id))
        .await?;
    Ok(Json(variant))
}

/// Delete a variant.
pub async fn delete_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .catalog
        .delete(&VariantId::from_string(variant_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
