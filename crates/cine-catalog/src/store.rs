//! Variant registry interface.

use async_trait::async_trait;

use cine_models::{ContentId, ContentVariant, LanguageType, VariantId};

use crate::error::CatalogResult;

/// Input for creating a variant.
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub content_id: ContentId,
    pub language_type: LanguageType,
    pub language_code: String,
    pub language_name: String,
    pub is_default: bool,
}

/// Registry of content variants and their upload lifecycle.
///
/// State machine: `pending -> uploading -> {ready | error}`, with
/// `error -> uploading` permitted (retry) and `ready -> uploading` permitted
/// only via [`request_reupload`](VariantStore::request_reupload).
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Create a variant in `pending` state. When `is_default` is set, the
    /// flag is cleared on any prior default for the same content item
    /// (last write wins).
    async fn create(&self, new: NewVariant) -> CatalogResult<ContentVariant>;

    /// Fetch a variant by ID.
    async fn get(&self, variant_id: &VariantId) -> CatalogResult<ContentVariant>;

    /// `pending | error -> uploading`. A variant already `uploading` is left
    /// unchanged so an orphaned upload can be re-initiated once its session
    /// is gone.
    async fn mark_uploading(&self, variant_id: &VariantId) -> CatalogResult<()>;

    /// `uploading -> ready`, recording the final storage key and size.
    async fn mark_ready(
        &self,
        variant_id: &VariantId,
        storage_key: &str,
        file_size_bytes: u64,
    ) -> CatalogResult<()>;

    /// `uploading -> error`.
    async fn mark_error(&self, variant_id: &VariantId) -> CatalogResult<()>;

    /// Revert an `uploading` variant after an abort: back to `pending` when
    /// nothing was transferred, otherwise to `error`.
    async fn revert_after_abort(
        &self,
        variant_id: &VariantId,
        had_activity: bool,
    ) -> CatalogResult<()>;

    /// `ready -> uploading`, the only path out of `ready`, for an explicit
    /// re-upload request.
    async fn request_reupload(&self, variant_id: &VariantId) -> CatalogResult<()>;

    /// Promote a variant to the content item's default, demoting the
    /// previous default.
    async fn set_default(&self, variant_id: &VariantId) -> CatalogResult<ContentVariant>;

    /// All variants of a content item, default first, for playback
    /// selection.
    async fn list_by_content(&self, content_id: &ContentId) -> CatalogResult<Vec<ContentVariant>>;

    /// Delete a variant.
    async fn delete(&self, variant_id: &VariantId) -> CatalogResult<()>;
}
