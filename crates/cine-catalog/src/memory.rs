//! In-memory variant store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use cine_models::{ContentId, ContentVariant, UploadStatus, VariantId};

use crate::error::{CatalogError, CatalogResult};
use crate::store::{NewVariant, VariantStore};

/// In-memory keyed-record implementation of [`VariantStore`].
#[derive(Default)]
pub struct MemoryVariantStore {
    variants: RwLock<HashMap<VariantId, ContentVariant>>,
}

impl MemoryVariantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear `is_default` on every variant of `content_id` except `keep`.
    fn demote_other_defaults(
        variants: &mut HashMap<VariantId, ContentVariant>,
        content_id: &ContentId,
        keep: &VariantId,
    ) {
        for variant in variants.values_mut() {
            if &variant.content_id == content_id && &variant.id != keep && variant.is_default {
                variant.is_default = false;
                variant.updated_at = Utc::now();
            }
        }
    }

    fn transition(
        variant: &mut ContentVariant,
        allowed_from: &[UploadStatus],
        to: UploadStatus,
    ) -> CatalogResult<()> {
        if !allowed_from.contains(&variant.upload_status) {
            return Err(CatalogError::invalid_transition(variant.upload_status, to));
        }
        variant.upload_status = to;
        variant.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl VariantStore for MemoryVariantStore {
    async fn create(&self, new: NewVariant) -> CatalogResult<ContentVariant> {
        let mut variants = self.variants.write().await;

        let variant = ContentVariant::new(
            new.content_id.clone(),
            new.language_type,
            new.language_code,
            new.language_name,
            new.is_default,
        );

        if new.is_default {
            Self::demote_other_defaults(&mut variants, &new.content_id, &variant.id);
        }

        debug!(
            variant_id = %variant.id,
            content_id = %variant.content_id,
            "Created content variant"
        );

        variants.insert(variant.id.clone(), variant.clone());
        Ok(variant)
    }

    async fn get(&self, variant_id: &VariantId) -> CatalogResult<ContentVariant> {
        self.variants
            .read()
            .await
            .get(variant_id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(variant_id.as_str()))
    }

    async fn mark_uploading(&self, variant_id: &VariantId) -> CatalogResult<()> {
        let mut variants = self.variants.write().await;
        let variant = variants
            .get_mut(variant_id)
            .ok_or_else(|| CatalogError::not_found(variant_id.as_str()))?;

        if variant.upload_status == UploadStatus::Uploading {
            return Ok(());
        }

        Self::transition(
            variant,
            &[UploadStatus::Pending, UploadStatus::Error],
            UploadStatus::Uploading,
        )
    }

    async fn mark_ready(
        &self,
        variant_id: &VariantId,
        storage_key: &str,
        file_size_bytes: u64,
    ) -> CatalogResult<()> {
        let mut variants = self.variants.write().await;
        let variant = variants
            .get_mut(variant_id)
            .ok_or_else(|| CatalogError::not_found(variant_id.as_str()))?;

        Self::transition(variant, &[UploadStatus::Uploading], UploadStatus::Ready)?;
        variant.storage_key = Some(storage_key.to_string());
        variant.file_size_bytes = Some(file_size_bytes);

        debug!(variant_id = %variant_id, storage_key, "Variant is ready");
        Ok(())
    }

    async fn mark_error(&self, variant_id: &VariantId) -> CatalogResult<()> {
        let mut variants = self.variants.write().await;
        let variant = variants
            .get_mut(variant_id)
            .ok_or_else(|| CatalogError::not_found(variant_id.as_str()))?;

        Self::transition(variant, &[UploadStatus::Uploading], UploadStatus::Error)
    }

    async fn revert_after_abort(
        &self,
        variant_id: &VariantId,
        had_activity: bool,
    ) -> CatalogResult<()> {
        let mut variants = self.variants.write().await;
        let variant = variants
            .get_mut(variant_id)
            .ok_or_else(|| CatalogError::not_found(variant_id.as_str()))?;

        let target = if had_activity {
            UploadStatus::Error
        } else {
            UploadStatus::Pending
        };

        Self::transition(variant, &[UploadStatus::Uploading], target)
    }

    async fn request_reupload(&self, variant_id: &VariantId) -> CatalogResult<()> {
        let mut variants = self.variants.write().await;
        let variant = variants
            .get_mut(variant_id)
            .ok_or_else(|| CatalogError::not_found(variant_id.as_str()))?;

        Self::transition(variant, &[UploadStatus::Ready], UploadStatus::Uploading)
    }

    async fn set_default(&self, variant_id: &VariantId) -> CatalogResult<ContentVariant> {
        let mut variants = self.variants.write().await;

        let content_id = variants
            .get(variant_id)
            .map(|v| v.content_id.clone())
            .ok_or_else(|| CatalogError::not_found(variant_id.as_str()))?;

        Self::demote_other_defaults(&mut variants, &content_id, variant_id);

        let variant = variants.get_mut(variant_id).expect("checked above");
        variant.is_default = true;
        variant.updated_at = Utc::now();
        Ok(variant.clone())
    }

    async fn list_by_content(&self, content_id: &ContentId) -> CatalogResult<Vec<ContentVariant>> {
        let variants = self.variants.read().await;

        let mut list: Vec<ContentVariant> = variants
            .values()
            .filter(|v| &v.content_id == content_id)
            .cloned()
            .collect();

        // Default first, then stable by creation time for deterministic menus
        list.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(a.created_at.cmp(&b.created_at))
        });

        Ok(list)
    }

    async fn delete(&self, variant_id: &VariantId) -> CatalogResult<()> {
        let mut variants = self.variants.write().await;
        variants
            .remove(variant_id)
            .ok_or_else(|| CatalogError::not_found(variant_id.as_str()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cine_models::LanguageType;

    fn new_variant(content: &str, code: &str, is_default: bool) -> NewVariant {
        NewVariant {
            content_id: ContentId::from(content),
            language_type: LanguageType::Dubbed,
            language_code: code.to_string(),
            language_name: code.to_string(),
            is_default,
        }
    }

    #[tokio::test]
    async fn test_create_starts_pending() {
        let store = MemoryVariantStore::new();
        let v = store.create(new_variant("m1", "pt-BR", false)).await.unwrap();
        assert_eq!(v.upload_status, UploadStatus::Pending);
    }

    #[tokio::test]
    async fn test_single_default_per_content() {
        let store = MemoryVariantStore::new();

        let first = store.create(new_variant("m1", "pt-BR", true)).await.unwrap();
        let second = store.create(new_variant("m1", "en", true)).await.unwrap();
        // Defaults on other content items are unaffected
        let other = store.create(new_variant("m2", "pt-BR", true)).await.unwrap();

        let first = store.get(&first.id).await.unwrap();
        assert!(!first.is_default, "prior default must be demoted");
        assert!(store.get(&second.id).await.unwrap().is_default);
        assert!(store.get(&other.id).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn test_set_default_promotes_and_demotes() {
        let store = MemoryVariantStore::new();

        let a = store.create(new_variant("m1", "pt-BR", true)).await.unwrap();
        let b = store.create(new_variant("m1", "en", false)).await.unwrap();

        let promoted = store.set_default(&b.id).await.unwrap();
        assert!(promoted.is_default);
        assert!(!store.get(&a.id).await.unwrap().is_default);

        let defaults: Vec<_> = store
            .list_by_content(&ContentId::from("m1"))
            .await
            .unwrap()
            .into_iter()
            .filter(|v| v.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let store = MemoryVariantStore::new();
        let v = store.create(new_variant("m1", "pt-BR", false)).await.unwrap();

        store.mark_uploading(&v.id).await.unwrap();
        store.mark_ready(&v.id, "videos/m1/key.mp4", 1234).await.unwrap();

        let v = store.get(&v.id).await.unwrap();
        assert_eq!(v.upload_status, UploadStatus::Ready);
        assert_eq!(v.storage_key.as_deref(), Some("videos/m1/key.mp4"));
        assert_eq!(v.file_size_bytes, Some(1234));
        assert!(v.is_playable());
    }

    #[tokio::test]
    async fn test_error_then_retry() {
        let store = MemoryVariantStore::new();
        let v = store.create(new_variant("m1", "pt-BR", false)).await.unwrap();

        store.mark_uploading(&v.id).await.unwrap();
        store.mark_error(&v.id).await.unwrap();
        assert_eq!(store.get(&v.id).await.unwrap().upload_status, UploadStatus::Error);

        // error -> uploading is a permitted retry
        store.mark_uploading(&v.id).await.unwrap();
        assert_eq!(
            store.get(&v.id).await.unwrap().upload_status,
            UploadStatus::Uploading
        );
    }

    #[tokio::test]
    async fn test_ready_requires_explicit_reupload() {
        let store = MemoryVariantStore::new();
        let v = store.create(new_variant("m1", "pt-BR", false)).await.unwrap();

        store.mark_uploading(&v.id).await.unwrap();
        store.mark_ready(&v.id, "videos/m1/key.mp4", 10).await.unwrap();

        // ready -> uploading is rejected without a re-upload request
        let err = store.mark_uploading(&v.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTransition { .. }));

        store.request_reupload(&v.id).await.unwrap();
        assert_eq!(
            store.get(&v.id).await.unwrap().upload_status,
            UploadStatus::Uploading
        );
    }

    #[tokio::test]
    async fn test_illegal_transitions_rejected() {
        let store = MemoryVariantStore::new();
        let v = store.create(new_variant("m1", "pt-BR", false)).await.unwrap();

        // pending -> ready skips uploading
        let err = store.mark_ready(&v.id, "k", 1).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTransition { .. }));

        // pending -> error has no failed upload to record
        let err = store.mark_error(&v.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_revert_after_abort() {
        let store = MemoryVariantStore::new();

        let quiet = store.create(new_variant("m1", "pt-BR", false)).await.unwrap();
        store.mark_uploading(&quiet.id).await.unwrap();
        store.revert_after_abort(&quiet.id, false).await.unwrap();
        assert_eq!(
            store.get(&quiet.id).await.unwrap().upload_status,
            UploadStatus::Pending
        );

        let active = store.create(new_variant("m1", "en", false)).await.unwrap();
        store.mark_uploading(&active.id).await.unwrap();
        store.revert_after_abort(&active.id, true).await.unwrap();
        assert_eq!(
            store.get(&active.id).await.unwrap().upload_status,
            UploadStatus::Error
        );
    }

    #[tokio::test]
    async fn test_list_by_content_orders_default_first() {
        let store = MemoryVariantStore::new();

        store.create(new_variant("m1", "en", false)).await.unwrap();
        store.create(new_variant("m1", "es", false)).await.unwrap();
        let d = store.create(new_variant("m1", "pt-BR", true)).await.unwrap();
        store.create(new_variant("m2", "en", true)).await.unwrap();

        let list = store.list_by_content(&ContentId::from("m1")).await.unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].id, d.id);
        assert!(list[0].is_default);
        // Remaining variants keep creation order
        assert_eq!(list[1].language_code, "en");
        assert_eq!(list[2].language_code, "es");
    }

    #[tokio::test]
    async fn test_get_and_delete_unknown_variant() {
        let store = MemoryVariantStore::new();
        let missing = VariantId::from("nope");

        assert!(matches!(
            store.get(&missing).await.unwrap_err(),
            CatalogError::NotFound(_)
        ));
        assert!(matches!(
            store.delete(&missing).await.unwrap_err(),
            CatalogError::NotFound(_)
        ));
    }
}
