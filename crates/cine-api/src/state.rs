//! Application state.

use std::sync::Arc;

use cine_catalog::{MemoryVariantStore, VariantStore};
use cine_storage::{DeliveryService, MultipartStore, S3MediaStore};
use cine_upload::{CoordinatorConfig, UploadCoordinator};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub catalog: Arc<dyn VariantStore>,
    pub coordinator: Arc<UploadCoordinator>,
    pub delivery: Arc<DeliveryService>,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(S3MediaStore::from_env().await?) as Arc<dyn MultipartStore>;
        let catalog = Arc::new(MemoryVariantStore::new()) as Arc<dyn VariantStore>;

        let coordinator = Arc::new(UploadCoordinator::new(
            CoordinatorConfig::from_env(),
            store,
            Arc::clone(&catalog),
        ));

        // Unconfigured delivery is a degraded mode, not a startup failure;
        // grant endpoints answer 503 until the CDN settings arrive.
        let delivery = Arc::new(DeliveryService::from_env());

        Ok(Self {
            config,
            catalog,
            coordinator,
            delivery,
        })
    }
}
