//! S3-compatible multipart client.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use cine_models::CompletedPart;

use crate::error::{StorageError, StorageResult};
use crate::store::MultipartStore;

/// Configuration for the S3 media store.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket receiving media objects
    pub bucket_name: String,
    /// Region
    pub region: String,
    /// Custom endpoint for S3-compatible backends (MinIO, R2)
    pub endpoint_url: Option<String>,
    /// Use path-style addressing (required by most S3-compatible backends)
    pub force_path_style: bool,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            access_key_id: std::env::var("MEDIA_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("MEDIA_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("MEDIA_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("MEDIA_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("MEDIA_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("MEDIA_BUCKET_NAME not set"))?,
            region: std::env::var("MEDIA_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url: std::env::var("MEDIA_ENDPOINT_URL").ok(),
            force_path_style: std::env::var("MEDIA_FORCE_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

/// S3-compatible store for media objects.
#[derive(Clone)]
pub struct S3MediaStore {
    client: Client,
    bucket: String,
}

impl S3MediaStore {
    /// Create a new store from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "cinevault",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        Ok(Self {
            client,
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = S3Config::from_env()?;
        Self::new(config).await
    }
}

#[async_trait]
impl MultipartStore for S3MediaStore {
    async fn create_multipart(&self, key: &str, content_type: &str) -> StorageResult<String> {
        debug!("Creating multipart upload for {}", key);

        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::initiate_failed(e.to_string()))?;

        let upload_id = response
            .upload_id()
            .ok_or_else(|| StorageError::initiate_failed("backend returned no upload id"))?
            .to_string();

        info!("Created multipart upload {} for {}", upload_id, key);
        Ok(upload_id)
    }

    async fn presign_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        debug!(
            "Completing multipart upload {} for {} ({} parts)",
            upload_id,
            key,
            parts.len()
        );

        let s3_parts: Vec<S3CompletedPart> = parts
            .iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let assembled = CompletedMultipartUpload::builder()
            .set_parts(Some(s3_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(assembled)
            .send()
            .await
            .map_err(|e| StorageError::complete_failed(e.to_string()))?;

        info!("Completed multipart upload {} for {}", upload_id, key);
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        debug!("Aborting multipart upload {} for {}", upload_id, key);

        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| StorageError::AbortFailed(e.to_string()))?;

        info!("Aborted multipart upload {} for {}", upload_id, key);
        Ok(())
    }
}
