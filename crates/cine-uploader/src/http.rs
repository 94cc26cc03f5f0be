//! HTTP implementation of [`SessionClient`].
//!
//! Speaks the upload API's wire contract, so the CLI (or any out-of-process
//! client) drives the same coordinator the in-process adapter does.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cine_models::{CompletedPart, UploadId};
use cine_upload::{CompletedUpload, InitiateRequest, InitiatedUpload};

use crate::error::{UploaderError, UploaderResult};
use crate::orchestrator::SessionClient;

/// Session client over the upload HTTP API.
pub struct HttpSessionClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PartsBody<'a> {
    parts: &'a [CompletedPart],
}

#[derive(Deserialize)]
struct CompleteResponse {
    video_url: String,
    file_size_bytes: u64,
}

impl HttpSessionClient {
    pub fn new(base_url: impl Into<String>) -> UploaderResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into a session error carrying the
    /// server's message.
    async fn check(response: reqwest::Response) -> UploaderResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UploaderError::session(format!("{}: {}", status, body)))
    }
}

#[async_trait]
impl SessionClient for HttpSessionClient {
    async fn initiate(&self, request: InitiateRequest) -> UploaderResult<InitiatedUpload> {
        let response = self
            .client
            .post(self.url("/uploads/initiate"))
            .json(&serde_json::json!({
                "variant_id": request.variant_id,
                "file_name": request.file_name,
                "file_size": request.file_size,
                "content_type": request.content_type,
            }))
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn record_parts(
        &self,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> UploaderResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/uploads/{}/parts", upload_id)))
            .json(&PartsBody { parts })
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn complete(
        &self,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> UploaderResult<CompletedUpload> {
        let response = self
            .client
            .post(self.url(&format!("/uploads/{}/complete", upload_id)))
            .json(&PartsBody { parts })
            .send()
            .await?;

        let completed: CompleteResponse = Self::check(response).await?.json().await?;
        Ok(CompletedUpload {
            storage_key: completed.video_url,
            file_size_bytes: completed.file_size_bytes,
        })
    }

    async fn abort(&self, upload_id: &UploadId) -> UploaderResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/uploads/{}/abort", upload_id)))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
