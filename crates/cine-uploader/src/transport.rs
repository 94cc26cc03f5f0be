//! Raw part transfer to presigned URLs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ETAG;
use tracing::debug;

use crate::error::{UploaderError, UploaderResult};

/// Transfers one part's bytes to its presigned URL, returning the storage
/// backend's ETag header value (quotes included, as received).
#[async_trait]
pub trait PartTransport: Send + Sync {
    async fn put_part(&self, url: &str, body: Vec<u8>) -> UploaderResult<String>;
}

/// HTTP PUT transport with a per-part network timeout.
///
/// The timeout here detects transient faults on a single part; it is
/// independent of the stuck-task sweep and of grant TTLs.
pub struct HttpPartTransport {
    client: reqwest::Client,
}

impl HttpPartTransport {
    pub fn new(part_timeout: Duration) -> UploaderResult<Self> {
        let client = reqwest::Client::builder().timeout(part_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PartTransport for HttpPartTransport {
    async fn put_part(&self, url: &str, body: Vec<u8>) -> UploaderResult<String> {
        let len = body.len();
        let response = self
            .client
            .put(url)
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploaderError::transport("backend returned no ETag header"))?;

        debug!("PUT {} bytes, etag {}", len, etag);
        Ok(etag)
    }
}
