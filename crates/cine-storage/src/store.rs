//! Multipart storage backend interface.

use std::time::Duration;

use async_trait::async_trait;

use cine_models::CompletedPart;

use crate::error::StorageResult;

/// The multipart primitives the upload coordinator needs from an
/// object-storage backend.
///
/// The backend owns part-level integrity (ETags) and object assembly; the
/// coordinator owns session bookkeeping and the part-set contract.
#[async_trait]
pub trait MultipartStore: Send + Sync {
    /// Start a multipart upload for `key`. Returns the backend's upload ID.
    async fn create_multipart(&self, key: &str, content_type: &str) -> StorageResult<String>;

    /// Presign a PUT URL for one part of an open upload.
    async fn presign_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Assemble the object from the given parts. The part list must already
    /// satisfy the backend's ordering contract (ascending part numbers).
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()>;

    /// Abort an open upload, releasing any stored parts.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()>;
}
