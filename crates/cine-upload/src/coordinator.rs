//! The upload session coordinator.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use cine_catalog::VariantStore;
use cine_models::{
    part_count, CompletedPart, ContentVariant, PartUrl, SessionState, UploadId, UploadSession,
    VariantId,
};
use cine_storage::MultipartStore;

use crate::error::{UploadError, UploadResult};

/// Default part size: 10 MiB. One canonical size, applied uniformly.
pub const DEFAULT_PART_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Default maximum file size: 10 GiB.
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Default expiry for presigned part URLs (1 hour).
pub const DEFAULT_PART_URL_TTL_SECS: u64 = 3600;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Canonical part size in bytes.
    pub part_size: u64,
    /// Maximum accepted file size in bytes.
    pub max_file_size: u64,
    /// Expiry for presigned part URLs.
    pub part_url_ttl: Duration,
    /// Accepted content types.
    pub allowed_content_types: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE_BYTES,
            max_file_size: DEFAULT_MAX_FILE_SIZE_BYTES,
            part_url_ttl: Duration::from_secs(DEFAULT_PART_URL_TTL_SECS),
            allowed_content_types: vec![
                "video/mp4".to_string(),
                "video/x-matroska".to_string(),
                "video/quicktime".to_string(),
            ],
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            part_size: std::env::var("UPLOAD_PART_SIZE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(defaults.part_size),
            max_file_size: std::env::var("UPLOAD_MAX_FILE_SIZE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_file_size),
            part_url_ttl: Duration::from_secs(
                std::env::var("UPLOAD_PART_URL_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PART_URL_TTL_SECS),
            ),
            allowed_content_types: defaults.allowed_content_types,
        }
    }
}

/// Request to initiate an upload for a variant.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateRequest {
    pub variant_id: VariantId,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
}

/// An initiated upload session, with one presigned URL per part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedUpload {
    pub upload_id: UploadId,
    pub storage_key: String,
    pub part_size: u64,
    pub total_parts: u32,
    pub presigned_urls: Vec<PartUrl>,
}

/// A successfully completed upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedUpload {
    pub storage_key: String,
    pub file_size_bytes: u64,
}

/// Progress report for an open or finished session.
#[derive(Debug, Clone, Serialize)]
pub struct UploadStatusReport {
    pub upload_id: UploadId,
    pub state: SessionState,
    pub uploaded_parts: u32,
    pub total_parts: u32,
    pub progress: f64,
}

struct SessionEntry {
    session: UploadSession,
    /// Cached result for idempotent re-completion.
    completion: Option<CompletedUpload>,
}

#[derive(Default)]
struct SessionMap {
    by_upload: HashMap<UploadId, SessionEntry>,
    /// Live sessions only; enforces one live session per variant.
    by_variant: HashMap<VariantId, UploadId>,
}

/// Coordinates multipart uploads between clients, the storage backend and
/// the variant registry.
pub struct UploadCoordinator {
    config: CoordinatorConfig,
    store: Arc<dyn MultipartStore>,
    catalog: Arc<dyn VariantStore>,
    sessions: Mutex<SessionMap>,
}

impl UploadCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn MultipartStore>,
        catalog: Arc<dyn VariantStore>,
    ) -> Self {
        Self {
            config,
            store,
            catalog,
            sessions: Mutex::new(SessionMap::default()),
        }
    }

    /// Start a multipart upload for a variant.
    ///
    /// Rejects empty/oversized files, unknown content types, and variants
    /// that already have a live session. On success the variant is marked
    /// `uploading` and the response carries a presigned PUT URL for every
    /// part.
    pub async fn initiate(&self, request: InitiateRequest) -> UploadResult<InitiatedUpload> {
        if request.file_size == 0 {
            return Err(UploadError::InvalidFileSize);
        }
        if request.file_size > self.config.max_file_size {
            return Err(UploadError::FileTooLarge {
                size: request.file_size,
                max: self.config.max_file_size,
            });
        }
        if !self
            .config
            .allowed_content_types
            .iter()
            .any(|t| t == &request.content_type)
        {
            return Err(UploadError::UnsupportedContentType(request.content_type));
        }

        // The session lock is held across the whole initiation so the
        // one-live-session-per-variant invariant cannot race.
        let mut sessions = self.sessions.lock().await;

        if sessions.by_variant.contains_key(&request.variant_id) {
            return Err(UploadError::SessionExists(request.variant_id));
        }

        let variant = self.catalog.get(&request.variant_id).await?;
        self.catalog.mark_uploading(&request.variant_id).await?;

        let storage_key = make_storage_key(&variant, &request.file_name);
        let total_parts = part_count(request.file_size, self.config.part_size);

        let upload_id = match self
            .store
            .create_multipart(&storage_key, &request.content_type)
            .await
        {
            Ok(id) => UploadId::from_string(id),
            Err(e) => {
                self.catalog
                    .revert_after_abort(&request.variant_id, false)
                    .await
                    .ok();
                return Err(e.into());
            }
        };

        let mut presigned_urls = Vec::with_capacity(total_parts as usize);
        for part_number in 1..=total_parts {
            let url = match self
                .store
                .presign_part(
                    &storage_key,
                    upload_id.as_str(),
                    part_number,
                    self.config.part_url_ttl,
                )
                .await
            {
                Ok(url) => url,
                Err(e) => {
                    self.store
                        .abort_multipart(&storage_key, upload_id.as_str())
                        .await
                        .ok();
                    self.catalog
                        .revert_after_abort(&request.variant_id, false)
                        .await
                        .ok();
                    return Err(e.into());
                }
            };
            presigned_urls.push(PartUrl { part_number, url });
        }

        let session = UploadSession::new(
            upload_id.clone(),
            request.variant_id.clone(),
            storage_key.clone(),
            request.content_type,
            request.file_size,
            self.config.part_size,
            total_parts,
        );

        info!(
            upload_id = %upload_id,
            variant_id = %request.variant_id,
            storage_key = %storage_key,
            total_parts,
            "Initiated multipart upload"
        );

        sessions
            .by_variant
            .insert(request.variant_id, upload_id.clone());
        sessions.by_upload.insert(
            upload_id.clone(),
            SessionEntry {
                session,
                completion: None,
            },
        );

        Ok(InitiatedUpload {
            upload_id,
            storage_key,
            part_size: self.config.part_size,
            total_parts,
            presigned_urls,
        })
    }

    /// Record parts the client has finished uploading.
    ///
    /// Moves the session `initiated -> in_progress` and powers
    /// [`status`](Self::status). Re-reports of a part number overwrite.
    pub async fn record_parts(
        &self,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> UploadResult<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .by_upload
            .get_mut(upload_id)
            .ok_or_else(|| UploadError::SessionNotFound(upload_id.clone()))?;

        if !entry.session.state.is_live() {
            return Err(UploadError::SessionClosed {
                upload_id: upload_id.clone(),
                state: entry.session.state,
            });
        }

        for part in parts {
            if part.part_number == 0 || part.part_number > entry.session.total_parts {
                return Err(UploadError::PartSetMismatch(format!(
                    "part number {} is outside 1..={}",
                    part.part_number, entry.session.total_parts
                )));
            }
            entry.session.record_part(part);
        }

        Ok(())
    }

    /// Complete a multipart upload.
    ///
    /// The submitted part-number set must equal exactly `{1..total_parts}`;
    /// any mismatch is rejected without partial effect. On success the
    /// backend assembles the object and the variant becomes `ready`.
    ///
    /// Idempotent: re-invoking with an already-completed session and an
    /// identical part set returns the cached result without re-invoking the
    /// backend.
    pub async fn complete(
        &self,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> UploadResult<CompletedUpload> {
        let mut sessions = self.sessions.lock().await;
        let sessions = &mut *sessions;
        let entry = sessions
            .by_upload
            .get_mut(upload_id)
            .ok_or_else(|| UploadError::SessionNotFound(upload_id.clone()))?;

        let submitted = validate_part_set(parts, entry.session.total_parts)?;

        match entry.session.state {
            SessionState::Aborted => {
                return Err(UploadError::SessionClosed {
                    upload_id: upload_id.clone(),
                    state: SessionState::Aborted,
                });
            }
            SessionState::Completed => {
                // Replay of an identical completion returns the cached
                // result; anything else is a protocol violation.
                if submitted == entry.session.parts {
                    let cached = entry.completion.clone().expect("completed session has result");
                    return Ok(cached);
                }
                return Err(UploadError::PartSetMismatch(
                    "completed session was re-submitted with a different part set".to_string(),
                ));
            }
            SessionState::Initiated | SessionState::InProgress => {}
        }

        let ordered: Vec<CompletedPart> = submitted
            .iter()
            .map(|(&part_number, etag)| CompletedPart {
                part_number,
                etag: etag.clone(),
            })
            .collect();

        self.store
            .complete_multipart(&entry.session.storage_key, upload_id.as_str(), &ordered)
            .await?;

        self.catalog
            .mark_ready(
                &entry.session.variant_id,
                &entry.session.storage_key,
                entry.session.file_size_bytes,
            )
            .await?;

        let result = CompletedUpload {
            storage_key: entry.session.storage_key.clone(),
            file_size_bytes: entry.session.file_size_bytes,
        };

        entry.session.parts = submitted;
        entry.session.state = SessionState::Completed;
        entry.completion = Some(result.clone());

        let variant_id = entry.session.variant_id.clone();
        sessions.by_variant.remove(&variant_id);

        info!(
            upload_id = %upload_id,
            variant_id = %variant_id,
            "Completed multipart upload"
        );

        Ok(result)
    }

    /// Abort an upload session, releasing reserved storage.
    ///
    /// The variant reverts to `pending` when no parts were ever recorded,
    /// otherwise to `error`. Aborting an already-aborted session is a no-op.
    pub async fn abort(&self, upload_id: &UploadId) -> UploadResult<()> {
        let mut sessions = self.sessions.lock().await;
        let sessions = &mut *sessions;
        let entry = sessions
            .by_upload
            .get_mut(upload_id)
            .ok_or_else(|| UploadError::SessionNotFound(upload_id.clone()))?;

        match entry.session.state {
            SessionState::Aborted => return Ok(()),
            SessionState::Completed => {
                return Err(UploadError::SessionClosed {
                    upload_id: upload_id.clone(),
                    state: SessionState::Completed,
                });
            }
            SessionState::Initiated | SessionState::InProgress => {}
        }

        self.store
            .abort_multipart(&entry.session.storage_key, upload_id.as_str())
            .await?;

        let had_activity = !entry.session.parts.is_empty();
        if let Err(e) = self
            .catalog
            .revert_after_abort(&entry.session.variant_id, had_activity)
            .await
        {
            warn!(
                upload_id = %upload_id,
                variant_id = %entry.session.variant_id,
                "Failed to revert variant after abort: {}", e
            );
        }

        entry.session.state = SessionState::Aborted;
        let variant_id = entry.session.variant_id.clone();
        sessions.by_variant.remove(&variant_id);

        info!(upload_id = %upload_id, variant_id = %variant_id, "Aborted multipart upload");
        Ok(())
    }

    /// Progress report for a session.
    pub async fn status(&self, upload_id: &UploadId) -> UploadResult<UploadStatusReport> {
        let sessions = self.sessions.lock().await;
        let entry = sessions
            .by_upload
            .get(upload_id)
            .ok_or_else(|| UploadError::SessionNotFound(upload_id.clone()))?;

        Ok(UploadStatusReport {
            upload_id: upload_id.clone(),
            state: entry.session.state,
            uploaded_parts: entry.session.recorded_parts(),
            total_parts: entry.session.total_parts,
            progress: entry.session.progress(),
        })
    }
}

/// Validate that `parts` is exactly `{1..=total_parts}` with no duplicates
/// or gaps, returning the part map in ascending order.
fn validate_part_set(
    parts: &[CompletedPart],
    total_parts: u32,
) -> UploadResult<BTreeMap<u32, String>> {
    let mut map = BTreeMap::new();

    for part in parts {
        if part.part_number == 0 || part.part_number > total_parts {
            return Err(UploadError::PartSetMismatch(format!(
                "part number {} is outside 1..={}",
                part.part_number, total_parts
            )));
        }
        if map.insert(part.part_number, part.etag.clone()).is_some() {
            return Err(UploadError::PartSetMismatch(format!(
                "duplicate part number {}",
                part.part_number
            )));
        }
    }

    if map.len() as u32 != total_parts {
        let missing: Vec<String> = (1..=total_parts)
            .filter(|n| !map.contains_key(n))
            .map(|n| n.to_string())
            .collect();
        return Err(UploadError::PartSetMismatch(format!(
            "expected {} parts, got {} (missing: {})",
            total_parts,
            map.len(),
            missing.join(", ")
        )));
    }

    Ok(map)
}

/// Storage key for a variant's media object:
/// `videos/{content_id}/{language_type}-{language_code}/{timestamp}-{file_name}`.
fn make_storage_key(variant: &ContentVariant, file_name: &str) -> String {
    format!(
        "videos/{}/{}-{}/{}-{}",
        variant.content_id,
        variant.language_type,
        variant.language_code,
        chrono::Utc::now().timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

/// Replace everything outside `[A-Za-z0-9._-]` with `_`.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use cine_catalog::{MemoryVariantStore, NewVariant};
    use cine_models::{ContentId, LanguageType, UploadStatus};
    use cine_storage::{StorageError, StorageResult};

    const MIB: u64 = 1024 * 1024;

    /// Backend fake that counts calls and records completions.
    #[derive(Default)]
    struct FakeStore {
        creates: AtomicU32,
        completes: AtomicU32,
        aborts: AtomicU32,
        fail_presign: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl MultipartStore for FakeStore {
        async fn create_multipart(&self, key: &str, _content_type: &str) -> StorageResult<String> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(format!("upload-{}-{}", n, key.len()))
        }

        async fn presign_part(
            &self,
            key: &str,
            upload_id: &str,
            part_number: u32,
            _expires_in: Duration,
        ) -> StorageResult<String> {
            if self.fail_presign.load(Ordering::SeqCst) {
                return Err(StorageError::PresignFailed("injected".to_string()));
            }
            Ok(format!(
                "https://store.test/{}?partNumber={}&uploadId={}",
                key, part_number, upload_id
            ))
        }

        async fn complete_multipart(
            &self,
            _key: &str,
            _upload_id: &str,
            parts: &[CompletedPart],
        ) -> StorageResult<()> {
            // The coordinator must hand parts over in ascending order
            assert!(parts.windows(2).all(|w| w[0].part_number < w[1].part_number));
            self.completes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn abort_multipart(&self, _key: &str, _upload_id: &str) -> StorageResult<()> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<FakeStore>,
        catalog: Arc<MemoryVariantStore>,
        coordinator: UploadCoordinator,
        variant_id: VariantId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(FakeStore::default());
        let catalog = Arc::new(MemoryVariantStore::new());

        let variant = catalog
            .create(NewVariant {
                content_id: ContentId::from("movie-1"),
                language_type: LanguageType::Dubbed,
                language_code: "pt-BR".to_string(),
                language_name: "Português (Brasil)".to_string(),
                is_default: true,
            })
            .await
            .unwrap();

        let coordinator = UploadCoordinator::new(
            CoordinatorConfig::default(),
            Arc::clone(&store) as Arc<dyn MultipartStore>,
            Arc::clone(&catalog) as Arc<dyn VariantStore>,
        );

        Fixture {
            store,
            catalog,
            coordinator,
            variant_id: variant.id,
        }
    }

    fn initiate_request(variant_id: &VariantId, file_size: u64) -> InitiateRequest {
        InitiateRequest {
            variant_id: variant_id.clone(),
            file_name: "movie.mp4".to_string(),
            file_size,
            content_type: "video/mp4".to_string(),
        }
    }

    fn parts(range: impl Iterator<Item = u32>) -> Vec<CompletedPart> {
        range.map(|n| CompletedPart::new(n, format!("\"etag-{}\"", n))).collect()
    }

    #[tokio::test]
    async fn test_initiate_computes_part_layout() {
        let f = fixture().await;

        let initiated = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 250 * MIB))
            .await
            .unwrap();

        assert_eq!(initiated.total_parts, 25);
        assert_eq!(initiated.part_size, 10 * MIB);
        assert_eq!(initiated.presigned_urls.len(), 25);
        assert_eq!(initiated.presigned_urls[0].part_number, 1);
        assert_eq!(initiated.presigned_urls[24].part_number, 25);
        assert!(initiated
            .storage_key
            .starts_with("videos/movie-1/dubbed-pt-BR/"));

        let variant = f.catalog.get(&f.variant_id).await.unwrap();
        assert_eq!(variant.upload_status, UploadStatus::Uploading);
    }

    #[tokio::test]
    async fn test_initiate_rejects_invalid_input() {
        let f = fixture().await;

        assert!(matches!(
            f.coordinator
                .initiate(initiate_request(&f.variant_id, 0))
                .await,
            Err(UploadError::InvalidFileSize)
        ));

        assert!(matches!(
            f.coordinator
                .initiate(initiate_request(&f.variant_id, 11 * 1024 * MIB))
                .await,
            Err(UploadError::FileTooLarge { .. })
        ));

        let mut bad_type = initiate_request(&f.variant_id, MIB);
        bad_type.content_type = "application/zip".to_string();
        assert!(matches!(
            f.coordinator.initiate(bad_type).await,
            Err(UploadError::UnsupportedContentType(_))
        ));

        // Rejections leave no session and no state change
        let variant = f.catalog.get(&f.variant_id).await.unwrap();
        assert_eq!(variant.upload_status, UploadStatus::Pending);
        assert_eq!(f.store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_live_session_per_variant() {
        let f = fixture().await;

        let first = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 30 * MIB))
            .await
            .unwrap();

        // A second initiate while the first is live fails, creating nothing
        assert!(matches!(
            f.coordinator
                .initiate(initiate_request(&f.variant_id, 30 * MIB))
                .await,
            Err(UploadError::SessionExists(_))
        ));
        assert_eq!(f.store.creates.load(Ordering::SeqCst), 1);

        // After abort the variant can be re-initiated
        f.coordinator.abort(&first.upload_id).await.unwrap();
        f.coordinator
            .initiate(initiate_request(&f.variant_id, 30 * MIB))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_complete_requires_exact_part_set() {
        let f = fixture().await;
        let initiated = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 50 * MIB))
            .await
            .unwrap();
        let id = &initiated.upload_id;

        // Missing a part
        let err = f.coordinator.complete(id, &parts(1..=4)).await.unwrap_err();
        assert!(matches!(err, UploadError::PartSetMismatch(_)));

        // Duplicate part
        let mut dup = parts(1..=5);
        dup.push(CompletedPart::new(3, "etag-3b"));
        assert!(matches!(
            f.coordinator.complete(id, &dup).await,
            Err(UploadError::PartSetMismatch(_))
        ));

        // Out-of-range part
        let mut extra = parts(1..=4);
        extra.push(CompletedPart::new(6, "etag-6"));
        assert!(matches!(
            f.coordinator.complete(id, &extra).await,
            Err(UploadError::PartSetMismatch(_))
        ));

        // No partial effect: backend untouched, variant still uploading
        assert_eq!(f.store.completes.load(Ordering::SeqCst), 0);
        let variant = f.catalog.get(&f.variant_id).await.unwrap();
        assert_eq!(variant.upload_status, UploadStatus::Uploading);

        // The exact set succeeds
        let completed = f.coordinator.complete(id, &parts(1..=5)).await.unwrap();
        assert_eq!(completed.file_size_bytes, 50 * MIB);
        assert_eq!(completed.storage_key, initiated.storage_key);

        let variant = f.catalog.get(&f.variant_id).await.unwrap();
        assert_eq!(variant.upload_status, UploadStatus::Ready);
        assert_eq!(variant.file_size_bytes, Some(50 * MIB));
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let f = fixture().await;
        let initiated = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 30 * MIB))
            .await
            .unwrap();
        let id = &initiated.upload_id;

        let first = f.coordinator.complete(id, &parts(1..=3)).await.unwrap();
        let replay = f.coordinator.complete(id, &parts(1..=3)).await.unwrap();

        assert_eq!(first.storage_key, replay.storage_key);
        assert_eq!(first.file_size_bytes, replay.file_size_bytes);
        // The backend completion ran exactly once
        assert_eq!(f.store.completes.load(Ordering::SeqCst), 1);

        // A different part set on a completed session is structural
        let mut different = parts(1..=3);
        different[0] = CompletedPart::new(1, "other-etag");
        assert!(matches!(
            f.coordinator.complete(id, &different).await,
            Err(UploadError::PartSetMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_crash_and_resume_uploads_only_missing_part() {
        let f = fixture().await;
        let initiated = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 250 * MIB))
            .await
            .unwrap();
        let id = &initiated.upload_id;
        assert_eq!(initiated.total_parts, 25);

        // Parts 1..=24 land, then the client crashes
        f.coordinator.record_parts(id, &parts(1..=24)).await.unwrap();

        let status = f.coordinator.status(id).await.unwrap();
        assert_eq!(status.uploaded_parts, 24);
        assert_eq!(status.total_parts, 25);
        assert!((status.progress - 24.0 / 25.0).abs() < 1e-9);
        assert_eq!(status.state, SessionState::InProgress);

        // Resume: only part 25 is transferred and reported
        f.coordinator
            .record_parts(id, &parts(25..=25))
            .await
            .unwrap();

        let completed = f.coordinator.complete(id, &parts(1..=25)).await.unwrap();
        assert_eq!(completed.file_size_bytes, 250 * MIB);
        assert_eq!(f.store.completes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_reverts_variant() {
        let f = fixture().await;

        // Abort with no recorded parts: back to pending
        let initiated = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 30 * MIB))
            .await
            .unwrap();
        f.coordinator.abort(&initiated.upload_id).await.unwrap();
        assert_eq!(f.store.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.catalog.get(&f.variant_id).await.unwrap().upload_status,
            UploadStatus::Pending
        );

        // Aborting again is a no-op
        f.coordinator.abort(&initiated.upload_id).await.unwrap();
        assert_eq!(f.store.aborts.load(Ordering::SeqCst), 1);

        // Abort mid-transfer: error
        let initiated = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 30 * MIB))
            .await
            .unwrap();
        f.coordinator
            .record_parts(&initiated.upload_id, &parts(1..=1))
            .await
            .unwrap();
        f.coordinator.abort(&initiated.upload_id).await.unwrap();
        assert_eq!(
            f.catalog.get(&f.variant_id).await.unwrap().upload_status,
            UploadStatus::Error
        );
    }

    #[tokio::test]
    async fn test_closed_sessions_reject_activity() {
        let f = fixture().await;
        let initiated = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 30 * MIB))
            .await
            .unwrap();
        let id = &initiated.upload_id;

        f.coordinator.complete(id, &parts(1..=3)).await.unwrap();

        assert!(matches!(
            f.coordinator.abort(id).await,
            Err(UploadError::SessionClosed { .. })
        ));
        assert!(matches!(
            f.coordinator.record_parts(id, &parts(1..=1)).await,
            Err(UploadError::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_session_is_structural() {
        let f = fixture().await;
        let missing = UploadId::from("no-such-upload");

        assert!(matches!(
            f.coordinator.status(&missing).await,
            Err(UploadError::SessionNotFound(_))
        ));
        assert!(matches!(
            f.coordinator.complete(&missing, &parts(1..=1)).await,
            Err(UploadError::SessionNotFound(_))
        ));
        assert!(matches!(
            f.coordinator.abort(&missing).await,
            Err(UploadError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_presign_failure_cleans_up() {
        let f = fixture().await;
        f.store.fail_presign.store(true, Ordering::SeqCst);

        let err = f
            .coordinator
            .initiate(initiate_request(&f.variant_id, 30 * MIB))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Storage(_)));

        // The backend upload was aborted and the variant reverted
        assert_eq!(f.store.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.catalog.get(&f.variant_id).await.unwrap().upload_status,
            UploadStatus::Pending
        );

        // The variant is free for a fresh attempt
        f.store.fail_presign.store(false, Ordering::SeqCst);
        f.coordinator
            .initiate(initiate_request(&f.variant_id, 30 * MIB))
            .await
            .unwrap();
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("movie.mp4"), "movie.mp4");
        assert_eq!(
            sanitize_file_name("my movie (final).mp4"),
            "my_movie__final_.mp4"
        );
        assert_eq!(sanitize_file_name("é✓.mkv"), "__.mkv");
    }

    #[test]
    fn test_validate_part_set_reports_missing() {
        let err = validate_part_set(&parts(1..=3).iter().cloned().filter(|p| p.part_number != 2).collect::<Vec<_>>(), 3)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing: 2"), "unexpected message: {}", msg);
    }
}
