//! Upload session coordination.
//!
//! The coordinator orchestrates multipart uploads against the storage
//! backend: initiation with all-upfront presigned part URLs, part
//! bookkeeping, exact part-set validation at completion, idempotent
//! completion, and abort with variant revert. It enforces the one
//! cross-request invariant of the subsystem: at most one live session per
//! content variant.

pub mod coordinator;
pub mod error;

pub use coordinator::{
    CompletedUpload, CoordinatorConfig, InitiateRequest, InitiatedUpload, UploadCoordinator,
    UploadStatusReport,
};
pub use error::{UploadError, UploadResult};
