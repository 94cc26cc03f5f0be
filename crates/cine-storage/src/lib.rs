//! Object-storage backend and secure delivery for CineVault.
//!
//! This crate provides:
//! - The `MultipartStore` trait: create / presign-part / complete / abort
//!   multipart primitives consumed by the upload coordinator
//! - `S3MediaStore`: the S3-compatible implementation
//! - `DeliveryService`: time-limited signed CDN URLs and cookie grants

pub mod client;
pub mod delivery;
pub mod error;
pub mod store;

pub use client::{S3Config, S3MediaStore};
pub use delivery::{CookieGrant, DeliveryConfig, DeliveryService, SignedUrl};
pub use error::{StorageError, StorageResult};
pub use store::MultipartStore;
