//! Axum HTTP API server.
//!
//! This crate provides:
//! - Upload lifecycle endpoints (initiate / parts / status / complete / abort)
//! - Content variant management and the playback read contract
//! - Signed delivery grants (URLs and cookie triples)

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
