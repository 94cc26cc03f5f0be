//! API routes.

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::delivery::{sign_cookies, sign_url};
use crate::handlers::health;
use crate::handlers::uploads::{
    abort_upload, complete_upload, get_upload_status, initiate_upload, record_parts,
};
use crate::handlers::variants::{
    create_variant, delete_variant, list_variants, request_reupload, set_default,
};
use crate::middleware::cors_layer;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/uploads/initiate", post(initiate_upload))
        .route("/uploads/:upload_id/parts", post(record_parts))
        .route("/uploads/:upload_id/status", get(get_upload_status))
        .route("/uploads/:upload_id/complete", post(complete_upload))
        .route("/uploads/:upload_id/abort", post(abort_upload));

    let variant_routes = Router::new()
        .route("/variants", post(create_variant))
        .route("/variants/:variant_id/reupload", post(request_reupload))
        .route("/variants/:variant_id/default", put(set_default))
        .route("/variants/:variant_id", delete(delete_variant))
        .route("/contents/:content_id/variants", get(list_variants));

    // Secure playback grants
    let delivery_routes = Router::new()
        .route("/delivery/url", post(sign_url))
        .route("/delivery/cookies", post(sign_cookies));

    let cors = cors_layer(&state.config.cors_origins);
    let body_limit = RequestBodyLimitLayer::new(state.config.max_body_size);

    Router::new()
        .route("/health", get(health))
        .merge(upload_routes)
        .merge(variant_routes)
        .merge(delivery_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(body_limit)
        .with_state(state)
}
