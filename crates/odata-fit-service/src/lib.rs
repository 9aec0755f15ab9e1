//! odata-fit fixture OData service.
//!
//! Serves fixture entities under one root per protocol version and replays
//! `$batch` requests against itself.
//!
//! # Endpoints
//!
//! - `GET /{V30|V40}` - service document
//! - `GET|POST|PUT|PATCH|MERGE|DELETE /{V30|V40}/{resource}` - entity operations
//! - `POST /{V30|V40}/$batch` - batch processing
//! - `GET /{V30|V40}/async/{token}` - collect a `respond-async` result
//! - `GET /metrics` - Prometheus metrics endpoint
//! - `GET /health/live`, `GET /health/ready` - probes

pub mod handlers;

use axum::{
    routing::{any, get, post},
    Router,
};
use odata_fit_service_shared::{health_live, health_ready, metrics_handler, AppState, MetricsLayer};
use tower_http::cors::CorsLayer;

use handlers::{async_monitor, batch_handler, entity_handler, service_document};

/// Build the service router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/metrics", get(metrics_handler))
        .route("/{version}", get(service_document))
        .route("/{version}/", get(service_document))
        .route("/{version}/$batch", post(batch_handler))
        .route("/{version}/async/{token}", get(async_monitor))
        .route("/{version}/{*path}", any(entity_handler))
        .layer(CorsLayer::permissive())
        .layer(MetricsLayer)
        .with_state(state)
}
