//! Health check handlers.
//!
//! `/health/live` answers as long as the process runs. `/health/ready`
//! additionally requires a fixture tree with at least one entity set.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use odata_fit_lib::ProtocolVersion;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health status response for liveness and readiness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "ok" or "not_ready: <reason>".
    pub status: String,

    pub service: String,

    pub version: String,

    /// Fixture root directory (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<String>,

    /// Entity sets found across all protocol versions (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_sets: Option<usize>,
}

impl HealthStatus {
    pub fn alive(service: &str, version: &str) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            fixtures: None,
            entity_sets: None,
        }
    }

    pub fn ready(service: &str, version: &str, fixtures: &str, entity_sets: usize) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            fixtures: Some(fixtures.to_string()),
            entity_sets: Some(entity_sets),
        }
    }

    pub fn not_ready(service: &str, version: &str, reason: &str) -> Self {
        Self {
            status: format!("not_ready: {}", reason),
            service: service.to_string(),
            version: version.to_string(),
            fixtures: None,
            entity_sets: None,
        }
    }
}

/// Liveness probe handler.
///
/// ```text
/// GET /health/live
/// {"status":"ok","service":"odata-fit-service-shared","version":"0.1.0"}
/// ```
pub async fn health_live() -> impl IntoResponse {
    let status = HealthStatus::alive(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    (StatusCode::OK, Json(status))
}

/// Readiness probe handler; 503 while no fixtures can be served.
pub async fn health_ready(State(state): State<AppState>) -> Response {
    let service = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    let store = state.store();

    if !store.root().is_dir() {
        let status = HealthStatus::not_ready(service, version, "fixture root missing");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response();
    }

    let mut entity_sets = 0;
    for protocol in ProtocolVersion::ALL {
        match store.entity_sets(protocol) {
            Ok(sets) => entity_sets += sets.len(),
            Err(e) => {
                tracing::warn!(error = %e, prefix = protocol.prefix(), "fixture scan failed");
                let status = HealthStatus::not_ready(service, version, "fixture scan failed");
                return (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response();
            }
        }
    }

    if entity_sets == 0 {
        let status = HealthStatus::not_ready(service, version, "no entity sets");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response();
    }

    let fixtures = store.root().display().to_string();
    let status = HealthStatus::ready(service, version, &fixtures, entity_sets);
    (StatusCode::OK, Json(status)).into_response()
}
