//! Prometheus metrics for the fixture service.
//!
//! - [`MetricsConfig`] / [`init_metrics`]: install the Prometheus recorder
//! - [`metrics_handler`]: the `/metrics` endpoint
//! - batch and entity counters recorded by the handlers
//!
//! ```no_run
//! use odata_fit_service_shared::metrics::{init_metrics, metrics_handler, MetricsConfig};
//! use axum::{routing::get, Router};
//!
//! init_metrics(&MetricsConfig::default()).expect("failed to initialize metrics");
//! let app: Router = Router::new().route("/metrics", get(metrics_handler));
//! ```

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use odata_fit_lib::{BatchSummary, ProtocolVersion};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Configuration for the metrics system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl MetricsConfig {
    /// Create configuration from environment variables.
    ///
    /// - `METRICS_ENABLED`: "true" or "false" (default: true)
    pub fn from_env() -> Self {
        let enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self { enabled }
    }
}

/// Install the Prometheus recorder. Must be called once, before anything is
/// recorded; later calls fail with [`MetricsError::AlreadyInitialized`].
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Err(MetricsError::Disabled);
    }
    if PROMETHEUS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)
}

/// The installed Prometheus handle, if any.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Handler for the metrics endpoint; Prometheus exposition format.
pub async fn metrics_handler() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# Metrics not initialized\n".to_string())
}

/// Errors that can occur during metrics initialization.
#[derive(Debug, Clone)]
pub enum MetricsError {
    Disabled,
    AlreadyInitialized,
    InstallFailed(String),
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::Disabled => write!(f, "metrics are disabled"),
            MetricsError::AlreadyInitialized => write!(f, "metrics recorder already initialized"),
            MetricsError::InstallFailed(e) => {
                write!(f, "failed to install metrics recorder: {}", e)
            }
        }
    }
}

impl std::error::Error for MetricsError {}

// =============================================================================
// Service Metrics Helpers
// =============================================================================

/// Record the outcome of one `$batch` call.
///
/// Feeds `odata_fit_batch_items_total`, `odata_fit_batch_requests_total`,
/// `odata_fit_batch_failures_total` and, when processing stopped early,
/// `odata_fit_batches_halted_total`.
pub fn record_batch_processed(version: ProtocolVersion, summary: &BatchSummary) {
    let prefix = version.prefix();
    metrics::counter!("odata_fit_batch_items_total", "version" => prefix)
        .increment(summary.items as u64);
    metrics::counter!("odata_fit_batch_requests_total", "version" => prefix)
        .increment(summary.requests as u64);
    metrics::counter!("odata_fit_batch_failures_total", "version" => prefix)
        .increment(summary.failures as u64);
    if summary.halted {
        metrics::counter!("odata_fit_batches_halted_total", "version" => prefix).increment(1);
    }
}

/// Record one entity operation.
///
/// * `operation` - e.g. "read", "create", "merge", "delete"
/// * `status` - HTTP status of the outcome
pub fn record_entity_operation(operation: &'static str, version: ProtocolVersion, status: u16) {
    metrics::counter!(
        "odata_fit_entity_operations_total",
        "operation" => operation,
        "version" => version.prefix(),
        "outcome" => if status >= 400 { "error" } else { "ok" }
    )
    .increment(1);
}

/// Record a response parked for the async monitor.
pub fn record_async_parked(version: ProtocolVersion) {
    metrics::counter!("odata_fit_async_responses_total", "version" => version.prefix())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_default() {
        assert!(MetricsConfig::default().enabled);
    }

    #[test]
    fn test_init_metrics_disabled() {
        let config = MetricsConfig { enabled: false };
        assert!(matches!(init_metrics(&config), Err(MetricsError::Disabled)));
    }

    #[tokio::test]
    async fn test_metrics_handler_without_recorder() {
        let output = metrics_handler().await;
        assert!(output.starts_with('#') || output.is_empty() || output.contains("odata_fit"));
    }

    #[test]
    fn test_service_metric_helpers() {
        let summary = BatchSummary {
            items: 2,
            requests: 3,
            failures: 1,
            halted: true,
        };
        record_batch_processed(ProtocolVersion::V4, &summary);
        record_entity_operation("create", ProtocolVersion::V3, 201);
        record_entity_operation("read", ProtocolVersion::V4, 404);
        record_async_parked(ProtocolVersion::V4);
    }

    #[test]
    fn test_metrics_error_display() {
        assert_eq!(MetricsError::Disabled.to_string(), "metrics are disabled");
        assert_eq!(
            MetricsError::AlreadyInitialized.to_string(),
            "metrics recorder already initialized"
        );
        assert!(MetricsError::InstallFailed("boom".to_string())
            .to_string()
            .contains("boom"));
    }
}
