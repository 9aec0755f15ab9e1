//! odata-fit fixture OData service.
//!
//! # Configuration
//!
//! - `FIT_FIXTURES_PATH` - fixture root (default: `./fixtures`)
//! - `SERVICE_PORT` - HTTP port (default: 8080)
//! - `SERVICE_BASE_URL` - externally reachable base URL (default: `http://localhost:<port>`)
//! - `FIT_DISPATCH_USER` / `FIT_DISPATCH_PASSWORD` - identity for batch loopback calls
//! - `RUST_LOG` - log level (default: info)
//! - `LOG_FORMAT` - log format: json (default) or text
//! - `METRICS_ENABLED` - set to `false` to skip the Prometheus recorder

use std::net::SocketAddr;

use anyhow::Context;
use odata_fit_service_shared::{
    init_logging, init_metrics, AppState, LoggingConfig, MetricsConfig, ServiceConfig,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging_config = LoggingConfig::from_env().with_service("odata-fit");
    init_logging(&logging_config);

    if let Err(e) = init_metrics(&MetricsConfig::from_env()) {
        tracing::warn!(error = %e, "failed to initialize metrics, continuing without metrics");
    }

    let config = ServiceConfig::from_env().context("invalid service configuration")?;
    info!(
        fixtures = %config.fixtures_path.display(),
        port = config.port,
        base_url = %config.base_url,
        "starting odata-fit service"
    );

    let state = AppState::load(&config)
        .map_err(|e| {
            error!(error = %e, path = %config.fixtures_path.display(), "failed to load application state");
            e
        })
        .context("failed to load fixtures")?;

    let app = odata_fit_service::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
