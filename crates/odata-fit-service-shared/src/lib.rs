//! Shared infrastructure for the odata-fit HTTP service.
//!
//! - [`AppState`]: fixture store, service roots, batch processor and the
//!   responses parked for the async monitor
//! - [`health`]: liveness/readiness handlers
//! - [`FaultResponse`]: OData error envelopes for failed requests
//! - [`ODataResponse`]: successful responses carrying the version header
//! - [`metrics`]: Prometheus metrics infrastructure
//! - [`logging`]: structured logging setup
//! - [`middleware`]: request tracking and metrics middleware
//! - [`ServiceConfig`]: environment configuration
//!
//! Handlers stay thin; entity and batch semantics live in `odata-fit-lib`:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  axum Handler                                               │
//! │  - Negotiate format, read preferences                       │
//! │  - Call odata-fit-lib APIs                                  │
//! │  - Render OData response or fault                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing Support
//!
//! [`test_utils`] seeds temporary fixture trees. Enable the `test-utils`
//! feature to use it from dependent crates.

#![deny(warnings)]

pub mod config;
mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
mod problem;
pub mod request;
mod response;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConfigError, ServiceConfig};
pub use health::{health_live, health_ready, HealthStatus};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    init_metrics, metrics_handler, record_async_parked, record_batch_processed,
    record_entity_operation, MetricsConfig, MetricsError,
};
pub use middleware::{extract_or_generate_request_id, MetricsLayer, RequestId};
pub use problem::{from_lib_error, FaultResponse};
pub use request::{
    batch_boundary, body_format, effective_method, negotiate_format, query_option, Preferences,
};
pub use response::{insert_version_header, ODataResponse};
pub use state::{AppState, AppStateError};
