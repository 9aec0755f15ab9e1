//! Asynchronous request monitor.
//!
//! A request sent with `Prefer: respond-async` is executed immediately; its
//! response is parked under a token and the client gets `202 Accepted` with a
//! `Location` pointing at `GET /{version}/async/{token}`. The first GET of
//! that URL returns the parked response as an `application/http` message and
//! forgets the token.

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use odata_fit_lib::batch::serialize_http_response;
use odata_fit_lib::{ContentFormat, ODataFault, ProtocolVersion};
use odata_fit_service_shared::request::{PREFERENCE_APPLIED, RESPOND_ASYNC};
use odata_fit_service_shared::{
    record_async_parked, AppState, FaultResponse, ODataResponse,
};

use super::resolve_version;

const APPLICATION_HTTP: &str = "application/http";

/// Park `outcome` and answer with the monitor location.
pub fn respond_async(
    state: &AppState,
    version: ProtocolVersion,
    outcome: Result<ODataResponse, FaultResponse>,
) -> Response {
    let inner = match outcome {
        Ok(response) => response.into_inner_response(),
        Err(fault) => fault.into_inner_response(),
    };
    let status = inner.status;
    let token = state.park_response(inner);
    record_async_parked(version);

    let monitor = format!("{}async/{}", state.service_root(version), token);
    tracing::debug!(token = %token, status = status.as_u16(), "response parked");

    match HeaderValue::from_str(&monitor) {
        Ok(location) => ODataResponse::new(StatusCode::ACCEPTED, version)
            .with_header(header::LOCATION, location)
            .with_header(
                HeaderName::from_static(PREFERENCE_APPLIED),
                HeaderValue::from_static(RESPOND_ASYNC),
            )
            .into_response(),
        Err(e) => FaultResponse::new(
            ODataFault::internal_error(format!("invalid monitor location {}: {}", monitor, e)),
            version,
            ContentFormat::Json,
        )
        .into_response(),
    }
}

/// `GET /{version}/async/{token}`
pub async fn async_monitor(
    State(state): State<AppState>,
    Path((prefix, token)): Path<(String, String)>,
) -> Response {
    let version = match resolve_version(&prefix) {
        Ok(version) => version,
        Err(fault) => return fault.into_response(),
    };

    match state.take_response(&token) {
        Some(parked) => ODataResponse::new(StatusCode::OK, version)
            .with_header(
                HeaderName::from_static("content-transfer-encoding"),
                HeaderValue::from_static("binary"),
            )
            .with_body(APPLICATION_HTTP, serialize_http_response(&parked))
            .into_response(),
        None => FaultResponse::new(
            ODataFault::not_found(format!("no pending response for token {}", token)),
            version,
            ContentFormat::Json,
        )
        .into_response(),
    }
}
