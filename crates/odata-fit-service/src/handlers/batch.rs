//! `POST /{version}/$batch`

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use odata_fit_lib::batch::CONTINUE_ON_ERROR;
use odata_fit_lib::{BatchContext, BATCH_RESPONSE_CONTENT_TYPE};
use odata_fit_service_shared::request::PREFERENCE_APPLIED;
use odata_fit_service_shared::{
    batch_boundary, from_lib_error, negotiate_format, record_batch_processed, AppState,
    FaultResponse, ODataResponse, Preferences,
};
use tracing::info;

use super::resolve_version;

/// Replay every request of a batch against this service and answer with the
/// framed responses.
pub async fn batch_handler(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let version = match resolve_version(&prefix) {
        Ok(version) => version,
        Err(fault) => return fault.into_response(),
    };
    let format = negotiate_format(query.as_deref(), &headers);

    let boundary = match batch_boundary(&headers) {
        Ok(boundary) => boundary,
        Err(fault) => return FaultResponse::new(fault, version, format).into_response(),
    };
    let preferences = Preferences::from_headers(&headers);

    let context = BatchContext::new(version, state.service_root(version).clone())
        .with_format(format)
        .with_continue_on_error(preferences.continue_on_error);

    info!(
        prefix = version.prefix(),
        boundary = %boundary,
        bytes = body.len(),
        continue_on_error = preferences.continue_on_error,
        "processing batch"
    );

    let processed = match state
        .batch_processor()
        .process(&context, &body, &boundary)
        .await
    {
        Ok(processed) => processed,
        Err(e) => return from_lib_error(&e, version, format).into_response(),
    };
    record_batch_processed(version, &processed.summary);

    let mut response = ODataResponse::new(StatusCode::ACCEPTED, version)
        .with_body(BATCH_RESPONSE_CONTENT_TYPE, processed.body);
    if preferences.continue_on_error {
        response = response.with_header(
            HeaderName::from_static(PREFERENCE_APPLIED),
            HeaderValue::from_static(CONTINUE_ON_ERROR),
        );
    }
    response.into_response()
}
