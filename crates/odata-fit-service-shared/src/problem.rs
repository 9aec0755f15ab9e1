//! OData error responses.
//!
//! Handlers return [`FaultResponse`] for every failure. It renders the fault
//! in the envelope of the endpoint's protocol version and the negotiated
//! format, exactly as batch processing frames faults for inner requests.

use axum::response::{IntoResponse, Response};
use odata_fit_lib::{ContentFormat, Error as LibError, InnerResponse, ODataFault, ProtocolVersion};

use crate::response::ODataResponse;

/// An [`ODataFault`] bound to the version and format it is rendered in.
#[derive(Debug, Clone)]
pub struct FaultResponse {
    pub fault: ODataFault,
    pub version: ProtocolVersion,
    pub format: ContentFormat,
}

impl FaultResponse {
    pub fn new(fault: ODataFault, version: ProtocolVersion, format: ContentFormat) -> Self {
        Self {
            fault,
            version,
            format,
        }
    }

    /// Render into an [`ODataResponse`].
    pub fn into_odata(self) -> ODataResponse {
        let (body, content_type) = self.fault.body(self.version, self.format);
        let mut response = ODataResponse::new(self.fault.status, self.version);
        response.headers.insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static(content_type),
        );
        response.body = body;
        response
    }

    /// Render into the representation framed by batches.
    pub fn into_inner_response(self) -> InnerResponse {
        InnerResponse::from_fault(&self.fault, self.version, self.format)
    }
}

impl std::fmt::Display for FaultResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fault)
    }
}

impl std::error::Error for FaultResponse {}

impl IntoResponse for FaultResponse {
    fn into_response(self) -> Response {
        self.into_odata().into_response()
    }
}

/// Convert library errors to fault responses.
///
/// Server-side failures are logged; client errors are not.
pub fn from_lib_error(
    error: &LibError,
    version: ProtocolVersion,
    format: ContentFormat,
) -> FaultResponse {
    let fault = ODataFault::from_error(error);
    if fault.status.is_server_error() {
        tracing::error!(error = %error, "request failed");
    }
    FaultResponse::new(fault, version, format)
}
