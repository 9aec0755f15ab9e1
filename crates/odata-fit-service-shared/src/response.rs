//! Response wrapper for OData responses.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use odata_fit_lib::{ContentFormat, InnerResponse, ProtocolVersion};
use serde::Serialize;

/// A successful (or already rendered) OData response.
///
/// Every response carries the version header of the protocol version it was
/// produced for. The same value converts into an axum response or into an
/// [`InnerResponse`] for the async monitor.
#[derive(Debug, Clone)]
pub struct ODataResponse {
    pub status: StatusCode,
    pub version: ProtocolVersion,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ODataResponse {
    /// Create an empty response.
    pub fn new(status: StatusCode, version: ProtocolVersion) -> Self {
        Self {
            status,
            version,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// 204 No Content.
    pub fn no_content(version: ProtocolVersion) -> Self {
        Self::new(StatusCode::NO_CONTENT, version)
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize>(
        status: StatusCode,
        version: ProtocolVersion,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status, version).with_body(ContentFormat::Json.media_type(), body))
    }

    /// Set the body and its content type.
    pub fn with_body(mut self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = body.into();
        self
    }

    /// Add a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Wrap a response produced elsewhere, e.g. one collected by the async
    /// monitor.
    pub fn from_inner(response: InnerResponse, version: ProtocolVersion) -> Self {
        Self {
            status: response.status,
            version,
            headers: response.headers,
            body: response.body,
        }
    }

    /// Convert into the representation framed by batches and parked by the
    /// async monitor, version header included.
    pub fn into_inner_response(self) -> InnerResponse {
        let mut response = InnerResponse::new(self.status);
        response.headers = self.headers;
        response.body = self.body;
        insert_version_header(&mut response.headers, self.version);
        response
    }
}

/// Set the version header of `version` on `headers`.
pub fn insert_version_header(headers: &mut HeaderMap, version: ProtocolVersion) {
    if let Ok(name) = HeaderName::from_bytes(version.version_header().as_bytes()) {
        headers.insert(name, HeaderValue::from_static(version.version_value()));
    }
}

impl IntoResponse for ODataResponse {
    fn into_response(self) -> Response {
        let mut headers = self.headers;
        insert_version_header(&mut headers, self.version);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}
