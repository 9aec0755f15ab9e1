//! Delivery of inner batch requests.
//!
//! The [`Dispatcher`] trait is the seam between the batch processor and the
//! service it replays requests against. [`HttpDispatcher`] performs real HTTP
//! calls, normally back into the service's own base URL, so that batched and
//! non-batched requests run through exactly the same handlers.

use std::future::Future;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::request::{InnerRequest, X_HTTP_METHOD};
use crate::error::{Error, Result};
use crate::fault::ODataFault;
use crate::format::ContentFormat;
use crate::version::ProtocolVersion;

/// Response captured for one inner request.
#[derive(Debug, Clone)]
pub struct InnerResponse {
    /// Status code.
    pub status: StatusCode,
    /// Reason phrase of the status line.
    pub reason: String,
    /// Response headers; a name may carry several values.
    pub headers: HeaderMap,
    /// Body, possibly empty.
    pub body: Bytes,
}

impl InnerResponse {
    /// Create an empty response with the canonical reason phrase.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the body and its content type.
    pub fn with_body(mut self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = body.into();
        self
    }

    /// Synthesize the framed response for a fault.
    pub fn from_fault(fault: &ODataFault, version: ProtocolVersion, format: ContentFormat) -> Self {
        let (body, content_type) = fault.body(version, format);
        let mut response = Self::new(fault.status).with_body(content_type, body);
        if let Ok(value) = HeaderValue::from_str(version.version_value()) {
            if let Ok(name) = HeaderName::from_bytes(version.version_header().as_bytes()) {
                response.headers.insert(name, value);
            }
        }
        response
    }

    /// Whether the status is 400 or above.
    pub fn is_error(&self) -> bool {
        self.status.as_u16() >= 400
    }

    /// Value of the `Location` header.
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }
}

/// Performs inner batch requests.
pub trait Dispatcher {
    /// Perform the request and capture its response. Transport failures are
    /// errors; HTTP error statuses are ordinary responses.
    fn dispatch(
        &self,
        request: &InnerRequest,
    ) -> impl Future<Output = Result<InnerResponse>> + Send;
}

/// Identity presented on loopback calls.
///
/// The fixture service does not authenticate these calls; the credentials
/// only make the requests look like those of a real client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCredentials {
    /// Basic auth user name.
    pub username: String,
    /// Basic auth password.
    pub password: String,
}

impl Default for DispatchCredentials {
    fn default() -> Self {
        Self {
            username: "fit".to_string(),
            password: "fit".to_string(),
        }
    }
}

/// [`Dispatcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    credentials: DispatchCredentials,
}

impl HttpDispatcher {
    /// Build a dispatcher. Redirects are not followed and proxies are
    /// bypassed, so inner responses arrive exactly as the service produced
    /// them.
    pub fn new(credentials: DispatchCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    /// Credentials presented on every call.
    pub fn credentials(&self) -> &DispatchCredentials {
        &self.credentials
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch(
        &self,
        request: &InnerRequest,
    ) -> impl Future<Output = Result<InnerResponse>> + Send {
        let (method, tunneled) = request.wire_method();
        let mut builder = self
            .client
            .request(method, request.url.clone())
            .headers(request.headers.clone())
            .basic_auth(
                &self.credentials.username,
                Some(&self.credentials.password),
            );
        if let Some(verb) = tunneled {
            builder = builder.header(X_HTTP_METHOD, verb);
        }
        if request.sends_body() {
            builder = builder.body(request.body.clone());
        }

        let method = request.method.to_string();
        let url = request.url.to_string();

        async move {
            let dispatch_error = |source| Error::Dispatch {
                method: method.clone(),
                url: url.clone(),
                source,
            };

            let response = builder.send().await.map_err(dispatch_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(dispatch_error)?;

            tracing::debug!(method = %method, url = %url, status = status.as_u16(), "inner request completed");

            Ok(InnerResponse {
                status,
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_response_new() {
        let response = InnerResponse::new(StatusCode::CREATED)
            .with_header(LOCATION, HeaderValue::from_static("http://h/V40/Products(1)"));
        assert_eq!(response.reason, "Created");
        assert_eq!(response.location(), Some("http://h/V40/Products(1)"));
        assert!(!response.is_error());
    }

    #[test]
    fn test_inner_response_from_fault() {
        let fault = ODataFault::not_found("missing");
        let response = InnerResponse::from_fault(&fault, ProtocolVersion::V4, ContentFormat::Json);

        assert!(response.is_error());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.headers["content-type"], "application/json");
        assert_eq!(response.headers["odata-version"], "4.0");
        assert!(!response.body.is_empty());
    }

    #[test]
    fn test_default_credentials() {
        let dispatcher = HttpDispatcher::new(DispatchCredentials::default()).unwrap();
        assert_eq!(dispatcher.credentials().username, "fit");
    }
}
