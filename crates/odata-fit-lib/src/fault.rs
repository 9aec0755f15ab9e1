//! OData error payloads.
//!
//! A fault renders the same way whether it answers a top-level request or is
//! framed inside a batch response. The envelope depends on the protocol
//! version, the encoding on the negotiated [`ContentFormat`].

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::error::Error;
use crate::format::ContentFormat;
use crate::version::ProtocolVersion;

const FAULT_LANG: &str = "en-US";

/// An OData error to be returned to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataFault {
    /// HTTP status of the error response.
    pub status: StatusCode,
    /// Service-defined error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ODataFault {
    /// Create a fault whose code is the numeric status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: status.as_u16().to_string(),
            message: message.into(),
        }
    }

    /// Override the error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 415 Unsupported Media Type.
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, message)
    }

    /// 500 Internal Server Error.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Map a library error to the fault reported to clients.
    pub fn from_error(error: &Error) -> Self {
        let status = match error {
            Error::EntitySetNotFound { .. }
            | Error::EntityNotFound { .. }
            | Error::PropertyNotFound { .. } => StatusCode::NOT_FOUND,
            Error::EntityExists { .. } => StatusCode::CONFLICT,
            Error::InvalidKey { .. }
            | Error::MalformedPath { .. }
            | Error::NotAnObject
            | Error::Json(_)
            | Error::MalformedBatch { .. }
            | Error::UnparseableRequest { .. }
            | Error::UnresolvedReference { .. }
            | Error::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            Error::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }

    /// Render the fault body. Returns the bytes and their content type.
    pub fn render(
        &self,
        version: ProtocolVersion,
        format: ContentFormat,
    ) -> Result<(Bytes, &'static str), Error> {
        match format {
            ContentFormat::Json => {
                let body = serde_json::to_vec(&self.to_json(version))?;
                Ok((Bytes::from(body), ContentFormat::Json.media_type()))
            }
            ContentFormat::Xml => {
                let document = XmlFault {
                    xmlns: version.metadata_namespace(),
                    code: &self.code,
                    message: XmlMessage {
                        lang: FAULT_LANG,
                        value: &self.message,
                    },
                };
                let xml = quick_xml::se::to_string(&document).map_err(|err| {
                    Error::FaultSerialize {
                        message: err.to_string(),
                    }
                })?;
                let body = format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{}", xml);
                Ok((Bytes::from(body), ContentFormat::Xml.media_type()))
            }
        }
    }

    /// Render the fault, falling back to a plain-text message if the
    /// negotiated encoding fails.
    pub fn body(&self, version: ProtocolVersion, format: ContentFormat) -> (Bytes, &'static str) {
        self.render(version, format).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "fault rendering failed, using plain text");
            (Bytes::from(self.message.clone()), "text/plain")
        })
    }

    fn to_json(&self, version: ProtocolVersion) -> serde_json::Value {
        match version {
            ProtocolVersion::V3 => json!({
                version.fault_envelope(): {
                    "code": self.code,
                    "message": { "lang": FAULT_LANG, "value": self.message },
                }
            }),
            ProtocolVersion::V4 => json!({
                version.fault_envelope(): {
                    "code": self.code,
                    "message": self.message,
                }
            }),
        }
    }
}

impl std::fmt::Display for ODataFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.code, self.message)
    }
}

impl std::error::Error for ODataFault {}

impl From<&Error> for ODataFault {
    fn from(error: &Error) -> Self {
        Self::from_error(error)
    }
}

#[derive(Serialize)]
#[serde(rename = "m:error")]
struct XmlFault<'a> {
    #[serde(rename = "@xmlns:m")]
    xmlns: &'a str,
    #[serde(rename = "m:code")]
    code: &'a str,
    #[serde(rename = "m:message")]
    message: XmlMessage<'a>,
}

#[derive(Serialize)]
struct XmlMessage<'a> {
    #[serde(rename = "@xml:lang")]
    lang: &'a str,
    #[serde(rename = "$text")]
    value: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_json_fault() {
        let fault = ODataFault::not_found("Products(99) not found");
        let (body, content_type) = fault.render(ProtocolVersion::V4, ContentFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(content_type, "application/json");
        assert_eq!(value["error"]["code"], "404");
        assert_eq!(value["error"]["message"], "Products(99) not found");
    }

    #[test]
    fn test_v3_json_fault() {
        let fault = ODataFault::bad_request("bad").with_code("E1");
        let (body, _) = fault.render(ProtocolVersion::V3, ContentFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["odata.error"]["code"], "E1");
        assert_eq!(value["odata.error"]["message"]["value"], "bad");
        assert_eq!(value["odata.error"]["message"]["lang"], "en-US");
    }

    #[test]
    fn test_xml_fault_escapes_message() {
        let fault = ODataFault::internal_error("a < b");
        let (body, content_type) = fault.render(ProtocolVersion::V4, ContentFormat::Xml).unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert_eq!(content_type, "application/xml");
        assert!(text.starts_with("<?xml"));
        assert!(text.contains("<m:error xmlns:m=\"http://docs.oasis-open.org/odata/ns/metadata\">"));
        assert!(text.contains("<m:code>500</m:code>"));
        assert!(text.contains("a &lt; b"));
    }

    #[test]
    fn test_from_error_status() {
        let err = Error::EntitySetNotFound { set: "Orders".into() };
        assert_eq!(ODataFault::from_error(&err).status, StatusCode::NOT_FOUND);

        let err = Error::UnresolvedReference { reference: "$7".into() };
        assert_eq!(ODataFault::from_error(&err).status, StatusCode::BAD_REQUEST);

        let err = Error::UnsupportedMediaType { media_type: "text/csv".into() };
        assert_eq!(ODataFault::from_error(&err).status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
