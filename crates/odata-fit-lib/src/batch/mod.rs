//! The `$batch` subsystem.
//!
//! A batch body is a `multipart/mixed` envelope of `application/http` parts and
//! nested changesets. [`BatchProcessor`] replays every embedded request through
//! a [`Dispatcher`] and frames the responses into one multipart response.

pub mod dispatch;
pub mod framer;
pub mod multipart;
pub mod processor;
pub mod references;
pub mod request;

pub use dispatch::{DispatchCredentials, Dispatcher, HttpDispatcher, InnerResponse};
pub use framer::{
    parse_batch_response, parse_response_part, serialize_http_response, BatchItemResponse,
    FramedResponse,
};
pub use multipart::{boundary_from_content_type, is_multipart_mixed, split_parts, BatchPart};
pub use processor::{BatchContext, BatchProcessor, BatchResponse, BatchSummary};
pub use references::ReferenceTable;
pub use request::{InnerRequest, RequestLine};

/// Boundary of every batch response.
pub const RESPONSE_BOUNDARY: &str = "batch_243234_25424_ef_892u748";

/// `Content-Type` of every batch response.
pub const BATCH_RESPONSE_CONTENT_TYPE: &str =
    "application/octet-stream; boundary=batch_243234_25424_ef_892u748";

/// `Prefer` token enabling continue-on-error.
pub const CONTINUE_ON_ERROR: &str = "odata.continue-on-error";
