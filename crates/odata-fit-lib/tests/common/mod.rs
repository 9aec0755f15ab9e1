//! Shared helpers for batch integration tests.
//!
//! Provides an in-memory [`Dispatcher`] that records every request it sees and
//! answers from a closure, plus small builders for multipart batch bodies.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use http::header::{HeaderValue, LOCATION};
use http::StatusCode;
use odata_fit_lib::batch::{Dispatcher, InnerRequest, InnerResponse};
use odata_fit_lib::{Error, Result};

/// Boundary used by every request body built here.
pub const BOUNDARY: &str = "batch_test";

type Responder = Box<dyn Fn(&InnerRequest) -> Result<InnerResponse> + Send + Sync>;

/// Dispatcher answering from a closure.
pub struct ScriptedDispatcher {
    seen: Mutex<Vec<InnerRequest>>,
    responder: Responder,
}

#[allow(dead_code)]
impl ScriptedDispatcher {
    pub fn new(
        responder: impl Fn(&InnerRequest) -> Result<InnerResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Behaves like a fixture service: `POST` creates (201 + `Location`,
    /// keys counting up from -10), `GET` returns 200, other verbs 204, and any
    /// target under a `Missing` set is 404.
    pub fn fixtures() -> Self {
        let next_key = AtomicI64::new(-10);
        Self::new(move |request| {
            if request.url.path().contains("Missing") {
                return Ok(InnerResponse::new(StatusCode::NOT_FOUND));
            }
            match request.method.as_str() {
                "POST" => {
                    let key = next_key.fetch_add(1, Ordering::SeqCst);
                    let location = format!("{}({})", request.url, key);
                    let value = HeaderValue::from_str(&location).expect("valid location");
                    Ok(InnerResponse::new(StatusCode::CREATED).with_header(LOCATION, value))
                }
                "GET" => Ok(InnerResponse::new(StatusCode::OK).with_body("application/json", "{}")),
                _ => Ok(InnerResponse::new(StatusCode::NO_CONTENT)),
            }
        })
    }

    /// Every call fails at the transport level.
    pub fn unreachable() -> Self {
        Self::new(|_| {
            Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        })
    }

    /// Requests dispatched so far, in order.
    pub fn requests(&self) -> Vec<InnerRequest> {
        self.seen.lock().expect("request log").clone()
    }
}

impl Dispatcher for ScriptedDispatcher {
    fn dispatch(
        &self,
        request: &InnerRequest,
    ) -> impl Future<Output = Result<InnerResponse>> + Send {
        self.seen
            .lock()
            .expect("request log")
            .push(request.clone());
        let result = (self.responder)(request);
        async move { result }
    }
}

/// One `application/http` part carrying `request`.
#[allow(dead_code)]
pub fn request_part(boundary: &str, content_id: Option<&str>, request: &str) -> String {
    let mut part = format!(
        "--{}\r\nContent-Type: application/http\r\nContent-Transfer-Encoding: binary\r\n",
        boundary
    );
    if let Some(id) = content_id {
        part.push_str(&format!("Content-ID: {}\r\n", id));
    }
    part.push_str("\r\n");
    part.push_str(request);
    part.push_str("\r\n");
    part
}

/// A changeset part holding `members`, each built with [`request_part`]
/// against `changeset`.
#[allow(dead_code)]
pub fn changeset_part(changeset: &str, members: &[String]) -> String {
    format!(
        "--{}\r\nContent-Type: multipart/mixed; boundary={}\r\n\r\n{}--{}--\r\n",
        BOUNDARY,
        changeset,
        members.concat(),
        changeset
    )
}

/// A complete batch body under [`BOUNDARY`].
#[allow(dead_code)]
pub fn batch_body(parts: &[String]) -> String {
    format!("{}--{}--\r\n", parts.concat(), BOUNDARY)
}
