//! Request inspection helpers: preferences, format negotiation, verb
//! tunneling and batch envelope validation.

use axum::http::{header, HeaderMap, Method};
use odata_fit_lib::batch::{boundary_from_content_type, is_multipart_mixed, request::X_HTTP_METHOD};
use odata_fit_lib::{ContentFormat, ODataFault};

/// Name of the `Prefer` request header.
pub const PREFER: &str = "prefer";

/// Name of the `Preference-Applied` response header.
pub const PREFERENCE_APPLIED: &str = "preference-applied";

/// `Prefer` token asking for asynchronous processing.
pub const RESPOND_ASYNC: &str = "respond-async";

/// Client preferences from the `Prefer` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preferences {
    /// `odata.continue-on-error`
    pub continue_on_error: bool,
    /// `respond-async`
    pub respond_async: bool,
    /// `return-no-content` (v3) or `return=minimal` (v4)
    pub return_no_content: bool,
}

impl Preferences {
    /// Collect preferences from every `Prefer` header value.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get_all(PREFER)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(Self::parse)
            .fold(Self::default(), |acc, next| Self {
                continue_on_error: acc.continue_on_error || next.continue_on_error,
                respond_async: acc.respond_async || next.respond_async,
                return_no_content: acc.return_no_content || next.return_no_content,
            })
    }

    /// Parse one `Prefer` header value.
    pub fn parse(value: &str) -> Self {
        let mut preferences = Self {
            continue_on_error: odata_fit_lib::BatchContext::continue_on_error_from(Some(value)),
            ..Self::default()
        };
        for token in value.split(',').map(|token| token.trim().to_ascii_lowercase()) {
            let token = token.replace(' ', "");
            match token.as_str() {
                RESPOND_ASYNC => preferences.respond_async = true,
                "return-no-content" | "return=minimal" => preferences.return_no_content = true,
                _ => {}
            }
        }
        preferences
    }
}

/// Value of one query option in a raw query string.
///
/// `$` may be written literally or percent-encoded as `%24`.
pub fn query_option<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    let bare = name.trim_start_matches('$');
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key_bare = key
            .strip_prefix('$')
            .or_else(|| key.strip_prefix("%24"))
            .unwrap_or(key);
        (key_bare == bare && key != bare).then_some(value)
    })
}

/// Negotiate the response format from `$format` and `Accept`.
pub fn negotiate_format(query: Option<&str>, headers: &HeaderMap) -> ContentFormat {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());
    ContentFormat::negotiate(query_option(query, "$format"), accept)
}

/// Format of the request body, from its `Content-Type`. Defaults to JSON.
pub fn body_format(headers: &HeaderMap) -> ContentFormat {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(ContentFormat::from_media_type)
        .unwrap_or_default()
}

/// The verb a request acts as.
///
/// A `POST` carrying `X-HTTP-Method: PATCH|MERGE|PUT|DELETE` is treated as
/// that verb; everything else is taken at face value.
pub fn effective_method(method: &Method, headers: &HeaderMap) -> Method {
    if *method != Method::POST {
        return method.clone();
    }
    let tunneled = headers
        .get(X_HTTP_METHOD)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_uppercase());

    match tunneled.as_deref() {
        Some("PATCH") => Method::PATCH,
        Some("PUT") => Method::PUT,
        Some("DELETE") => Method::DELETE,
        Some("MERGE") => Method::from_bytes(b"MERGE").unwrap_or(Method::PATCH),
        _ => Method::POST,
    }
}

/// Boundary of a `$batch` request body.
///
/// Anything other than `multipart/mixed` with a boundary parameter is
/// rejected with 415.
pub fn batch_boundary(headers: &HeaderMap) -> Result<String, ODataFault> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !is_multipart_mixed(content_type) {
        return Err(ODataFault::unsupported_media_type(format!(
            "$batch requires multipart/mixed, got {:?}",
            content_type
        )));
    }
    boundary_from_content_type(content_type).ok_or_else(|| {
        ODataFault::unsupported_media_type("multipart/mixed content type without boundary")
    })
}
