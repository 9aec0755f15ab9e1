//! Entity operations below a version root.
//!
//! ```text
//! GET    /V40/Products                 collection
//! GET    /V40/Products/$count          count
//! GET    /V40/Products(-10)            entity
//! GET    /V40/Products(-10)/Name       property (/$value for the raw value)
//! POST   /V40/Products                 create
//! PUT    /V40/Products(-10)            replace
//! PATCH  /V40/Products(-10)            merge (MERGE on V30)
//! DELETE /V40/Products(-10)            delete
//! ```

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use odata_fit_lib::{
    ContentFormat, Error as LibError, KeyLiteral, ODataFault, ProtocolVersion, ResourcePath,
};
use odata_fit_service_shared::request::PREFERENCE_APPLIED;
use odata_fit_service_shared::{
    body_format, effective_method, from_lib_error, negotiate_format, record_entity_operation,
    AppState, FaultResponse, ODataResponse, Preferences,
};
use url::Url;

use super::{resolve_version, respond_async};

/// Everything an entity operation needs from the HTTP request.
struct EntityRequest<'a> {
    version: ProtocolVersion,
    method: Method,
    /// Negotiated response format.
    format: ContentFormat,
    /// Format of the request body.
    body_format: ContentFormat,
    preferences: Preferences,
    body: &'a [u8],
}

impl EntityRequest<'_> {
    fn fault(&self, error: LibError) -> FaultResponse {
        from_lib_error(&error, self.version, self.format)
    }
}

/// Dispatch one entity request. With `Prefer: respond-async` the outcome is
/// parked for the async monitor instead of being returned.
pub async fn entity_handler(
    State(state): State<AppState>,
    Path((prefix, path)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let version = match resolve_version(&prefix) {
        Ok(version) => version,
        Err(fault) => return fault.into_response(),
    };

    let request = EntityRequest {
        version,
        method: effective_method(&method, &headers),
        format: negotiate_format(query.as_deref(), &headers),
        body_format: body_format(&headers),
        preferences: Preferences::from_headers(&headers),
        body: &body,
    };

    let outcome = execute(&state, &path, &request);
    let status = match &outcome {
        Ok(response) => response.status,
        Err(fault) => fault.fault.status,
    };
    record_entity_operation(operation_name(&request.method), version, status.as_u16());
    tracing::debug!(
        method = %request.method,
        path = %path,
        status = status.as_u16(),
        "entity request handled"
    );

    if request.preferences.respond_async {
        return respond_async(&state, version, outcome);
    }
    match outcome {
        Ok(response) => response.into_response(),
        Err(fault) => fault.into_response(),
    }
}

fn execute(
    state: &AppState,
    path: &str,
    request: &EntityRequest<'_>,
) -> Result<ODataResponse, FaultResponse> {
    let resource = ResourcePath::parse(path).map_err(|e| request.fault(e))?;
    let entities = state.entities(request.version);
    let root = state.service_root(request.version);
    let set = resource.entity_set.as_str();
    let version = request.version;
    let writable = resource.property.is_none();

    match (request.method.as_str(), &resource.key) {
        ("GET", None) if resource.count => {
            let count = entities.count(set).map_err(|e| request.fault(e))?;
            Ok(ODataResponse::new(StatusCode::OK, version).with_body("text/plain", count.to_string()))
        }
        ("GET", None) => {
            let body = entities
                .read_collection(set, request.format, root.as_str())
                .map_err(|e| request.fault(e))?;
            Ok(ODataResponse::new(StatusCode::OK, version)
                .with_body(request.format.media_type(), body))
        }
        ("GET", Some(key)) => match &resource.property {
            Some(property) => {
                let (body, content_type) = entities
                    .read_property(set, key, property, resource.raw_value, root.as_str())
                    .map_err(|e| request.fault(e))?;
                Ok(ODataResponse::new(StatusCode::OK, version).with_body(content_type, body))
            }
            None => {
                let body = entities
                    .read_entity(set, key, request.format)
                    .map_err(|e| request.fault(e))?;
                Ok(ODataResponse::new(StatusCode::OK, version)
                    .with_body(request.format.media_type(), body))
            }
        },
        ("POST", None) if !resource.count => create(state, request, root, set),
        ("PUT", Some(key)) if writable => {
            entities
                .replace(set, key, request.body_format, request.body)
                .map_err(|e| request.fault(e))?;
            Ok(ODataResponse::no_content(version))
        }
        ("PATCH" | "MERGE", Some(key)) if writable => {
            entities
                .merge(set, key, request.body_format, request.body)
                .map_err(|e| request.fault(e))?;
            Ok(ODataResponse::no_content(version))
        }
        ("DELETE", Some(key)) if writable => {
            entities.delete(set, key).map_err(|e| request.fault(e))?;
            Ok(ODataResponse::no_content(version))
        }
        _ => Err(request.fault(LibError::MethodNotAllowed {
            method: request.method.to_string(),
            path: path.to_string(),
        })),
    }
}

/// Create an entity: 201 with the stored entity, or 204 when the client
/// prefers no content. Both carry the new entity's `Location`.
fn create(
    state: &AppState,
    request: &EntityRequest<'_>,
    root: &Url,
    set: &str,
) -> Result<ODataResponse, FaultResponse> {
    let created = state
        .entities(request.version)
        .create(set, request.body_format, request.body)
        .map_err(|e| request.fault(e))?;
    let location = location(root, set, &created.key).map_err(|e| {
        FaultResponse::new(
            ODataFault::internal_error(e.to_string()),
            request.version,
            request.format,
        )
    })?;
    tracing::info!(set, key = %created.key, "entity created");

    if request.preferences.return_no_content {
        return Ok(ODataResponse::no_content(request.version)
            .with_header(header::LOCATION, location)
            .with_header(
                HeaderName::from_static(PREFERENCE_APPLIED),
                HeaderValue::from_static(no_content_preference(request.version)),
            ));
    }

    Ok(ODataResponse::new(StatusCode::CREATED, request.version)
        .with_header(header::LOCATION, location)
        .with_body(request.body_format.media_type(), created.body))
}

fn location(root: &Url, set: &str, key: &KeyLiteral) -> Result<HeaderValue, LibError> {
    let target = ResourcePath::canonical_entity(set, key);
    let url = root.join(&target).map_err(|e| LibError::InvalidUrl {
        url: target.clone(),
        message: e.to_string(),
    })?;
    HeaderValue::from_str(url.as_str()).map_err(|e| LibError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// `Preference-Applied` value for a honoured no-content preference.
fn no_content_preference(version: ProtocolVersion) -> &'static str {
    match version {
        ProtocolVersion::V3 => "return-no-content",
        ProtocolVersion::V4 => "return=minimal",
    }
}

fn operation_name(method: &Method) -> &'static str {
    match method.as_str() {
        "GET" => "read",
        "POST" => "create",
        "PUT" => "replace",
        "PATCH" | "MERGE" => "merge",
        "DELETE" => "delete",
        _ => "other",
    }
}
