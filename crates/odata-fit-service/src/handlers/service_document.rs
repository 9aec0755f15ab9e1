//! `GET /{version}` service document listing the entity sets.

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use odata_fit_lib::{ContentFormat, ProtocolVersion};
use odata_fit_service_shared::{from_lib_error, negotiate_format, AppState, ODataResponse};
use serde_json::{json, Map, Value};

use super::resolve_version;

const APP_NAMESPACE: &str = "http://www.w3.org/2007/app";
const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

pub async fn service_document(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let version = match resolve_version(&prefix) {
        Ok(version) => version,
        Err(fault) => return fault.into_response(),
    };
    let format = negotiate_format(query.as_deref(), &headers);

    let sets = match state.store().entity_sets(version) {
        Ok(sets) => sets,
        Err(e) => return from_lib_error(&e, version, format).into_response(),
    };
    let root = state.service_root(version).as_str();

    let body = match format {
        ContentFormat::Json => json_document(version, root, &sets),
        ContentFormat::Xml => xml_document(root, &sets),
    };
    ODataResponse::new(StatusCode::OK, version)
        .with_body(format.media_type(), body)
        .into_response()
}

fn json_document(version: ProtocolVersion, root: &str, sets: &[String]) -> Vec<u8> {
    let value = sets
        .iter()
        .map(|set| match version {
            ProtocolVersion::V3 => json!({ "name": set, "url": set }),
            ProtocolVersion::V4 => json!({ "name": set, "kind": "EntitySet", "url": set }),
        })
        .collect::<Vec<_>>();

    let mut document = Map::new();
    document.insert(
        version.metadata_annotation().to_string(),
        Value::String(format!("{}$metadata", root)),
    );
    document.insert("value".to_string(), Value::Array(value));
    Value::Object(document).to_string().into_bytes()
}

fn xml_document(root: &str, sets: &[String]) -> Vec<u8> {
    let collections: String = sets
        .iter()
        .map(|set| {
            format!(
                "<collection href=\"{0}\"><atom:title>{0}</atom:title></collection>",
                set
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><service xmlns=\"{}\" xmlns:atom=\"{}\" xml:base=\"{}\"><workspace><atom:title>Default</atom:title>{}</workspace></service>",
        APP_NAMESPACE, ATOM_NAMESPACE, root, collections
    )
    .into_bytes()
}
