use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias for the odata-fit library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The fixture root directory does not exist.
    #[error("fixture root not found at {path}")]
    FixtureRootNotFound { path: PathBuf },

    /// Raised when a request targets an entity set with no fixture directory.
    #[error("entity set {set} not found")]
    EntitySetNotFound { set: String },

    /// Raised when no fixture exists for the requested key (and format).
    #[error("entity {set}({key}) not found")]
    EntityNotFound { set: String, key: String },

    /// Raised when creating an entity whose key is already taken.
    #[error("entity {set}({key}) already exists")]
    EntityExists { set: String, key: String },

    /// Raised when a stored entity lacks the requested property.
    #[error("property {property} not found on {set}({key})")]
    PropertyNotFound {
        set: String,
        key: String,
        property: String,
    },

    /// Key literals must not escape the fixture tree.
    #[error("invalid key literal: {key}")]
    InvalidKey { key: String },

    /// Raised when a resource path cannot be split into set, key and property.
    #[error("malformed resource path: {path}")]
    MalformedPath { path: String },

    /// Raised when a body or response format is not supported for the operation.
    #[error("unsupported media type: {media_type}")]
    UnsupportedMediaType { media_type: String },

    /// Raised when the HTTP method is not supported on the addressed resource.
    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    /// Raised when an entity payload is not a JSON object.
    #[error("entity payload must be a JSON object")]
    NotAnObject,

    /// Raised when the outer batch envelope cannot be split into parts.
    #[error("malformed batch body: {message}")]
    MalformedBatch { message: String },

    /// Raised when a batch part carries no recognizable request line.
    #[error("unrecognized batch request line: {line:?}")]
    UnparseableRequest { line: String },

    /// Raised when a `$N` reference has no entry in the changeset.
    #[error("unresolved content-ID reference {reference}")]
    UnresolvedReference { reference: String },

    /// Raised when a resolved request target is not a valid URL.
    #[error("invalid request url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// Raised when an inner batch request cannot be delivered.
    #[error("failed to dispatch {method} {url}: {source}")]
    Dispatch {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Raised when a fault body cannot be serialized.
    #[error("failed to serialize fault: {message}")]
    FaultSerialize { message: String },

    /// Wrapper for HTTP client construction errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
