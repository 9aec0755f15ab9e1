//! odata-fit library entry points.
//!
//! This crate holds everything the fixture service needs that is independent
//! of the HTTP framework: protocol version tables, content negotiation, the
//! on-disk fixture store, resource path parsing, OData faults, and the `$batch`
//! processor. The service crates only wire these into axum.
//!

#![deny(warnings)]

pub mod batch;
pub mod entity;
pub mod error;
pub mod fault;
pub mod format;
pub mod resource;
pub mod store;
pub mod version;

pub use batch::{
    BatchContext, BatchProcessor, BatchResponse, BatchSummary, DispatchCredentials, Dispatcher,
    HttpDispatcher, InnerRequest, InnerResponse, BATCH_RESPONSE_CONTENT_TYPE, RESPONSE_BOUNDARY,
};
pub use entity::{CreatedEntity, EntityService};
pub use error::{Error, Result};
pub use fault::ODataFault;
pub use format::ContentFormat;
pub use resource::{KeyLiteral, ResourcePath};
pub use store::FixtureStore;
pub use version::ProtocolVersion;
