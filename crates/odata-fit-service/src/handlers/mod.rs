//! HTTP handlers, one module per endpoint family.

mod batch;
mod entity;
mod monitor;
mod service_document;

pub use batch::batch_handler;
pub use entity::entity_handler;
pub use monitor::{async_monitor, respond_async};
pub use service_document::service_document;

use odata_fit_lib::{ContentFormat, ODataFault, ProtocolVersion};
use odata_fit_service_shared::FaultResponse;

/// Resolve the `{version}` path segment.
///
/// Unknown prefixes are answered with a 404 in the newest envelope.
pub(crate) fn resolve_version(prefix: &str) -> Result<ProtocolVersion, FaultResponse> {
    ProtocolVersion::from_prefix(prefix).ok_or_else(|| {
        FaultResponse::new(
            ODataFault::not_found(format!("no service root at /{}", prefix)),
            ProtocolVersion::V4,
            ContentFormat::Json,
        )
    })
}
