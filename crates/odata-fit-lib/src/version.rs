//! OData protocol versions served by the fixture service.
//!
//! Both versions share one implementation. Everything that differs between
//! them (URL prefix, version header, JSON annotations, fault envelopes) is
//! looked up from a static table keyed by [`ProtocolVersion`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// OData protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// OData 3.0 (JSON light / Atom).
    V3,
    /// OData 4.0.
    V4,
}

struct VersionTraits {
    prefix: &'static str,
    header_name: &'static str,
    header_value: &'static str,
    metadata_annotation: &'static str,
    metadata_namespace: &'static str,
    fault_envelope: &'static str,
}

const TRAITS: [VersionTraits; 2] = [
    VersionTraits {
        prefix: "V30",
        header_name: "DataServiceVersion",
        header_value: "3.0",
        metadata_annotation: "odata.metadata",
        metadata_namespace: "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata",
        fault_envelope: "odata.error",
    },
    VersionTraits {
        prefix: "V40",
        header_name: "OData-Version",
        header_value: "4.0",
        metadata_annotation: "@odata.context",
        metadata_namespace: "http://docs.oasis-open.org/odata/ns/metadata",
        fault_envelope: "error",
    },
];

impl ProtocolVersion {
    /// Every supported version, oldest first.
    pub const ALL: [ProtocolVersion; 2] = [ProtocolVersion::V3, ProtocolVersion::V4];

    fn traits(self) -> &'static VersionTraits {
        match self {
            ProtocolVersion::V3 => &TRAITS[0],
            ProtocolVersion::V4 => &TRAITS[1],
        }
    }

    /// URL path prefix under which this version is served (e.g. `V40`).
    pub fn prefix(self) -> &'static str {
        self.traits().prefix
    }

    /// Resolve a version from its URL prefix. Matching is case-insensitive.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|version| version.prefix().eq_ignore_ascii_case(prefix))
    }

    /// Name of the response header announcing the protocol version.
    pub fn version_header(self) -> &'static str {
        self.traits().header_name
    }

    /// Value of the version header.
    pub fn version_value(self) -> &'static str {
        self.traits().header_value
    }

    /// JSON key carrying the metadata URL of a payload.
    pub fn metadata_annotation(self) -> &'static str {
        self.traits().metadata_annotation
    }

    /// XML namespace of the `m:` metadata prefix.
    pub fn metadata_namespace(self) -> &'static str {
        self.traits().metadata_namespace
    }

    /// Top-level JSON member wrapping an error payload.
    pub fn fault_envelope(self) -> &'static str {
        self.traits().fault_envelope
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_prefix() {
        assert_eq!(ProtocolVersion::from_prefix("V30"), Some(ProtocolVersion::V3));
        assert_eq!(ProtocolVersion::from_prefix("v40"), Some(ProtocolVersion::V4));
        assert_eq!(ProtocolVersion::from_prefix("V20"), None);
    }

    #[test]
    fn test_version_tables() {
        assert_eq!(ProtocolVersion::V3.version_header(), "DataServiceVersion");
        assert_eq!(ProtocolVersion::V4.version_header(), "OData-Version");
        assert_eq!(ProtocolVersion::V4.metadata_annotation(), "@odata.context");
        assert_eq!(ProtocolVersion::V3.fault_envelope(), "odata.error");
        assert_eq!(ProtocolVersion::V4.to_string(), "4.0");
    }
}
