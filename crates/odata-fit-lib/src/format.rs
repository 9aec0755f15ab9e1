//! Content format negotiation.

use serde::{Deserialize, Serialize};

/// Payload format of an entity, a collection or a fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// JSON (default).
    #[default]
    Json,
    /// XML / Atom.
    Xml,
}

impl ContentFormat {
    /// Fixture file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            ContentFormat::Json => "json",
            ContentFormat::Xml => "xml",
        }
    }

    /// Media type sent in `Content-Type`.
    pub fn media_type(self) -> &'static str {
        match self {
            ContentFormat::Json => "application/json",
            ContentFormat::Xml => "application/xml",
        }
    }

    /// Interpret a `$format` query option value.
    pub fn from_query_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "application/json" => Some(ContentFormat::Json),
            "xml" | "atom" | "application/xml" | "application/atom+xml" => Some(ContentFormat::Xml),
            _ => None,
        }
    }

    /// Interpret a media type such as a `Content-Type` value or one `Accept` range.
    ///
    /// Parameters are ignored. `*/*` and `application/*` map to JSON.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "*/*" | "application/*" => Some(ContentFormat::Json),
            e if e.ends_with("/json") || e.ends_with("+json") => Some(ContentFormat::Json),
            e if e.ends_with("/xml") || e.ends_with("+xml") => Some(ContentFormat::Xml),
            _ => None,
        }
    }

    /// Pick a response format: `$format` wins over `Accept`, JSON is the fallback.
    pub fn negotiate(format_option: Option<&str>, accept: Option<&str>) -> Self {
        if let Some(format) = format_option.and_then(Self::from_query_value) {
            return format;
        }

        accept
            .into_iter()
            .flat_map(|value| value.split(','))
            .find_map(Self::from_media_type)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_option_wins() {
        let format = ContentFormat::negotiate(Some("atom"), Some("application/json"));
        assert_eq!(format, ContentFormat::Xml);
    }

    #[test]
    fn test_accept_order() {
        let accept = "text/html, application/atom+xml;q=0.9, application/json";
        assert_eq!(ContentFormat::negotiate(None, Some(accept)), ContentFormat::Xml);
        assert_eq!(
            ContentFormat::negotiate(None, Some("application/json;odata.metadata=minimal")),
            ContentFormat::Json
        );
    }

    #[test]
    fn test_defaults_to_json() {
        assert_eq!(ContentFormat::negotiate(None, None), ContentFormat::Json);
        assert_eq!(ContentFormat::negotiate(Some("csv"), Some("text/plain")), ContentFormat::Json);
    }

    #[test]
    fn test_unknown_media_type() {
        assert_eq!(ContentFormat::from_media_type("text/plain"), None);
        assert_eq!(ContentFormat::from_media_type("application/xml; charset=utf-8"), Some(ContentFormat::Xml));
    }
}
