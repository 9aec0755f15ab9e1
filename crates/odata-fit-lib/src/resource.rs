//! Resource path parsing for entity addressing.
//!
//! Supports the subset of OData URL conventions the fixture service serves:
//!
//! ```text
//! Products
//! Products/$count
//! Products(-10)
//! Products(-10)/Name
//! Products(-10)/Name/$value
//! Customers('ALFKI')
//! ```

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

/// Key predicate of an entity as written in a URL, e.g. `-10` or `'ALFKI'`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyLiteral(String);

impl KeyLiteral {
    /// Wrap a raw key literal.
    pub fn new(literal: impl Into<String>) -> Self {
        Self(literal.into())
    }

    /// Build the key literal for a JSON key value.
    ///
    /// Numbers are written as-is, strings are single-quoted with embedded
    /// quotes doubled. Other JSON values cannot be keys.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(Self(number.to_string())),
            Value::String(text) => Some(Self(format!("'{}'", text.replace('\'', "''")))),
            _ => None,
        }
    }

    /// The literal as it appears between parentheses.
    pub fn as_literal(&self) -> &str {
        &self.0
    }

    /// Directory name under which the entity is stored.
    ///
    /// String literals lose their quotes. Keys that could escape the fixture
    /// tree are rejected.
    pub fn storage_key(&self) -> Result<String> {
        let literal = self.0.trim();
        let key = match literal
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            Some(quoted) => quoted.replace("''", "'"),
            None => literal.to_string(),
        };

        if key.is_empty()
            || key == "."
            || key.contains("..")
            || key.contains(&['/', '\\', '\0'][..])
        {
            return Err(Error::InvalidKey { key: self.0.clone() });
        }

        Ok(key)
    }
}

impl fmt::Display for KeyLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parsed resource path relative to a version's service root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    /// Addressed entity set.
    pub entity_set: String,
    /// Key predicate, when a single entity is addressed.
    pub key: Option<KeyLiteral>,
    /// Property of the addressed entity.
    pub property: Option<String>,
    /// `$count` on a collection.
    pub count: bool,
    /// `$value` on a property.
    pub raw_value: bool,
}

impl ResourcePath {
    /// Parse a path such as `Products(-10)/Name`. Leading slashes and a query
    /// string are ignored.
    pub fn parse(path: &str) -> Result<Self> {
        let malformed = || Error::MalformedPath {
            path: path.to_string(),
        };

        let path_only = path.split('?').next().unwrap_or_default();
        let mut segments = path_only
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty());

        let head = segments.next().ok_or_else(malformed)?;
        let (entity_set, key) = match head.find('(') {
            Some(open) => {
                let literal = head[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
                if literal.trim().is_empty() {
                    return Err(malformed());
                }
                (&head[..open], Some(KeyLiteral::new(literal.trim())))
            }
            None => (head, None),
        };

        if !is_identifier(entity_set) {
            return Err(malformed());
        }

        let mut resource = Self {
            entity_set: entity_set.to_string(),
            key,
            property: None,
            count: false,
            raw_value: false,
        };

        match segments.next() {
            None => {}
            Some("$count") if resource.key.is_none() => resource.count = true,
            Some(property) if resource.key.is_some() && is_identifier(property) => {
                resource.property = Some(property.to_string());
                match segments.next() {
                    None => {}
                    Some("$value") => resource.raw_value = true,
                    Some(_) => return Err(malformed()),
                }
            }
            Some(_) => return Err(malformed()),
        }

        if segments.next().is_some() {
            return Err(malformed());
        }

        Ok(resource)
    }

    /// Canonical single-entity path, `Set(key)`, used for `Location` headers.
    pub fn canonical_entity(entity_set: &str, key: &KeyLiteral) -> String {
        format!("{}({})", entity_set, key.as_literal())
    }
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection() {
        let path = ResourcePath::parse("/Products").unwrap();
        assert_eq!(path.entity_set, "Products");
        assert!(path.key.is_none());
        assert!(!path.count);
    }

    #[test]
    fn test_parse_count() {
        let path = ResourcePath::parse("Products/$count").unwrap();
        assert!(path.count);
    }

    #[test]
    fn test_parse_entity_property_value() {
        let path = ResourcePath::parse("Products(-10)/Name/$value").unwrap();
        assert_eq!(path.key, Some(KeyLiteral::new("-10")));
        assert_eq!(path.property.as_deref(), Some("Name"));
        assert!(path.raw_value);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ResourcePath::parse("").is_err());
        assert!(ResourcePath::parse("Products(").is_err());
        assert!(ResourcePath::parse("Products()").is_err());
        assert!(ResourcePath::parse("Products(1)/$count").is_err());
        assert!(ResourcePath::parse("Products/Name").is_err());
        assert!(ResourcePath::parse("Products(1)/Name/Other").is_err());
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(KeyLiteral::new("-10").storage_key().unwrap(), "-10");
        assert_eq!(KeyLiteral::new("'O''Neil'").storage_key().unwrap(), "O'Neil");
        assert!(KeyLiteral::new("'../etc'").storage_key().is_err());
        assert!(KeyLiteral::new("a/b").storage_key().is_err());
    }

    #[test]
    fn test_key_from_json() {
        let key = KeyLiteral::from_json(&serde_json::json!(-10)).unwrap();
        assert_eq!(key.as_literal(), "-10");
        let key = KeyLiteral::from_json(&serde_json::json!("O'Neil")).unwrap();
        assert_eq!(key.as_literal(), "'O''Neil'");
        assert!(KeyLiteral::from_json(&serde_json::json!(true)).is_none());
    }

    #[test]
    fn test_canonical_entity() {
        let key = KeyLiteral::new("'ALFKI'");
        assert_eq!(ResourcePath::canonical_entity("Customers", &key), "Customers('ALFKI')");
    }
}
