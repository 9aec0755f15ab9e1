//! Content-ID back-references within one changeset.

use std::collections::HashMap;

/// Maps `$N` tokens to the `Location` of the changeset member with Content-ID `N`.
///
/// A table lives for exactly one changeset; a fresh one is created for each.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: HashMap<String, String>,
}

impl ReferenceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the location produced by the member with `content_id`.
    ///
    /// The id may be given with or without its leading `$`.
    pub fn put(&mut self, content_id: &str, location: impl Into<String>) {
        self.entries.insert(token(content_id), location.into());
    }

    /// Look up a reference such as `$1`.
    pub fn get(&self, reference: &str) -> Option<&str> {
        self.entries.get(&token(reference)).map(String::as_str)
    }

    /// Number of registered references.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no reference has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every known `$N` token in `text` with its location.
    ///
    /// A token is `$` followed by the longest run of ASCII digits, so `$12`
    /// is never rewritten through `$1`. Unknown tokens are left untouched.
    pub fn substitute(&self, text: &str) -> String {
        if self.entries.is_empty() || !text.contains('$') {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let digits = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            let candidate = &rest[pos..pos + 1 + digits];

            match self.entries.get(candidate) {
                Some(location) if digits > 0 => out.push_str(location),
                _ => out.push_str(candidate),
            }
            rest = &rest[pos + 1 + digits..];
        }
        out.push_str(rest);
        out
    }
}

fn token(content_id: &str) -> String {
    if content_id.starts_with('$') {
        content_id.to_string()
    } else {
        format!("${}", content_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ReferenceTable {
        let mut table = ReferenceTable::new();
        table.put("1", "http://host/V40/Products(-10)");
        table.put("$12", "http://host/V40/Customers(3)");
        table
    }

    #[test]
    fn test_put_get() {
        let table = table();
        assert_eq!(table.get("$1"), Some("http://host/V40/Products(-10)"));
        assert_eq!(table.get("12"), Some("http://host/V40/Customers(3)"));
        assert_eq!(table.get("$2"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_substitute_longest_token() {
        let text = r#"{"a":"$1/Orders","b":"$12","c":"$2","d":"$","e":"$$1"}"#;
        assert_eq!(
            table().substitute(text),
            r#"{"a":"http://host/V40/Products(-10)/Orders","b":"http://host/V40/Customers(3)","c":"$2","d":"$","e":"$http://host/V40/Products(-10)"}"#
        );
    }

    #[test]
    fn test_substitute_empty_table() {
        assert_eq!(ReferenceTable::new().substitute("$1"), "$1");
    }
}
