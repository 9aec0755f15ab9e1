//! Entity operations on top of the fixture store.
//!
//! Entity payloads are treated as opaque documents. JSON entities are parsed
//! only where an operation needs to look inside them (key extraction, property
//! reads, merges); XML entities are stored and returned byte for byte.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::format::ContentFormat;
use crate::resource::{KeyLiteral, ResourcePath};
use crate::store::FixtureStore;
use crate::version::ProtocolVersion;

const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
const KEY_PROPERTIES: [&str; 2] = ["Id", "ID"];

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct CreatedEntity {
    /// Key literal of the new entity.
    pub key: KeyLiteral,
    /// Stored payload.
    pub body: Vec<u8>,
}

/// Entity operations for one protocol version.
#[derive(Debug, Clone, Copy)]
pub struct EntityService<'a> {
    store: &'a FixtureStore,
    version: ProtocolVersion,
}

impl<'a> EntityService<'a> {
    pub fn new(store: &'a FixtureStore, version: ProtocolVersion) -> Self {
        Self { store, version }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Read one entity in `format`.
    pub fn read_entity(
        &self,
        set: &str,
        key: &KeyLiteral,
        format: ContentFormat,
    ) -> Result<Vec<u8>> {
        self.store
            .read(self.version, set, &key.storage_key()?, format)
    }

    /// Read a whole entity set as a collection payload.
    ///
    /// JSON collections are wrapped in `{"<metadata>": ..., "value": [...]}`,
    /// XML collections in an Atom `feed` element.
    pub fn read_collection(
        &self,
        set: &str,
        format: ContentFormat,
        service_root: &str,
    ) -> Result<Vec<u8>> {
        let entities = self.store.list(self.version, set, format)?;
        match format {
            ContentFormat::Json => {
                let values = entities
                    .iter()
                    .map(|bytes| serde_json::from_slice::<Value>(bytes))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let mut document = Map::new();
                document.insert(
                    self.version.metadata_annotation().to_string(),
                    Value::String(metadata_url(service_root, set)),
                );
                document.insert("value".to_string(), Value::Array(values));
                Ok(serde_json::to_vec(&Value::Object(document))?)
            }
            ContentFormat::Xml => {
                let mut feed = format!(
                    "<?xml version=\"1.0\" encoding=\"utf-8\"?><feed xmlns=\"{}\">",
                    ATOM_NAMESPACE
                );
                for entity in &entities {
                    feed.push_str(strip_xml_declaration(&String::from_utf8_lossy(entity)).trim());
                }
                feed.push_str("</feed>");
                Ok(feed.into_bytes())
            }
        }
    }

    /// Read a single property of a JSON entity.
    ///
    /// With `raw` the bare value is returned as `text/plain`, otherwise a
    /// JSON document `{"<metadata>": ..., "value": <value>}`.
    pub fn read_property(
        &self,
        set: &str,
        key: &KeyLiteral,
        property: &str,
        raw: bool,
        service_root: &str,
    ) -> Result<(Vec<u8>, &'static str)> {
        let entity = self.read_json(set, key)?;
        let value = entity
            .get(property)
            .cloned()
            .ok_or_else(|| Error::PropertyNotFound {
                set: set.to_string(),
                key: key.to_string(),
                property: property.to_string(),
            })?;

        if raw {
            let text = match value {
                Value::String(text) => text,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            return Ok((text.into_bytes(), "text/plain"));
        }

        let context = format!(
            "{}/{}",
            metadata_url(service_root, &ResourcePath::canonical_entity(set, key)),
            property
        );
        let mut document = Map::new();
        document.insert(
            self.version.metadata_annotation().to_string(),
            Value::String(context),
        );
        document.insert("value".to_string(), value);
        Ok((
            serde_json::to_vec(&Value::Object(document))?,
            ContentFormat::Json.media_type(),
        ))
    }

    /// Number of entities in a set.
    pub fn count(&self, set: &str) -> Result<usize> {
        Ok(self.store.keys(self.version, set)?.len())
    }

    /// Create an entity.
    ///
    /// The key of a JSON entity comes from its `Id`/`ID` property; when absent
    /// the next numeric key is assigned and written back as `Id`. XML entities
    /// always get the next numeric key.
    pub fn create(&self, set: &str, format: ContentFormat, body: &[u8]) -> Result<CreatedEntity> {
        if !self.store.has_entity_set(self.version, set) {
            return Err(Error::EntitySetNotFound {
                set: set.to_string(),
            });
        }

        let (key, body) = match format {
            ContentFormat::Json => {
                let mut entity = parse_object(body)?;
                let existing = KEY_PROPERTIES
                    .iter()
                    .find_map(|name| entity.get(*name).and_then(KeyLiteral::from_json));
                let key = match existing {
                    Some(key) => key,
                    None => {
                        let next = self.store.next_key(self.version, set)?;
                        entity.insert("Id".to_string(), Value::from(next));
                        KeyLiteral::new(next.to_string())
                    }
                };
                (key, serde_json::to_vec(&Value::Object(entity))?)
            }
            ContentFormat::Xml => {
                let next = self.store.next_key(self.version, set)?;
                (KeyLiteral::new(next.to_string()), body.to_vec())
            }
        };

        let storage_key = key.storage_key()?;
        if self.store.exists(self.version, set, &storage_key)? {
            return Err(Error::EntityExists {
                set: set.to_string(),
                key: key.to_string(),
            });
        }

        self.store
            .write(self.version, set, &storage_key, format, &body)?;
        tracing::debug!(set, key = %key, "entity created");
        Ok(CreatedEntity { key, body })
    }

    /// Replace an existing entity.
    pub fn replace(
        &self,
        set: &str,
        key: &KeyLiteral,
        format: ContentFormat,
        body: &[u8],
    ) -> Result<()> {
        let storage_key = self.existing_key(set, key)?;
        let body = match format {
            ContentFormat::Json => serde_json::to_vec(&Value::Object(parse_object(body)?))?,
            ContentFormat::Xml => body.to_vec(),
        };
        self.store
            .write(self.version, set, &storage_key, format, &body)
    }

    /// Shallow-merge a JSON object into an existing JSON entity.
    pub fn merge(
        &self,
        set: &str,
        key: &KeyLiteral,
        format: ContentFormat,
        body: &[u8],
    ) -> Result<()> {
        if format != ContentFormat::Json {
            return Err(Error::UnsupportedMediaType {
                media_type: format.media_type().to_string(),
            });
        }
        let storage_key = self.existing_key(set, key)?;
        let patch = parse_object(body)?;
        let mut entity = self.read_json(set, key)?;
        entity.extend(patch);

        self.store.write(
            self.version,
            set,
            &storage_key,
            ContentFormat::Json,
            &serde_json::to_vec(&Value::Object(entity))?,
        )
    }

    /// Delete an entity in every format.
    pub fn delete(&self, set: &str, key: &KeyLiteral) -> Result<()> {
        self.store.delete(self.version, set, &key.storage_key()?)
    }

    fn existing_key(&self, set: &str, key: &KeyLiteral) -> Result<String> {
        let storage_key = key.storage_key()?;
        if !self.store.exists(self.version, set, &storage_key)? {
            return Err(Error::EntityNotFound {
                set: set.to_string(),
                key: key.to_string(),
            });
        }
        Ok(storage_key)
    }

    fn read_json(&self, set: &str, key: &KeyLiteral) -> Result<Map<String, Value>> {
        parse_object(&self.read_entity(set, key, ContentFormat::Json)?)
    }
}

fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::NotAnObject),
    }
}

fn metadata_url(service_root: &str, fragment: &str) -> String {
    format!("{}$metadata#{}", service_root, fragment)
}

fn strip_xml_declaration(document: &str) -> &str {
    let trimmed = document.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ROOT: &str = "http://localhost:8080/V40/";

    fn seeded() -> (TempDir, FixtureStore) {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path());
        let v4 = ProtocolVersion::V4;
        store.create_entity_set(v4, "Products").unwrap();
        store.create_entity_set(v4, "Customers").unwrap();
        store
            .write(v4, "Products", "-10", ContentFormat::Json, br#"{"Id":-10,"Name":"Widget","Description":"old"}"#)
            .unwrap();
        store
            .write(v4, "Products", "-9", ContentFormat::Json, br#"{"Id":-9,"Name":"Gadget"}"#)
            .unwrap();
        store
            .write(v4, "Products", "-10", ContentFormat::Xml, b"<?xml version=\"1.0\"?><entry><id>-10</id></entry>")
            .unwrap();
        (dir, store)
    }

    fn service(store: &FixtureStore) -> EntityService<'_> {
        EntityService::new(store, ProtocolVersion::V4)
    }

    #[test]
    fn test_read_collection_json() {
        let (_dir, store) = seeded();
        let bytes = service(&store)
            .read_collection("Products", ContentFormat::Json, ROOT)
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["@odata.context"], "http://localhost:8080/V40/$metadata#Products");
        assert_eq!(value["value"].as_array().unwrap().len(), 2);
        assert_eq!(value["value"][0]["Id"], -10);
    }

    #[test]
    fn test_read_collection_xml() {
        let (_dir, store) = seeded();
        let bytes = service(&store)
            .read_collection("Products", ContentFormat::Xml, ROOT)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.contains("<feed xmlns=\"http://www.w3.org/2005/Atom\"><entry><id>-10</id></entry></feed>"));
        assert_eq!(text.matches("<?xml").count(), 1);
    }

    #[test]
    fn test_read_property() {
        let (_dir, store) = seeded();
        let key = KeyLiteral::new("-10");

        let (bytes, content_type) = service(&store)
            .read_property("Products", &key, "Name", false, ROOT)
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(content_type, "application/json");
        assert_eq!(value["value"], "Widget");
        assert_eq!(
            value["@odata.context"],
            "http://localhost:8080/V40/$metadata#Products(-10)/Name"
        );

        let (raw, content_type) = service(&store)
            .read_property("Products", &key, "Id", true, ROOT)
            .unwrap();
        assert_eq!(content_type, "text/plain");
        assert_eq!(raw, b"-10");

        let err = service(&store)
            .read_property("Products", &key, "Missing", false, ROOT)
            .unwrap_err();
        assert!(matches!(err, Error::PropertyNotFound { .. }));
    }

    #[test]
    fn test_create_with_and_without_key() {
        let (_dir, store) = seeded();
        let svc = service(&store);

        let created = svc
            .create("Products", ContentFormat::Json, br#"{"Id":7,"Name":"New"}"#)
            .unwrap();
        assert_eq!(created.key.as_literal(), "7");

        let created = svc
            .create("Products", ContentFormat::Json, br#"{"Name":"Keyless"}"#)
            .unwrap();
        assert_eq!(created.key.as_literal(), "8");
        let stored: Value = serde_json::from_slice(&created.body).unwrap();
        assert_eq!(stored["Id"], 8);

        let created = svc
            .create("Customers", ContentFormat::Json, br#"{"ID":"ALFKI"}"#)
            .unwrap();
        assert_eq!(created.key.as_literal(), "'ALFKI'");
        assert!(store.exists(ProtocolVersion::V4, "Customers", "ALFKI").unwrap());
    }

    #[test]
    fn test_create_errors() {
        let (_dir, store) = seeded();
        let svc = service(&store);

        let err = svc.create("Orders", ContentFormat::Json, b"{}").unwrap_err();
        assert!(matches!(err, Error::EntitySetNotFound { .. }));

        let err = svc
            .create("Products", ContentFormat::Json, br#"{"Id":-10}"#)
            .unwrap_err();
        assert!(matches!(err, Error::EntityExists { .. }));

        let err = svc.create("Products", ContentFormat::Json, b"[1]").unwrap_err();
        assert!(matches!(err, Error::NotAnObject));
    }

    #[test]
    fn test_merge_and_replace() {
        let (_dir, store) = seeded();
        let svc = service(&store);
        let key = KeyLiteral::new("-10");

        svc.merge("Products", &key, ContentFormat::Json, br#"{"Description":"x"}"#)
            .unwrap();
        let value: Value =
            serde_json::from_slice(&svc.read_entity("Products", &key, ContentFormat::Json).unwrap()).unwrap();
        assert_eq!(value["Description"], "x");
        assert_eq!(value["Name"], "Widget");

        svc.replace("Products", &key, ContentFormat::Json, br#"{"Id":-10}"#)
            .unwrap();
        let value: Value =
            serde_json::from_slice(&svc.read_entity("Products", &key, ContentFormat::Json).unwrap()).unwrap();
        assert!(value.get("Name").is_none());

        let err = svc
            .merge("Products", &KeyLiteral::new("99"), ContentFormat::Json, b"{}")
            .unwrap_err();
        assert!(matches!(err, Error::EntityNotFound { .. }));

        let err = svc
            .merge("Products", &key, ContentFormat::Xml, b"<entry/>")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_delete_and_count() {
        let (_dir, store) = seeded();
        let svc = service(&store);

        assert_eq!(svc.count("Products").unwrap(), 2);
        svc.delete("Products", &KeyLiteral::new("-9")).unwrap();
        assert_eq!(svc.count("Products").unwrap(), 1);

        let err = svc.delete("Products", &KeyLiteral::new("-9")).unwrap_err();
        assert!(matches!(err, Error::EntityNotFound { .. }));
    }
}
