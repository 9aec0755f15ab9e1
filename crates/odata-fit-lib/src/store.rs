//! Filesystem-backed fixture store.
//!
//! Fixtures live under one tree per protocol version:
//!
//! ```text
//! <root>/V40/Products/-10/entity.json
//! <root>/V40/Products/-10/entity.xml
//! <root>/V30/Customers/ALFKI/entity.json
//! ```
//!
//! An entity set exists iff its directory exists. Writes go through a
//! temporary file in the target directory and are persisted atomically.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::format::ContentFormat;
use crate::version::ProtocolVersion;

const ENTITY_FILE_STEM: &str = "entity";

/// Fixture store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    /// Open a store, failing when the root directory does not exist.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::FixtureRootNotFound {
                path: root.to_path_buf(),
            });
        }
        Ok(Self::new(root))
    }

    /// Create a store without checking the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, version: ProtocolVersion) -> PathBuf {
        self.root.join(version.prefix())
    }

    fn set_dir(&self, version: ProtocolVersion, set: &str) -> Result<PathBuf> {
        validate_segment(set)?;
        Ok(self.version_dir(version).join(set))
    }

    fn existing_set_dir(&self, version: ProtocolVersion, set: &str) -> Result<PathBuf> {
        let dir = self.set_dir(version, set)?;
        if !dir.is_dir() {
            return Err(Error::EntitySetNotFound {
                set: set.to_string(),
            });
        }
        Ok(dir)
    }

    fn entity_file(dir: &Path, key: &str, format: ContentFormat) -> PathBuf {
        dir.join(key)
            .join(format!("{}.{}", ENTITY_FILE_STEM, format.extension()))
    }

    /// Names of all entity sets of a version, sorted.
    pub fn entity_sets(&self, version: ProtocolVersion) -> Result<Vec<String>> {
        let dir = self.version_dir(version);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut sets = subdirectory_names(&dir)?;
        sets.sort();
        Ok(sets)
    }

    /// Whether the entity set exists.
    pub fn has_entity_set(&self, version: ProtocolVersion, set: &str) -> bool {
        self.set_dir(version, set)
            .map(|dir| dir.is_dir())
            .unwrap_or(false)
    }

    /// Create an (empty) entity set directory.
    pub fn create_entity_set(&self, version: ProtocolVersion, set: &str) -> Result<()> {
        fs::create_dir_all(self.set_dir(version, set)?)?;
        Ok(())
    }

    /// Storage keys of all entities in a set, numeric keys in numeric order.
    pub fn keys(&self, version: ProtocolVersion, set: &str) -> Result<Vec<String>> {
        let dir = self.existing_set_dir(version, set)?;
        let mut keys = subdirectory_names(&dir)?;
        keys.sort_by(|a, b| match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        });
        Ok(keys)
    }

    /// Whether any fixture of any format exists for the entity.
    pub fn exists(&self, version: ProtocolVersion, set: &str, key: &str) -> Result<bool> {
        validate_segment(key)?;
        let dir = self.existing_set_dir(version, set)?;
        Ok(dir.join(key).is_dir())
    }

    /// Read the fixture of one entity in one format.
    pub fn read(
        &self,
        version: ProtocolVersion,
        set: &str,
        key: &str,
        format: ContentFormat,
    ) -> Result<Vec<u8>> {
        validate_segment(key)?;
        let dir = self.existing_set_dir(version, set)?;
        let path = Self::entity_file(&dir, key, format);
        if !path.is_file() {
            return Err(Error::EntityNotFound {
                set: set.to_string(),
                key: key.to_string(),
            });
        }
        Ok(fs::read(path)?)
    }

    /// Read every entity of a set that has a fixture in `format`, in key order.
    pub fn list(
        &self,
        version: ProtocolVersion,
        set: &str,
        format: ContentFormat,
    ) -> Result<Vec<Vec<u8>>> {
        let dir = self.existing_set_dir(version, set)?;
        let mut entities = Vec::new();
        for key in self.keys(version, set)? {
            let path = Self::entity_file(&dir, &key, format);
            if path.is_file() {
                entities.push(fs::read(path)?);
            }
        }
        Ok(entities)
    }

    /// Write (create or replace) the fixture of one entity in one format.
    pub fn write(
        &self,
        version: ProtocolVersion,
        set: &str,
        key: &str,
        format: ContentFormat,
        bytes: &[u8],
    ) -> Result<()> {
        validate_segment(key)?;
        let dir = self.existing_set_dir(version, set)?;
        let entity_dir = dir.join(key);
        fs::create_dir_all(&entity_dir)?;

        let mut tmp = NamedTempFile::new_in(&entity_dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(Self::entity_file(&dir, key, format))
            .map_err(|err| err.error)?;

        tracing::debug!(set, key, format = format.extension(), "fixture written");
        Ok(())
    }

    /// Delete an entity in every format.
    pub fn delete(&self, version: ProtocolVersion, set: &str, key: &str) -> Result<()> {
        validate_segment(key)?;
        let dir = self.existing_set_dir(version, set)?;
        let entity_dir = dir.join(key);
        if !entity_dir.is_dir() {
            return Err(Error::EntityNotFound {
                set: set.to_string(),
                key: key.to_string(),
            });
        }
        fs::remove_dir_all(entity_dir)?;
        tracing::debug!(set, key, "fixture deleted");
        Ok(())
    }

    /// Next free numeric key: one above the largest numeric key, or 1.
    pub fn next_key(&self, version: ProtocolVersion, set: &str) -> Result<i64> {
        let max = self
            .keys(version, set)?
            .iter()
            .filter_map(|key| key.parse::<i64>().ok())
            .max();
        Ok(max.map_or(1, |max| max + 1))
    }
}

fn subdirectory_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment == "."
        || segment.contains("..")
        || segment.contains(&['/', '\\', '\0'][..])
    {
        return Err(Error::InvalidKey {
            key: segment.to_string(),
        });
    }
    Ok(())
}
