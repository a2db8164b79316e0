//! Attribute name enumeration
//!
//! ```text
//! timestamp:i64 BE | version:INT | name | name | ... EOF
//! ```
//! The 1-based position of a name in read order is its attribute id.

use crate::raw_io::RawFile;
use crate::varint::{read_int, read_utf};
use bytes::{Buf, Bytes};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use vfscache_common::{AttributeId, Error, Result};

/// Attribute name <-> id table, loaded once per snapshot
#[derive(Debug, Default)]
pub struct AttributeNameEnum {
    timestamp: i64,
    version: i32,
    names: Vec<String>,
    ids: HashMap<String, AttributeId>,
}

impl AttributeNameEnum {
    /// Load the enumeration file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = RawFile::open(path)?;
        let names = Self::from_bytes(file.read_all()?)?;
        debug!(
            "Loaded {} attribute names (version {}) from {}",
            names.len(),
            names.version,
            file.path().display()
        );
        Ok(names)
    }

    /// Parse an in-memory copy of the enumeration file
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let mut buf = data;
        if buf.remaining() < 8 {
            return Err(Error::corrupt("attribute enumeration missing timestamp"));
        }
        let timestamp = buf.get_i64();
        let version = read_int(&mut buf)?;

        let mut names = Self {
            timestamp,
            version,
            ..Self::default()
        };
        while buf.has_remaining() {
            let name = read_utf(&mut buf)?;
            let id = AttributeId::new(names.names.len() as u32 + 1);
            names.ids.entry(name.clone()).or_insert(id);
            names.names.push(name);
        }
        Ok(names)
    }

    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub const fn version(&self) -> i32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Id of a registered attribute name
    pub fn id_of(&self, name: &str) -> Result<AttributeId> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| Error::not_found(format!("attribute {name:?}")))
    }

    /// Name registered under an id
    pub fn name_of(&self, id: AttributeId) -> Result<&str> {
        id.get()
            .checked_sub(1)
            .and_then(|index| self.names.get(index as usize))
            .map(String::as_str)
            .ok_or_else(|| Error::not_found(format!("attribute id {id}")))
    }

    /// True when the id was ever registered
    pub fn contains(&self, id: AttributeId) -> bool {
        (1..=self.names.len()).contains(&(id.get() as usize))
    }

    /// Registered names with their ids, in id order
    pub fn iter(&self) -> impl Iterator<Item = (AttributeId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (AttributeId::new(index as u32 + 1), name.as_str()))
    }
}
