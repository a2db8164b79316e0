//! Name interning table
//!
//! Names are kept by a persistent enumerator split over two files:
//!
//! ```text
//! names.dat            version:u32, then hash slots and 8-byte records
//!                      [hash:i32][keyRef:i32] (big-endian)
//! names.dat.keystream  append-only UTF strings; keyRef is a byte offset here
//! ```
//!
//! A name id is the byte offset of its record inside `names.dat`, so id 0
//! (inside the header) never names anything. The key stream is indexed once
//! at open; records are read on demand.

use crate::raw_io::RawFile;
use crate::varint::read_utf;
use bytes::{Buf, Bytes};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use vfscache_common::{Error, NameId, Result};

/// Size of the version header at the start of `names.dat`
pub const NAMES_HEADER_SIZE: usize = 4;

/// Size of one enumerator record
pub const NAME_RECORD_SIZE: usize = 8;

/// Offset of the key stream reference inside a record
pub const KEY_REF_OFFSET: usize = 4;

/// Suffix of the file holding the strings themselves
pub const KEYSTREAM_SUFFIX: &str = ".keystream";

/// Path of the key stream belonging to the enumerator file at `path`
pub fn keystream_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(KEYSTREAM_SUFFIX);
    PathBuf::from(name)
}

/// Read-only id -> string table
#[derive(Debug, Default)]
pub struct NameTable {
    version: u32,
    records: Bytes,
    keys: HashMap<u32, Box<str>>,
}

impl NameTable {
    /// Load the enumerator file and its key stream
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let records = RawFile::open(path.as_ref())?;
        let keystream = RawFile::open(keystream_path(records.path()))?;
        let table = Self::from_bytes(records.read_all()?, keystream.read_all()?)?;
        debug!(
            "Indexed {} names from {}",
            table.len(),
            keystream.path().display()
        );
        Ok(table)
    }

    /// Index in-memory copies of the enumerator file and key stream
    pub fn from_bytes(records: Bytes, keystream: Bytes) -> Result<Self> {
        if records.len() < NAMES_HEADER_SIZE {
            return Err(Error::corrupt("names file shorter than its header"));
        }
        let version = (&records[..NAMES_HEADER_SIZE]).get_u32();

        let total = keystream.len();
        let mut buf = keystream;
        let mut keys = HashMap::new();
        while buf.has_remaining() {
            let offset = u32::try_from(total - buf.remaining())
                .map_err(|_| Error::corrupt("key stream larger than u32 offsets"))?;
            keys.insert(offset, read_utf(&mut buf)?.into_boxed_str());
        }
        Ok(Self {
            version,
            records,
            keys,
        })
    }

    /// Format version from the header
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Number of strings in the key stream
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key stream offset stored in the record at `id`
    fn key_ref(&self, id: NameId) -> Result<u32> {
        let start = id.get() as usize;
        if start < NAMES_HEADER_SIZE || start + NAME_RECORD_SIZE > self.records.len() {
            return Err(Error::not_found(format!("name id {id}")));
        }
        let key_ref = (&self.records[start + KEY_REF_OFFSET..]).get_i32();
        u32::try_from(key_ref).map_err(|_| {
            Error::corrupt(format!("name id {id} has negative key offset {key_ref}"))
        })
    }

    /// Resolve an id to its string
    pub fn resolve(&self, id: NameId) -> Result<&str> {
        if id.is_none() {
            return Err(Error::not_found("name id 0"));
        }
        let key_ref = self.key_ref(id)?;
        self.keys.get(&key_ref).map(AsRef::as_ref).ok_or_else(|| {
            Error::corrupt(format!(
                "name id {id} points at key offset {key_ref}, which starts no string"
            ))
        })
    }
}
