//! On-disk layout definitions
//!
//! Records file:
//! ```text
//! +------------------+  offset 0
//! |  Record 0        |  40 bytes - file header, never a valid record
//! +------------------+  offset 40
//! |  Record 1        |  parent:i32 name:i32 flags:i32 attrs:i32 content:i32
//! |                  |  timestamp:i64 modCount:i32 length:i64   (little-endian)
//! +------------------+
//! |  ...             |  record id * 40 = record offset
//! +------------------+
//! ```
//!
//! Page store index (`<name>.storageRecordIndex`, big-endian):
//! ```text
//! +------------------+  offset 0
//! |  Header          |  8 bytes - magic, version
//! +------------------+  offset 8
//! |  Page 1 entry    |  address:i64 size:i32 capacity:i32 [refCount:i32]
//! +------------------+
//! |  ...             |  page n at 8 + (n - 1) * entry size
//! +------------------+
//! ```
//! Page bytes live in `<name>.storageData` at `address .. address + size`.

use serde::Serialize;
use vfscache_common::{
    AttributeRecordId, ContentId, Error, NameId, RecordField, RecordFlags, RecordId, Result,
};

/// Size of one record in bytes
pub const RECORD_SIZE: usize = 40;

/// Size of the page store index header
pub const PAGE_INDEX_HEADER_SIZE: usize = 8;

/// Suffix of the page store index file
pub const PAGE_INDEX_SUFFIX: &str = ".storageRecordIndex";

/// Suffix of the page store data file
pub const PAGE_DATA_SUFFIX: &str = ".storageData";

/// Attribute values shorter than this are inlined in the attribute stream
pub const MAX_SMALL_ATTR_SIZE: i32 = 64;

/// Read a little-endian `u32` at `offset`
pub(crate) fn le_u32(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

/// Read a little-endian `i64` at `offset`
pub(crate) fn le_i64(data: &[u8], offset: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[offset..offset + 8]);
    i64::from_le_bytes(raw)
}

/// One fully decoded record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Record {
    pub parent_id: RecordId,
    pub name_id: NameId,
    #[serde(serialize_with = "serialize_flags")]
    pub flags: RecordFlags,
    pub attribute_record_id: AttributeRecordId,
    pub content_id: ContentId,
    pub timestamp: i64,
    pub mod_count: i32,
    pub length: i64,
}

fn serialize_flags<S: serde::Serializer>(
    flags: &RecordFlags,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u32(flags.bits())
}

impl Record {
    /// Parse a record from exactly one record's bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_SIZE {
            return Err(Error::corrupt(format!(
                "record needs {RECORD_SIZE} bytes, got {}",
                data.len()
            )));
        }

        let int = |field: RecordField| le_u32(data, field.offset());
        Ok(Self {
            parent_id: RecordId::new(int(RecordField::ParentId)),
            name_id: NameId::new(int(RecordField::NameId)),
            flags: RecordFlags::from_bits(int(RecordField::Flags)),
            attribute_record_id: AttributeRecordId::new(int(RecordField::AttributeRecordId)),
            content_id: ContentId::new(int(RecordField::ContentId)),
            timestamp: le_i64(data, RecordField::Timestamp.offset()),
            mod_count: int(RecordField::ModCount) as i32,
            length: le_i64(data, RecordField::Length.offset()),
        })
    }

    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.flags.contains(RecordFlags::IS_DIRECTORY)
    }

    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.flags.contains(RecordFlags::FREE_RECORD)
    }
}

/// Shape of a page store index entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageIndexLayout {
    /// address, size, capacity
    Plain,
    /// address, size, capacity, reference count
    RefCounted,
}

impl PageIndexLayout {
    /// Entry size in bytes
    #[must_use]
    pub const fn entry_size(self) -> usize {
        match self {
            Self::Plain => 16,
            Self::RefCounted => 20,
        }
    }
}

/// One decoded page store index entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageEntry {
    /// Offset of the page bytes in the data file
    pub address: u64,
    /// Bytes in use
    pub size: u32,
    /// Bytes reserved by the allocator
    pub capacity: u32,
    /// Reference count (reference-counted stores only)
    pub ref_count: Option<u32>,
}

impl PageEntry {
    /// Parse an index entry in the given layout
    pub fn from_bytes(data: &[u8], layout: PageIndexLayout) -> Result<Self> {
        if data.len() < layout.entry_size() {
            return Err(Error::corrupt("page index entry too small"));
        }

        let address = i64::from_be_bytes(array(&data[0..8]));
        let size = i32::from_be_bytes(array(&data[8..12]));
        let capacity = i32::from_be_bytes(array(&data[12..16]));
        let ref_count = match layout {
            PageIndexLayout::Plain => None,
            PageIndexLayout::RefCounted => Some(i32::from_be_bytes(array(&data[16..20]))),
        };

        let non_negative = |value: i64, what: &str| {
            u64::try_from(value).map_err(|_| Error::corrupt(format!("negative page {what}: {value}")))
        };
        Ok(Self {
            address: non_negative(address, "address")?,
            size: non_negative(i64::from(size), "size")? as u32,
            capacity: non_negative(i64::from(capacity), "capacity")? as u32,
            ref_count: ref_count
                .map(|count| non_negative(i64::from(count), "reference count"))
                .transpose()?
                .map(|count| count as u32),
        })
    }

    /// Reserved but unused bytes
    #[must_use]
    pub const fn slack(&self) -> u32 {
        self.capacity.saturating_sub(self.size)
    }
}

fn array<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(data);
    raw
}

/// Capacity the producing allocator reserves for a blob of `required` bytes
///
/// 20% growth room, capped at the next 1 KiB boundary, never below 8 bytes
/// when an attribute page was claimed for the request and 32 otherwise.
#[must_use]
pub fn calculate_capacity(required: u32, attr_page_requested: bool) -> u32 {
    let minimum = if attr_page_requested { 8 } else { 32 };
    let grown = u64::from(required) * 6 / 5;
    let boundary = (u64::from(required) / 1024 + 1) * 1024;
    let capacity = grown.min(boundary).max(minimum);
    u32::try_from(capacity).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes() -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_SIZE);
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&9u32.to_le_bytes());
        buf.extend_from_slice(&0x102u32.to_le_bytes());
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&1_600_000_000_000i64.to_le_bytes());
        buf.extend_from_slice(&(-7i32).to_le_bytes());
        buf.extend_from_slice(&123_456i64.to_le_bytes());
        buf
    }

    #[test]
    fn test_record_from_bytes() {
        let record = Record::from_bytes(&record_bytes()).unwrap();
        assert_eq!(record.parent_id, RecordId::new(1));
        assert_eq!(record.name_id, NameId::new(9));
        assert!(record.is_directory());
        assert!(record.is_free());
        assert_eq!(record.attribute_record_id, AttributeRecordId::new(3));
        assert_eq!(record.content_id, ContentId::new(4));
        assert_eq!(record.timestamp, 1_600_000_000_000);
        assert_eq!(record.mod_count, -7);
        assert_eq!(record.length, 123_456);
    }

    #[test]
    fn test_short_record_is_corrupt() {
        assert!(Record::from_bytes(&[0u8; 39]).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_page_entry_layouts() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&4096i64.to_be_bytes());
        buf.extend_from_slice(&100i32.to_be_bytes());
        buf.extend_from_slice(&120i32.to_be_bytes());
        buf.extend_from_slice(&3i32.to_be_bytes());

        let plain = PageEntry::from_bytes(&buf, PageIndexLayout::Plain).unwrap();
        assert_eq!(plain.address, 4096);
        assert_eq!(plain.size, 100);
        assert_eq!(plain.slack(), 20);
        assert_eq!(plain.ref_count, None);

        let counted = PageEntry::from_bytes(&buf, PageIndexLayout::RefCounted).unwrap();
        assert_eq!(counted.ref_count, Some(3));
    }

    #[test]
    fn test_negative_page_size_is_corrupt() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0i64.to_be_bytes());
        buf.extend_from_slice(&(-1i32).to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        assert!(
            PageEntry::from_bytes(&buf, PageIndexLayout::Plain)
                .unwrap_err()
                .is_corrupt()
        );
    }

    #[test]
    fn test_capacity_policy() {
        assert_eq!(calculate_capacity(0, false), 32);
        assert_eq!(calculate_capacity(0, true), 8);
        assert_eq!(calculate_capacity(100, false), 120);
        // 20% of 1000 would cross the 1 KiB boundary
        assert_eq!(calculate_capacity(1000, false), 1024);
        assert_eq!(calculate_capacity(5000, true), 5120);
    }
}
