//! Fixed-width record table
//!
//! Every accessor computes `id * RECORD_SIZE + field offset` and reads one
//! primitive there. Ids outside `1..extent` are rejected up front instead of
//! reading whatever bytes happen to sit at the computed offset.

use crate::layout::{RECORD_SIZE, Record, le_i64, le_u32};
use crate::raw_io::RawFile;
use bytes::Bytes;
use std::path::Path;
use tracing::debug;
use vfscache_common::{
    AttributeRecordId, ContentId, Error, NameId, RecordField, RecordFlags, RecordId, Result,
};

/// The record array of one snapshot
#[derive(Debug)]
pub struct RecordTable {
    data: Bytes,
    extent: u32,
}

impl RecordTable {
    /// Load the records file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = RawFile::open(path)?;
        let table = Self::from_bytes(file.read_all()?)?;
        debug!(
            "Opened record table {} with {} records",
            file.path().display(),
            table.extent
        );
        Ok(table)
    }

    /// Wrap an in-memory copy of the records file
    ///
    /// A trailing partial record is ignored.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let extent = u32::try_from(data.len() / RECORD_SIZE)
            .map_err(|_| Error::corrupt("record table holds more than u32::MAX records"))?;
        Ok(Self { data, extent })
    }

    /// Number of record slots, including the reserved slot 0
    pub const fn extent(&self) -> u32 {
        self.extent
    }

    /// Iterate over every addressable record id
    pub fn ids(&self) -> impl Iterator<Item = RecordId> + use<> {
        (1..self.extent).map(RecordId::new)
    }

    fn offset(&self, id: RecordId, field: RecordField) -> Result<usize> {
        if id.is_none() || id.get() >= self.extent {
            return Err(Error::OutOfRange {
                record_id: id.get(),
                extent: self.extent,
            });
        }
        Ok(id.get() as usize * RECORD_SIZE + field.offset())
    }

    /// Read one field, widened to `i64`
    ///
    /// 32-bit fields are sign-extended the way the producer declared them.
    pub fn field(&self, id: RecordId, field: RecordField) -> Result<i64> {
        let offset = self.offset(id, field)?;
        Ok(match field.width() {
            8 => le_i64(&self.data, offset),
            _ => i64::from(le_u32(&self.data, offset) as i32),
        })
    }

    fn int(&self, id: RecordId, field: RecordField) -> Result<u32> {
        let offset = self.offset(id, field)?;
        Ok(le_u32(&self.data, offset))
    }

    fn long(&self, id: RecordId, field: RecordField) -> Result<i64> {
        let offset = self.offset(id, field)?;
        Ok(le_i64(&self.data, offset))
    }

    /// Decode every field of a record at once
    pub fn record(&self, id: RecordId) -> Result<Record> {
        let start = self.offset(id, RecordField::ParentId)?;
        Record::from_bytes(&self.data[start..start + RECORD_SIZE])
    }

    pub fn parent_id(&self, id: RecordId) -> Result<RecordId> {
        self.int(id, RecordField::ParentId).map(RecordId::new)
    }

    pub fn name_id(&self, id: RecordId) -> Result<NameId> {
        self.int(id, RecordField::NameId).map(NameId::new)
    }

    pub fn flags(&self, id: RecordId) -> Result<RecordFlags> {
        self.int(id, RecordField::Flags).map(RecordFlags::from_bits)
    }

    pub fn attribute_record_id(&self, id: RecordId) -> Result<AttributeRecordId> {
        self.int(id, RecordField::AttributeRecordId)
            .map(AttributeRecordId::new)
    }

    pub fn content_id(&self, id: RecordId) -> Result<ContentId> {
        self.int(id, RecordField::ContentId).map(ContentId::new)
    }

    pub fn timestamp(&self, id: RecordId) -> Result<i64> {
        self.long(id, RecordField::Timestamp)
    }

    pub fn mod_count(&self, id: RecordId) -> Result<i32> {
        self.int(id, RecordField::ModCount).map(|count| count as i32)
    }

    pub fn length(&self, id: RecordId) -> Result<i64> {
        self.long(id, RecordField::Length)
    }

    /// True when every bit of `flag` is set on the record
    pub fn is_flag_set(&self, id: RecordId, flag: RecordFlags) -> Result<bool> {
        Ok(self.flags(id)?.contains(flag))
    }

    pub fn is_directory(&self, id: RecordId) -> Result<bool> {
        self.is_flag_set(id, RecordFlags::IS_DIRECTORY)
    }

    /// Live records without a parent
    pub fn roots(&self) -> Vec<RecordId> {
        self.ids()
            .filter(|&id| {
                self.record(id)
                    .is_ok_and(|record| record.parent_id.is_none() && !record.is_free())
            })
            .collect()
    }
}
