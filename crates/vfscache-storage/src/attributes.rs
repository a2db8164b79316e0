//! Keyed per-record attribute storage
//!
//! A record's attribute record is a page whose payload is a packed sequence
//! of `(attrId:INT, sizeOrAddress:INT)` pairs:
//!
//! ```text
//! sizeOrAddress < 64   -> the next sizeOrAddress bytes are the value
//! sizeOrAddress >= 64  -> the value is page (sizeOrAddress - 64) of the same store
//! ```
//!
//! A non-matching entry is always skipped by exactly `sizeOrAddress` bytes,
//! whichever form it takes. Readers rely on that to step over entries
//! without knowing how they are stored. An entry addressing page 0 holds no
//! value.

use crate::attr_enum::AttributeNameEnum;
use crate::layout::{MAX_SMALL_ATTR_SIZE, PageIndexLayout};
use crate::page_store::PageStore;
use crate::records::RecordTable;
use crate::varint::read_int;
use bytes::{Buf, Bytes};
use serde::Serialize;
use std::path::Path;
use vfscache_common::{AttributeId, AttributeRecordId, Error, RecordId, Result};

/// Where an attribute value lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeSlot {
    /// Byte range inside the attribute stream
    Inline { offset: usize, len: usize },
    /// Overflow page in the attribute store
    Page { page: u32 },
}

/// One entry of an attribute stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AttributeEntry {
    pub id: AttributeId,
    pub slot: AttributeSlot,
}

/// Cursor over the entries of one attribute stream
struct EntryScanner<'a> {
    stream: &'a [u8],
    buf: &'a [u8],
    names: &'a AttributeNameEnum,
}

impl<'a> EntryScanner<'a> {
    fn new(stream: &'a [u8], names: &'a AttributeNameEnum) -> Self {
        Self {
            stream,
            buf: stream,
            names,
        }
    }

    fn position(&self) -> usize {
        self.stream.len() - self.buf.remaining()
    }

    /// Read the next `(attrId, sizeOrAddress)` pair
    fn next_header(&mut self) -> Result<Option<(AttributeId, i32)>> {
        if !self.buf.has_remaining() {
            return Ok(None);
        }
        let at = self.position();
        let raw_id = read_int(&mut self.buf)?;
        let size_or_address = read_int(&mut self.buf)?;

        let id = u32::try_from(raw_id)
            .map(AttributeId::new)
            .ok()
            .filter(|&id| self.names.contains(id))
            .ok_or_else(|| {
                Error::corrupt(format!(
                    "unregistered attribute id {raw_id} at offset {at} of attribute stream"
                ))
            })?;
        if size_or_address < 0 {
            return Err(Error::corrupt(format!(
                "negative size/address {size_or_address} for attribute {id} at offset {at}"
            )));
        }
        Ok(Some((id, size_or_address)))
    }

    /// Step over `len` bytes, never past the declared end of the stream
    fn skip(&mut self, id: AttributeId, len: usize) -> Result<()> {
        if len > self.buf.remaining() {
            return Err(Error::corrupt(format!(
                "attribute {id} skips {len} bytes at offset {} but only {} remain",
                self.position(),
                self.buf.remaining()
            )));
        }
        self.buf.advance(len);
        Ok(())
    }

    /// Resolve the slot of the entry whose header was just read
    fn slot(&self, id: AttributeId, size_or_address: i32) -> Result<Option<AttributeSlot>> {
        if size_or_address < MAX_SMALL_ATTR_SIZE {
            let len = size_or_address as usize;
            if len > self.buf.remaining() {
                return Err(Error::corrupt(format!(
                    "inline value of attribute {id} needs {len} bytes but only {} remain",
                    self.buf.remaining()
                )));
            }
            return Ok(Some(AttributeSlot::Inline {
                offset: self.position(),
                len,
            }));
        }

        let page = (size_or_address - MAX_SMALL_ATTR_SIZE) as u32;
        Ok((page != 0).then_some(AttributeSlot::Page { page }))
    }
}

/// Locate `target` inside one attribute stream
pub fn find_attribute(
    stream: &[u8],
    target: AttributeId,
    names: &AttributeNameEnum,
) -> Result<Option<AttributeSlot>> {
    let mut scanner = EntryScanner::new(stream, names);
    while let Some((id, size_or_address)) = scanner.next_header()? {
        if id == target {
            return scanner.slot(id, size_or_address);
        }
        scanner.skip(id, size_or_address as usize)?;
    }
    Ok(None)
}

/// List every entry of one attribute stream that holds a value
pub fn list_attributes(stream: &[u8], names: &AttributeNameEnum) -> Result<Vec<AttributeEntry>> {
    let mut scanner = EntryScanner::new(stream, names);
    let mut entries = Vec::new();
    while let Some((id, size_or_address)) = scanner.next_header()? {
        if let Some(slot) = scanner.slot(id, size_or_address)? {
            entries.push(AttributeEntry { id, slot });
        }
        scanner.skip(id, size_or_address as usize)?;
    }
    Ok(entries)
}

/// Attribute storage of one snapshot
#[derive(Debug)]
pub struct AttributeStore {
    pages: PageStore,
    names: AttributeNameEnum,
}

impl AttributeStore {
    /// Open the attribute page store and its name enumeration
    pub fn open(dir: &Path, base_name: &str, enum_file: &str) -> Result<Self> {
        let names = AttributeNameEnum::open(dir.join(enum_file))?;
        let pages = PageStore::open(dir, base_name, PageIndexLayout::Plain)?;
        Ok(Self::new(pages, names))
    }

    pub const fn new(pages: PageStore, names: AttributeNameEnum) -> Self {
        Self { pages, names }
    }

    /// The attribute name enumeration
    pub const fn names(&self) -> &AttributeNameEnum {
        &self.names
    }

    /// The underlying page store
    pub const fn pages(&self) -> &PageStore {
        &self.pages
    }

    /// Read the value of a named attribute of a record
    ///
    /// `Ok(None)` when the record has no attributes or none under that name.
    pub fn read(
        &self,
        records: &RecordTable,
        record_id: RecordId,
        name: &str,
    ) -> Result<Option<Bytes>> {
        let attribute_record = records.attribute_record_id(record_id)?;
        let attr_id = self.names.id_of(name)?;
        self.read_by_id(attribute_record, attr_id)
    }

    /// Read an attribute value given the record's attribute page and the
    /// attribute id
    pub fn read_by_id(
        &self,
        attribute_record: AttributeRecordId,
        attr_id: AttributeId,
    ) -> Result<Option<Bytes>> {
        if attribute_record.is_none() {
            return Ok(None);
        }

        let stream = self.pages.read(attribute_record.get())?;
        match find_attribute(&stream, attr_id, &self.names)? {
            None => Ok(None),
            Some(AttributeSlot::Inline { offset, len }) => {
                Ok(Some(stream.slice(offset..offset + len)))
            }
            Some(AttributeSlot::Page { page }) => self.pages.read(page).map(Some),
        }
    }

    /// Entries present on a record
    pub fn list(&self, records: &RecordTable, record_id: RecordId) -> Result<Vec<AttributeEntry>> {
        let attribute_record = records.attribute_record_id(record_id)?;
        if attribute_record.is_none() {
            return Ok(Vec::new());
        }
        let stream = self.pages.read(attribute_record.get())?;
        list_attributes(&stream, &self.names)
    }
}
