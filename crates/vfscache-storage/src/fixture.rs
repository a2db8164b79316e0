//! Builder for complete on-disk caches used by the crate's tests

use crate::layout::{MAX_SMALL_ATTR_SIZE, RECORD_SIZE};
use crate::names::keystream_path;
use crate::page_store::store_files;
use crate::snapshot::Snapshot;
use crate::varint::{write_int, write_utf};
use bytes::{BufMut, BytesMut};
use std::path::Path;
use tempfile::TempDir;
use vfscache_common::{CacheFiles, RecordFlags, ViewerConfig};

pub const CHILDREN: &str = "FsRecords.DIRECTORY_CHILDREN";

#[derive(Default)]
struct FixtureRecord {
    parent: u32,
    name: String,
    flags: RecordFlags,
    timestamp: i64,
    mod_count: i32,
    length: i64,
    content: Option<Vec<u8>>,
    children: Vec<u32>,
    raw_children: Option<Vec<u8>>,
    attributes: Vec<(String, Vec<u8>)>,
}

/// In-memory description of a cache, written out on demand
pub struct CacheFixture {
    records: Vec<FixtureRecord>,
    attribute_names: Vec<String>,
}

impl Default for CacheFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheFixture {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            attribute_names: vec![CHILDREN.to_string(), "encoding".to_string()],
        }
    }

    fn push(&mut self, parent: u32, name: &str, flags: RecordFlags) -> u32 {
        self.records.push(FixtureRecord {
            parent,
            name: name.to_string(),
            flags,
            timestamp: 1_700_000_000_000 + self.records.len() as i64,
            mod_count: self.records.len() as i32,
            ..FixtureRecord::default()
        });
        let id = self.records.len() as u32;
        if parent != 0 {
            self.records[parent as usize - 1].children.push(id);
        }
        id
    }

    /// Add a directory; parent 0 makes it a root
    pub fn dir(&mut self, parent: u32, name: &str) -> u32 {
        self.push(parent, name, RecordFlags::IS_DIRECTORY | RecordFlags::CHILDREN_CACHED)
    }

    /// Add a regular file with optional cached content
    pub fn file(&mut self, parent: u32, name: &str, content: Option<&[u8]>) -> u32 {
        let id = self.push(parent, name, RecordFlags::default());
        let record = &mut self.records[id as usize - 1];
        record.content = content.map(<[u8]>::to_vec);
        record.length = content.map_or(0, |c| c.len() as i64);
        id
    }

    /// Attach a named attribute, registering the name if needed
    pub fn attribute(&mut self, id: u32, name: &str, value: &[u8]) {
        if !self.attribute_names.iter().any(|n| n == name) {
            self.attribute_names.push(name.to_string());
        }
        self.records[id as usize - 1]
            .attributes
            .push((name.to_string(), value.to_vec()));
    }

    /// Replace the encoded children payload of a directory
    pub fn raw_children(&mut self, id: u32, payload: &[u8]) {
        self.records[id as usize - 1].raw_children = Some(payload.to_vec());
    }

    /// Add a child id to a directory without touching the child's parent
    pub fn link(&mut self, dir: u32, child: u32) {
        self.records[dir as usize - 1].children.push(child);
    }

    /// Set or clear flags on a record
    pub fn flags(&mut self, id: u32, flags: RecordFlags) {
        self.records[id as usize - 1].flags = flags;
    }

    fn attribute_id(&self, name: &str) -> i32 {
        self.attribute_names
            .iter()
            .position(|n| n == name)
            .map(|index| index as i32 + 1)
            .unwrap()
    }

    /// Write every cache file into `dir`
    pub fn write(&self, dir: &Path) {
        let files = CacheFiles::default();

        // names.dat: version header and a few empty hash slots, then one
        // [hash, keyRef] record per record pointing into the key stream
        let mut names = BytesMut::new();
        names.put_u32(1);
        names.put_bytes(0, 4 * 4);
        let mut keystream = BytesMut::new();
        let mut name_ids = Vec::with_capacity(self.records.len());
        for record in &self.records {
            name_ids.push(names.len() as u32);
            names.put_i32(record.name.len() as i32);
            names.put_i32(keystream.len() as i32);
            write_utf(&mut keystream, &record.name);
        }
        let names_path = dir.join(&files.names);
        std::fs::write(keystream_path(&names_path), &keystream).unwrap();
        std::fs::write(names_path, &names).unwrap();

        // vfs_enum_attrib.dat
        let mut enumeration = BytesMut::new();
        enumeration.put_i64(1_690_000_000_000);
        write_int(&mut enumeration, 4);
        for name in &self.attribute_names {
            write_utf(&mut enumeration, name);
        }
        std::fs::write(dir.join(&files.attribute_enum), &enumeration).unwrap();

        // Attribute pages: overflow values first, then the record's stream
        let mut attribute_pages: Vec<Vec<u8>> = Vec::new();
        let mut attribute_records = Vec::with_capacity(self.records.len());
        for (index, record) in self.records.iter().enumerate() {
            let owner = index as u32 + 1;
            let mut entries = record.attributes.clone();
            if let Some(raw) = &record.raw_children {
                entries.insert(0, (CHILDREN.to_string(), raw.clone()));
            } else if !record.children.is_empty() {
                let children: Vec<_> = record
                    .children
                    .iter()
                    .copied()
                    .map(vfscache_common::RecordId::new)
                    .collect();
                let encoded = crate::children::ChildrenCodec::encode(
                    vfscache_common::RecordId::new(owner),
                    &children,
                );
                entries.insert(0, (CHILDREN.to_string(), encoded.to_vec()));
            }
            if entries.is_empty() {
                attribute_records.push(0);
                continue;
            }

            let mut stream = BytesMut::new();
            for (name, value) in &entries {
                write_int(&mut stream, self.attribute_id(name));
                if (value.len() as i32) < MAX_SMALL_ATTR_SIZE {
                    write_int(&mut stream, value.len() as i32);
                    stream.put_slice(value);
                } else {
                    attribute_pages.push(value.clone());
                    let address = attribute_pages.len() as i32 + MAX_SMALL_ATTR_SIZE;
                    write_int(&mut stream, address);
                    stream.put_bytes(0, address as usize);
                }
            }
            attribute_pages.push(stream.to_vec());
            attribute_records.push(attribute_pages.len() as u32);
        }
        write_page_store(dir, &files.attributes, &attribute_pages, None);

        // Content pages, deduplicated so shared blobs get a reference count
        let mut blobs: Vec<Vec<u8>> = Vec::new();
        let mut ref_counts: Vec<i32> = Vec::new();
        let mut content_ids = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let Some(content) = &record.content else {
                content_ids.push(0);
                continue;
            };
            let index = blobs.iter().position(|b| b == content).unwrap_or_else(|| {
                blobs.push(content.clone());
                ref_counts.push(0);
                blobs.len() - 1
            });
            ref_counts[index] += 1;
            content_ids.push(index as u32 + 1);
        }
        write_page_store(dir, &files.content, &blobs, Some(&ref_counts));

        // records.dat: header slot, then one slot per record
        let mut records = BytesMut::zeroed(RECORD_SIZE);
        for (index, record) in self.records.iter().enumerate() {
            records.put_u32_le(record.parent);
            records.put_u32_le(name_ids[index]);
            records.put_u32_le(record.flags.bits());
            records.put_u32_le(attribute_records[index]);
            records.put_u32_le(content_ids[index]);
            records.put_i64_le(record.timestamp);
            records.put_i32_le(record.mod_count);
            records.put_i64_le(record.length);
        }
        std::fs::write(dir.join(&files.records), &records).unwrap();
    }

    /// Write the cache into a fresh directory
    pub fn write_temp(&self) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        self.write(dir.path());
        dir
    }

    /// Write the cache and open a snapshot of it
    pub fn open(&self) -> Snapshot {
        let dir = self.write_temp();
        Snapshot::open_with(dir.path(), &ViewerConfig::default()).unwrap()
    }
}

fn write_page_store(dir: &Path, base_name: &str, pages: &[Vec<u8>], ref_counts: Option<&[i32]>) {
    let (index_path, data_path) = store_files(dir, base_name);
    let mut index = BytesMut::new();
    index.put_u32(0x5041_4745);
    index.put_u32(pages.len() as u32);
    let mut data = BytesMut::new();
    for (page, bytes) in pages.iter().enumerate() {
        let capacity = crate::layout::calculate_capacity(bytes.len() as u32, ref_counts.is_none());
        index.put_i64(data.len() as i64);
        index.put_i32(bytes.len() as i32);
        index.put_i32(capacity as i32);
        if let Some(ref_counts) = ref_counts {
            index.put_i32(ref_counts[page]);
        }
        data.put_slice(bytes);
        data.put_bytes(0, (capacity as usize).saturating_sub(bytes.len()));
    }
    std::fs::write(index_path, &index).unwrap();
    std::fs::write(data_path, &data).unwrap();
}
