//! Reference-counted content blob store
//!
//! Content id 0 means "no cached content" and never touches the store.

use crate::layout::{PageEntry, PageIndexLayout};
use crate::page_store::PageStore;
use bytes::Bytes;
use std::path::Path;
use vfscache_common::{ContentId, Result};

/// Cached file content of one snapshot
#[derive(Debug)]
pub struct ContentStore {
    pages: PageStore,
}

impl ContentStore {
    /// Open the reference-counted store named `base_name` inside `dir`
    pub fn open(dir: &Path, base_name: &str) -> Result<Self> {
        PageStore::open(dir, base_name, PageIndexLayout::RefCounted).map(Self::new)
    }

    pub const fn new(pages: PageStore) -> Self {
        Self { pages }
    }

    /// The underlying page store
    pub const fn pages(&self) -> &PageStore {
        &self.pages
    }

    /// Index entry of a blob, `None` for content id 0
    pub fn entry(&self, id: ContentId) -> Result<Option<PageEntry>> {
        if id.is_none() {
            return Ok(None);
        }
        self.pages.entry(id.get()).map(Some)
    }

    /// Blob bytes, `None` for content id 0
    pub fn read(&self, id: ContentId) -> Result<Option<Bytes>> {
        if id.is_none() {
            return Ok(None);
        }
        self.pages.read(id.get()).map(Some)
    }

    /// Stored length of a blob
    pub fn length(&self, id: ContentId) -> Result<u64> {
        Ok(self.entry(id)?.map_or(0, |entry| u64::from(entry.size)))
    }

    /// Number of records sharing a blob
    pub fn ref_count(&self, id: ContentId) -> Result<u32> {
        Ok(self
            .entry(id)?
            .and_then(|entry| entry.ref_count)
            .unwrap_or(0))
    }
}
