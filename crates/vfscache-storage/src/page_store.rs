//! Page-addressed variable-length blob storage
//!
//! Backs both the attribute store and the content store. The index is small
//! and loaded whole; page bytes are fetched with positioned reads on demand.

use crate::layout::{
    PAGE_DATA_SUFFIX, PAGE_INDEX_HEADER_SIZE, PAGE_INDEX_SUFFIX, PageEntry, PageIndexLayout,
};
use crate::raw_io::RawFile;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use vfscache_common::{Error, Result};

/// Read statistics of one page store
#[derive(Debug, Default)]
pub struct PageStoreStats {
    pub reads: AtomicU64,
    pub bytes_read: AtomicU64,
    pub read_errors: AtomicU64,
}

/// A read-only page store
#[derive(Debug)]
pub struct PageStore {
    name: String,
    index: Bytes,
    data: RawFile,
    layout: PageIndexLayout,
    pages: u32,
    stats: PageStoreStats,
}

/// Paths of the two files behind a store base name
pub fn store_files(dir: &Path, base_name: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{base_name}{PAGE_INDEX_SUFFIX}")),
        dir.join(format!("{base_name}{PAGE_DATA_SUFFIX}")),
    )
}

impl PageStore {
    /// Open the store named `base_name` inside `dir`
    pub fn open(dir: &Path, base_name: &str, layout: PageIndexLayout) -> Result<Self> {
        let (index_path, data_path) = store_files(dir, base_name);
        let index = RawFile::open(&index_path)?.read_all()?;
        let data = RawFile::open(&data_path)?;
        let store = Self::new(base_name, index, data, layout)?;
        debug!(
            "Opened page store {} with {} pages ({} data bytes)",
            base_name,
            store.pages,
            store.data.size()
        );
        Ok(store)
    }

    fn new(name: &str, index: Bytes, data: RawFile, layout: PageIndexLayout) -> Result<Self> {
        if index.len() < PAGE_INDEX_HEADER_SIZE {
            return Err(Error::corrupt(format!(
                "page index of {name} shorter than its header"
            )));
        }
        let pages = u32::try_from((index.len() - PAGE_INDEX_HEADER_SIZE) / layout.entry_size())
            .map_err(|_| Error::corrupt(format!("page index of {name} too large")))?;

        Ok(Self {
            name: name.to_string(),
            index,
            data,
            layout,
            pages,
            stats: PageStoreStats::default(),
        })
    }

    /// Store base name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of pages the index describes
    pub const fn page_count(&self) -> u32 {
        self.pages
    }

    pub const fn stats(&self) -> &PageStoreStats {
        &self.stats
    }

    /// Index entry of a page
    pub fn entry(&self, page: u32) -> Result<PageEntry> {
        if page == 0 || page > self.pages {
            return Err(Error::not_found(format!(
                "page {page} in {} ({} pages)",
                self.name, self.pages
            )));
        }
        let entry_size = self.layout.entry_size();
        let start = PAGE_INDEX_HEADER_SIZE + (page as usize - 1) * entry_size;
        PageEntry::from_bytes(&self.index[start..start + entry_size], self.layout)
    }

    /// Full byte content of a page
    pub fn read(&self, page: u32) -> Result<Bytes> {
        let result = self
            .entry(page)
            .and_then(|entry| self.data.read_at(entry.address, entry.size as usize));

        match &result {
            Ok(bytes) => {
                self.stats.reads.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_read
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}
