//! vfscache Storage - Read-only decoder for persisted VFS caches
//!
//! This crate implements everything needed to browse a cache offline:
//! - Positioned read-only file access and the varint/string codec
//! - The fixed-width record table and the name table
//! - Page stores, keyed attributes and reference-counted content
//! - The delta-encoded children codec
//! - Snapshots copied away from the owning process before reading
//! - A per-snapshot node arena and the directory size aggregator

pub mod attr_enum;
pub mod attributes;
pub mod children;
pub mod content;
pub mod du;
pub mod info;
pub mod layout;
pub mod memo;
pub mod names;
pub mod page_store;
pub mod raw_io;
pub mod records;
pub mod snapshot;
pub mod tree;
pub mod varint;

#[cfg(test)]
mod fixture;

// Re-exports
pub use attr_enum::AttributeNameEnum;
pub use attributes::{
    AttributeEntry, AttributeSlot, AttributeStore, find_attribute, list_attributes,
};
pub use children::ChildrenCodec;
pub use content::ContentStore;
pub use du::{DiskSizeComputer, DiskSizeEvent, DiskSizeListener, aggregate};
pub use info::RecordInfo;
pub use layout::{
    MAX_SMALL_ATTR_SIZE, PAGE_DATA_SUFFIX, PAGE_INDEX_SUFFIX, PageEntry, PageIndexLayout,
    RECORD_SIZE, Record, calculate_capacity,
};
pub use memo::{Memo, MemoState};
pub use names::NameTable;
pub use page_store::{PageStore, PageStoreStats};
pub use raw_io::RawFile;
pub use records::RecordTable;
pub use snapshot::Snapshot;
pub use tree::{Node, NodeArena, TreeStats};
