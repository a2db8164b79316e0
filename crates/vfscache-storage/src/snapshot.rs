//! Point-in-time copy of a cache directory and the read API over it
//!
//! The owning process may still hold the cache files mapped and flush them
//! lazily, so the directory is copied into a private temporary directory
//! before any table is opened. Everything is read from the copy afterwards.
//! The copy is removed when the `Snapshot` is dropped.

use crate::attributes::{AttributeEntry, AttributeStore};
use crate::children::ChildrenCodec;
use crate::content::ContentStore;
use crate::layout::Record;
use crate::names::NameTable;
use crate::raw_io::io_error;
use crate::records::RecordTable;
use crate::tree::{Node, NodeArena};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};
use vfscache_common::{
    AttributeRecordId, ContentId, Error, NameId, RecordFlags, RecordId, Result, ViewerConfig,
};

/// A consistent, read-only view of one cache
#[derive(Debug)]
pub struct Snapshot {
    source: PathBuf,
    copy: TempDir,
    records: RecordTable,
    names: NameTable,
    attributes: AttributeStore,
    content: ContentStore,
    children_attribute: String,
    root: Option<RecordId>,
    nodes: NodeArena,
}

/// Copy the regular files at the top level of `source` into a new
/// temporary directory
fn copy_cache_dir(source: &Path) -> Result<TempDir> {
    let copy = tempfile::Builder::new()
        .prefix("vfscache")
        .tempdir()
        .map_err(|e| io_error(source, "create a temporary copy of", &e))?;

    let mut files = 0usize;
    let mut bytes = 0u64;
    let entries = std::fs::read_dir(source).map_err(|e| io_error(source, "list", &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error(source, "list", &e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| io_error(&path, "stat", &e))?;
        if !file_type.is_file() {
            debug!("Skipping non-file entry {}", path.display());
            continue;
        }
        let target = copy.path().join(entry.file_name());
        bytes += std::fs::copy(&path, &target).map_err(|e| io_error(&path, "copy", &e))?;
        files += 1;
    }

    info!(
        "Copied {} files ({} bytes) from {} to {}",
        files,
        bytes,
        source.display(),
        copy.path().display()
    );
    Ok(copy)
}

impl Snapshot {
    /// Snapshot a cache directory with the default file names
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(dir, &ViewerConfig::default())
    }

    /// Snapshot a cache directory
    ///
    /// Fails without a partial result if the copy or any table fails.
    pub fn open_with(dir: impl AsRef<Path>, config: &ViewerConfig) -> Result<Self> {
        config.validate()?;
        let source = dir.as_ref().to_path_buf();
        if !source.is_dir() {
            return Err(Error::not_found(format!(
                "cache directory {}",
                source.display()
            )));
        }

        let copy = copy_cache_dir(&source)?;
        let files = &config.files;
        let base = copy.path();

        let records = RecordTable::open(base.join(&files.records))?;
        let names = NameTable::open(base.join(&files.names))?;
        let attributes = AttributeStore::open(base, &files.attributes, &files.attribute_enum)?;
        let content = ContentStore::open(base, &files.content)?;

        info!(
            "Opened snapshot of {}: {} records, {} names, {} attribute names",
            source.display(),
            records.extent(),
            names.len(),
            attributes.names().len()
        );

        Ok(Self {
            source,
            copy,
            records,
            names,
            attributes,
            content,
            children_attribute: config.children_attribute.clone(),
            root: config.root_id.map(RecordId::new),
            nodes: NodeArena::default(),
        })
    }

    /// Directory the snapshot was taken from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Private directory holding the copied files
    pub fn dir(&self) -> &Path {
        self.copy.path()
    }

    pub const fn records(&self) -> &RecordTable {
        &self.records
    }

    pub const fn names(&self) -> &NameTable {
        &self.names
    }

    pub const fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    pub const fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Node arena of this snapshot
    pub const fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    /// Attribute name holding directory children
    pub fn children_attribute(&self) -> &str {
        &self.children_attribute
    }

    /// Number of record slots, including the reserved slot 0
    pub const fn record_count(&self) -> u32 {
        self.records.extent()
    }

    /// Live records without a parent
    pub fn roots(&self) -> Vec<RecordId> {
        self.records.roots()
    }

    /// Record presented as the top of the tree: the configured one, else
    /// the first root
    pub fn root(&self) -> Result<RecordId> {
        if let Some(root) = self.root {
            self.records.record(root)?;
            return Ok(root);
        }
        self.roots()
            .first()
            .copied()
            .ok_or_else(|| Error::not_found("root record"))
    }

    /// Every field of a record
    pub fn record(&self, id: RecordId) -> Result<Record> {
        self.records.record(id)
    }

    pub fn resolve_name(&self, id: RecordId) -> Result<&str> {
        self.names.resolve(self.records.name_id(id)?)
    }

    pub fn parent_of(&self, id: RecordId) -> Result<RecordId> {
        self.records.parent_id(id)
    }

    pub fn name_id_of(&self, id: RecordId) -> Result<NameId> {
        self.records.name_id(id)
    }

    pub fn content_id_of(&self, id: RecordId) -> Result<ContentId> {
        self.records.content_id(id)
    }

    pub fn attribute_record_id_of(&self, id: RecordId) -> Result<AttributeRecordId> {
        self.records.attribute_record_id(id)
    }

    pub fn length_of(&self, id: RecordId) -> Result<i64> {
        self.records.length(id)
    }

    pub fn timestamp_of(&self, id: RecordId) -> Result<i64> {
        self.records.timestamp(id)
    }

    pub fn mod_count_of(&self, id: RecordId) -> Result<i32> {
        self.records.mod_count(id)
    }

    pub fn flags_of(&self, id: RecordId) -> Result<RecordFlags> {
        self.records.flags(id)
    }

    pub fn is_flag_set(&self, id: RecordId, flag: RecordFlags) -> Result<bool> {
        self.records.is_flag_set(id, flag)
    }

    pub fn is_directory(&self, id: RecordId) -> Result<bool> {
        self.records.is_directory(id)
    }

    /// Raw value of a named attribute
    pub fn read_attribute(&self, id: RecordId, name: &str) -> Result<Option<Bytes>> {
        self.attributes.read(&self.records, id, name)
    }

    /// Attribute entries present on a record
    pub fn list_attributes(&self, id: RecordId) -> Result<Vec<AttributeEntry>> {
        self.attributes.list(&self.records, id)
    }

    fn children_payload(&self, id: RecordId) -> Result<Option<Bytes>> {
        self.read_attribute(id, &self.children_attribute)
    }

    /// Child ids in stored order
    pub fn children_of(&self, id: RecordId) -> Result<Vec<RecordId>> {
        let payload = self.children_payload(id)?;
        ChildrenCodec::decode(id, payload.as_deref())
    }

    pub fn child_count_of(&self, id: RecordId) -> Result<usize> {
        let payload = self.children_payload(id)?;
        ChildrenCodec::count(payload.as_deref())
    }

    /// Cached content of a record, `None` when nothing is cached
    pub fn read_content(&self, id: RecordId) -> Result<Option<Bytes>> {
        self.content.read(self.records.content_id(id)?)
    }

    pub fn content_length(&self, id: ContentId) -> Result<u64> {
        self.content.length(id)
    }

    pub fn content_ref_count(&self, id: ContentId) -> Result<u32> {
        self.content.ref_count(id)
    }

    /// Tree node of a record, created on first use
    pub fn node(&self, id: RecordId) -> Arc<Node> {
        self.nodes.find_or_create(self, id, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{CHILDREN, CacheFixture};

    fn project() -> CacheFixture {
        let mut cache = CacheFixture::new();
        let root = cache.dir(0, "/");
        let src = cache.dir(root, "src");
        cache.file(src, "main.rs", Some(b"fn main() {}\n"));
        cache.file(src, "lib.rs", None);
        cache.file(root, "Cargo.toml", Some(b"[package]\n"));
        cache
    }

    #[test]
    fn test_read_api() {
        let snapshot = project().open();
        let root = RecordId::new(1);
        let src = RecordId::new(2);
        let main = RecordId::new(3);

        assert_eq!(snapshot.record_count(), 6);
        assert_eq!(snapshot.roots(), vec![root]);
        assert_eq!(snapshot.root().unwrap(), root);
        assert_eq!(snapshot.resolve_name(main).unwrap(), "main.rs");
        assert_eq!(snapshot.parent_of(main).unwrap(), src);
        assert!(snapshot.is_directory(src).unwrap());
        assert!(!snapshot.is_directory(main).unwrap());
        assert_eq!(snapshot.length_of(main).unwrap(), 13);

        assert_eq!(
            snapshot.children_of(root).unwrap(),
            vec![src, RecordId::new(5)]
        );
        assert_eq!(snapshot.child_count_of(src).unwrap(), 2);
        assert_eq!(snapshot.child_count_of(main).unwrap(), 0);

        let content = snapshot.read_content(main).unwrap().unwrap();
        assert_eq!(&content[..], b"fn main() {}\n");
        assert!(snapshot.read_content(RecordId::new(4)).unwrap().is_none());

        let content_id = snapshot.content_id_of(main).unwrap();
        assert_eq!(snapshot.content_length(content_id).unwrap(), 13);
        assert_eq!(snapshot.content_ref_count(content_id).unwrap(), 1);
    }

    #[test]
    fn test_out_of_range_ids() {
        let snapshot = project().open();
        for id in [0, 6, 1000] {
            let err = snapshot.resolve_name(RecordId::new(id)).unwrap_err();
            assert!(err.is_out_of_range(), "id {id}: {err}");
        }
    }

    #[test]
    fn test_short_and_overflow_attributes_read_the_same() {
        let mut cache = project();
        let short: Vec<u8> = (0..10).collect();
        let long: Vec<u8> = (0..200).map(|i| i as u8).collect();
        cache.attribute(3, "encoding", &short);
        cache.attribute(5, "encoding", &long);
        let snapshot = cache.open();

        let read = |id| {
            snapshot
                .read_attribute(RecordId::new(id), "encoding")
                .unwrap()
                .unwrap()
        };
        assert_eq!(&read(3)[..], &short[..]);
        assert_eq!(&read(5)[..], &long[..]);
        assert!(
            snapshot
                .read_attribute(RecordId::new(4), "encoding")
                .unwrap()
                .is_none()
        );
        assert!(
            snapshot
                .read_attribute(RecordId::new(3), "unregistered")
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_shared_content_is_reference_counted() {
        let mut cache = CacheFixture::new();
        let root = cache.dir(0, "/");
        cache.file(root, "a.txt", Some(b"same"));
        cache.file(root, "b.txt", Some(b"same"));
        let snapshot = cache.open();

        let a = snapshot.content_id_of(RecordId::new(2)).unwrap();
        assert_eq!(a, snapshot.content_id_of(RecordId::new(3)).unwrap());
        assert_eq!(snapshot.content_ref_count(a).unwrap(), 2);
    }

    #[test]
    fn test_snapshot_is_isolated_from_source() {
        let cache = project();
        let source = cache.write_temp();
        let snapshot = Snapshot::open(source.path()).unwrap();
        assert_ne!(snapshot.dir(), source.path());
        assert_eq!(snapshot.source(), source.path());

        let records = source.path().join("records.dat");
        std::fs::write(&records, [0u8; 12]).unwrap();
        std::fs::remove_file(source.path().join("names.dat")).unwrap();
        std::fs::remove_file(source.path().join("names.dat.keystream")).unwrap();

        assert_eq!(snapshot.record_count(), 6);
        assert_eq!(snapshot.resolve_name(RecordId::new(2)).unwrap(), "src");
    }

    #[test]
    fn test_copy_is_removed_on_drop() {
        let snapshot = project().open();
        let copy = snapshot.dir().to_path_buf();
        assert!(copy.join("records.dat").exists());
        assert!(copy.join("names.dat.keystream").exists());
        drop(snapshot);
        assert!(!copy.exists());
    }

    #[test]
    fn test_missing_file_fails_the_whole_snapshot() {
        let source = project().write_temp();
        std::fs::remove_file(source.path().join("content.dat.storageData")).unwrap();
        let err = Snapshot::open(source.path()).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");

        let missing = source.path().join("nope");
        assert!(Snapshot::open(&missing).unwrap_err().is_not_found());
    }

    #[test]
    fn test_configured_root_and_children_attribute() {
        let mut cache = project();
        let custom = ChildrenCodec::encode(RecordId::new(2), &[RecordId::new(4)]);
        cache.attribute(2, "custom.children", &custom);
        let source = cache.write_temp();

        let config = ViewerConfig {
            root_id: Some(2),
            children_attribute: "custom.children".to_string(),
            ..ViewerConfig::default()
        };
        let snapshot = Snapshot::open_with(source.path(), &config).unwrap();
        assert_eq!(snapshot.root().unwrap(), RecordId::new(2));
        assert_eq!(
            snapshot.children_of(RecordId::new(2)).unwrap(),
            vec![RecordId::new(4)]
        );

        let default = Snapshot::open(source.path()).unwrap();
        assert_eq!(default.children_attribute(), CHILDREN);
        assert_eq!(default.child_count_of(RecordId::new(2)).unwrap(), 2);
    }

    #[test]
    fn test_freed_roots_are_skipped() {
        let mut cache = CacheFixture::new();
        let freed = cache.dir(0, "old-project");
        cache.file(freed, "stale.txt", None);
        let live = cache.dir(0, "/");
        cache.flags(freed, RecordFlags::IS_DIRECTORY | RecordFlags::FREE_RECORD);
        let snapshot = cache.open();

        assert_eq!(snapshot.roots(), vec![RecordId::new(live)]);
        assert_eq!(snapshot.root().unwrap(), RecordId::new(live));
        // Still readable by id
        assert!(snapshot.is_flag_set(RecordId::new(freed), RecordFlags::FREE_RECORD).unwrap());
    }

    #[test]
    fn test_concurrent_decoding_matches_sequential() {
        let mut cache = CacheFixture::new();
        let root = cache.dir(0, "/");
        for d in 0..8 {
            let dir = cache.dir(root, &format!("dir{d}"));
            for f in 0..12 {
                let body = format!("file {d}/{f}").into_bytes();
                cache.file(dir, &format!("f{f}.txt"), Some(&body));
            }
        }
        let snapshot = Arc::new(cache.open());

        let decode = |snapshot: &Snapshot, id: RecordId| {
            (
                snapshot.resolve_name(id).unwrap().to_string(),
                snapshot.record(id).unwrap(),
                snapshot.children_of(id).unwrap(),
                snapshot.read_content(id).unwrap(),
            )
        };
        let ids: Vec<_> = snapshot.records().ids().collect();
        let sequential: Vec<_> = ids.iter().map(|&id| decode(&snapshot, id)).collect();

        let threads = 4;
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let snapshot = Arc::clone(&snapshot);
                let ids: Vec<_> = ids.iter().copied().skip(t).step_by(threads).collect();
                std::thread::spawn(move || {
                    ids.into_iter()
                        .map(|id| (id, decode(&snapshot, id)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for (id, decoded) in handle.join().unwrap() {
                assert_eq!(decoded, sequential[id.get() as usize - 1]);
            }
        }
    }
}
