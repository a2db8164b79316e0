//! Property sheet of a single record

use crate::snapshot::Snapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use vfscache_common::{ContentId, RecordFlags, RecordId, Result};

/// Everything known about one record, gathered in one pass
///
/// Secondary lookups that fail are reported in `warnings` and leave their
/// field at zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordInfo {
    pub id: RecordId,
    pub name: String,
    pub parent_id: RecordId,
    pub content_id: ContentId,
    pub content_ref_count: u32,
    pub content_size: u64,
    pub child_count: usize,
    pub timestamp: i64,
    pub mod_count: i32,
    pub length: i64,
    pub flags: BTreeMap<&'static str, bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RecordInfo {
    /// Collect the properties of `id`
    ///
    /// Fails only when the record itself cannot be read.
    pub fn collect(snapshot: &Snapshot, id: RecordId) -> Result<Self> {
        let record = snapshot.record(id)?;
        let mut warnings = Vec::new();

        let name = snapshot.resolve_name(id).map_or_else(
            |e| {
                warnings.push(format!("name: {e}"));
                id.to_string()
            },
            str::to_string,
        );

        let (content_ref_count, content_size) = if record.content_id.is_none() {
            (0, 0)
        } else {
            let ref_count = snapshot
                .content_ref_count(record.content_id)
                .unwrap_or_else(|e| {
                    warnings.push(format!("content reference count: {e}"));
                    0
                });
            let size = snapshot
                .content_length(record.content_id)
                .unwrap_or_else(|e| {
                    warnings.push(format!("content size: {e}"));
                    0
                });
            (ref_count, size)
        };

        let child_count = if record.is_directory() {
            snapshot.child_count_of(id).unwrap_or_else(|e| {
                warnings.push(format!("child count: {e}"));
                0
            })
        } else {
            0
        };

        let flags = RecordFlags::ALL
            .iter()
            .map(|&(flag_name, flag)| (flag_name, record.flags.contains(flag)))
            .collect();

        Ok(Self {
            id,
            name,
            parent_id: record.parent_id,
            content_id: record.content_id,
            content_ref_count,
            content_size,
            child_count,
            timestamp: record.timestamp,
            mod_count: record.mod_count,
            length: record.length,
            flags,
            warnings,
        })
    }
}
