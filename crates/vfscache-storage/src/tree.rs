//! Per-snapshot arena of presentation nodes
//!
//! A node wraps one record id and lazily derives what a tree view needs:
//! display name, whether content is cached, size on disk and a sorted child
//! list. Every derived value is computed at most once per snapshot.
//!
//! Nodes refer to their parent by record id, never by pointer. The parent is
//! the node a record was first reached through, which is what loop detection
//! and `path()` walk. A node opened directly by id takes the parent stored in
//! its record instead.

use crate::memo::{Memo, MemoState};
use crate::snapshot::Snapshot;
use dashmap::DashMap;
use std::cmp::Reverse;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use vfscache_common::RecordId;

/// Counters for decode failures that were degraded for display
#[derive(Debug, Default)]
pub struct TreeStats {
    pub nodes: AtomicU64,
    pub name_failures: AtomicU64,
    pub children_failures: AtomicU64,
    pub content_failures: AtomicU64,
    pub loops: AtomicU64,
}

/// One record as presented in a tree
#[derive(Debug)]
pub struct Node {
    id: RecordId,
    parent: Option<RecordId>,
    is_directory: bool,
    name: Memo<Arc<str>>,
    cached_content: Memo<bool>,
    size: Memo<u64>,
    children: Memo<Arc<[RecordId]>>,
}

impl Node {
    fn new(snapshot: &Snapshot, id: RecordId, parent: Option<RecordId>) -> Self {
        let is_directory = snapshot.is_directory(id).unwrap_or_else(|e| {
            warn!("Failed to read flags of record {}: {}", id, e);
            false
        });
        Self {
            id,
            parent,
            is_directory,
            name: Memo::new(),
            cached_content: Memo::new(),
            size: Memo::new(),
            children: Memo::new(),
        }
    }

    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// Node this one was first reached through
    pub const fn parent(&self) -> Option<RecordId> {
        self.parent
    }

    pub const fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Display name, or the numeric id when the name cannot be resolved
    pub fn name(&self, snapshot: &Snapshot) -> Arc<str> {
        self.name.get_or_compute(|| match snapshot.resolve_name(self.id) {
            Ok(name) => Arc::from(name),
            Err(e) => {
                warn!("Failed to resolve name of record {}: {}", self.id, e);
                snapshot
                    .nodes()
                    .stats()
                    .name_failures
                    .fetch_add(1, Ordering::Relaxed);
                Arc::from(self.id.to_string())
            }
        })
    }

    /// True when the record points at a content blob
    pub fn has_cached_content(&self, snapshot: &Snapshot) -> bool {
        self.cached_content
            .get_or_compute(|| match snapshot.content_id_of(self.id) {
                Ok(content_id) => !content_id.is_none(),
                Err(e) => {
                    warn!("Failed to read content id of record {}: {}", self.id, e);
                    false
                }
            })
    }

    fn file_size(&self, snapshot: &Snapshot) -> u64 {
        if !self.has_cached_content(snapshot) {
            return 0;
        }
        let size = snapshot
            .content_id_of(self.id)
            .and_then(|content_id| snapshot.content_length(content_id));
        size.unwrap_or_else(|e| {
            warn!("Failed to read content length of record {}: {}", self.id, e);
            snapshot
                .nodes()
                .stats()
                .content_failures
                .fetch_add(1, Ordering::Relaxed);
            0
        })
    }

    /// Size on disk
    ///
    /// Files resolve immediately to their cached content length. Directories
    /// stay `Unknown` until the size aggregator has visited them.
    pub fn size_on_disk(&self, snapshot: &Snapshot) -> MemoState<u64> {
        if self.is_directory {
            self.size.state()
        } else {
            MemoState::Computed(self.size.get_or_compute(|| self.file_size(snapshot)))
        }
    }

    /// The compute-once cell behind [`Node::size_on_disk`]
    pub const fn size_cell(&self) -> &Memo<u64> {
        &self.size
    }

    /// True when `id` is this node or one of the nodes above it
    fn is_self_or_ancestor(&self, snapshot: &Snapshot, id: RecordId) -> bool {
        if id == self.id {
            return true;
        }
        let mut current = self.parent;
        // The chain cannot be longer than the table without looping itself
        let mut steps = snapshot.record_count();
        while let Some(parent) = current {
            if parent == id {
                return true;
            }
            if steps == 0 {
                return false;
            }
            steps -= 1;
            current = snapshot.nodes().find_or_create(snapshot, parent, None).parent;
        }
        false
    }

    fn load_children(&self, snapshot: &Snapshot) -> Arc<[RecordId]> {
        if !self.is_directory {
            return Arc::from(Vec::new());
        }

        let ids = match snapshot.children_of(self.id) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to decode children of record {}: {}", self.id, e);
                snapshot
                    .nodes()
                    .stats()
                    .children_failures
                    .fetch_add(1, Ordering::Relaxed);
                return Arc::from(Vec::new());
            }
        };

        let mut children = Vec::with_capacity(ids.len());
        for id in ids {
            if self.is_self_or_ancestor(snapshot, id) {
                debug!("Loop detected: record {} lists ancestor {}", self.id, id);
                snapshot.nodes().stats().loops.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            children.push(snapshot.nodes().find_or_create(snapshot, id, Some(self.id)));
        }

        children.sort_by_cached_key(|node| (Reverse(node.is_directory), node.name(snapshot)));
        children.iter().map(|node| node.id).collect()
    }

    /// Children sorted directories first, then by name
    ///
    /// Non-directories and directories whose children cannot be decoded have
    /// none.
    pub fn children(&self, snapshot: &Snapshot) -> Vec<Arc<Node>> {
        let ids = self.children.get_or_compute(|| self.load_children(snapshot));
        ids.iter()
            .map(|&id| snapshot.nodes().find_or_create(snapshot, id, Some(self.id)))
            .collect()
    }

    /// Slash-separated names from the top of the tree down to this node
    pub fn path(&self, snapshot: &Snapshot) -> String {
        let Some(mut parent) = self.parent else {
            return "/".to_string();
        };

        let mut names = vec![self.name(snapshot)];
        let mut steps = snapshot.record_count();
        loop {
            let node = snapshot.nodes().find_or_create(snapshot, parent, None);
            let Some(next) = node.parent else {
                break;
            };
            names.push(node.name(snapshot));
            if steps == 0 {
                break;
            }
            steps -= 1;
            parent = next;
        }

        let mut path = String::new();
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name);
        }
        path
    }
}

fn stored_parent(snapshot: &Snapshot, id: RecordId) -> Option<RecordId> {
    match snapshot.parent_of(id) {
        Ok(parent) if parent.is_none() || parent == id => None,
        Ok(parent) => Some(parent),
        Err(e) => {
            debug!("Record {} has no readable parent: {}", id, e);
            None
        }
    }
}

/// Record id -> node map owned by one snapshot
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: DashMap<RecordId, Arc<Node>>,
    stats: TreeStats,
}

impl NodeArena {
    /// Node for `id`, created with `parent` if it does not exist yet
    ///
    /// Without a traversal parent the record's own parent is used; a zero or
    /// unreadable parent makes the node a root.
    pub fn find_or_create(
        &self,
        snapshot: &Snapshot,
        id: RecordId,
        parent: Option<RecordId>,
    ) -> Arc<Node> {
        if let Some(node) = self.nodes.get(&id) {
            return Arc::clone(node.value());
        }
        let parent = parent.or_else(|| stored_parent(snapshot, id));
        let node = Arc::new(Node::new(snapshot, id, parent));
        let entry = self.nodes.entry(id).or_insert_with(|| {
            self.stats.nodes.fetch_add(1, Ordering::Relaxed);
            node
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, id: RecordId) -> Option<Arc<Node>> {
        self.nodes.get(&id).map(|node| Arc::clone(node.value()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub const fn stats(&self) -> &TreeStats {
        &self.stats
    }
}
