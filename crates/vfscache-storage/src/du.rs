//! Directory size aggregation
//!
//! One task per directory on a fixed-size runtime. A task decodes its
//! directory on the blocking pool, sums the cached content of its files,
//! spawns a subtask for every subdirectory nobody has claimed yet, joins
//! them and publishes its own total exactly once. Decode failures shrink a
//! subtree to zero instead of failing the walk.

use crate::memo::MemoState;
use crate::snapshot::Snapshot;
use crate::tree::Node;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::JoinError;
use tracing::{debug, info, warn};
use vfscache_common::{Error, RecordId, Result};

/// Progress of a single directory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskSizeEvent {
    Started,
    Done,
}

/// Receives progress for the direct children of the walk root
pub trait DiskSizeListener: Send + Sync {
    fn on_event(&self, event: DiskSizeEvent, node: &Node);
}

type Listener = Option<Arc<dyn DiskSizeListener>>;

/// Runs size aggregations on its own worker pool
pub struct DiskSizeComputer {
    runtime: Runtime,
    workers: usize,
    listener: Listener,
}

impl std::fmt::Debug for DiskSizeComputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskSizeComputer")
            .field("workers", &self.workers)
            .field("listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl DiskSizeComputer {
    /// Create a computer with `workers` async workers and as many blocking
    /// decode threads
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::configuration("workers must be at least 1"));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(workers)
            .thread_name("vfscache-du")
            .build()?;
        Ok(Self {
            runtime,
            workers,
            listener: None,
        })
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn DiskSizeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Total cached size below `root`, blocking until the walk finishes
    pub fn compute(&self, snapshot: &Arc<Snapshot>, root: RecordId) -> Result<u64> {
        snapshot.record(root)?;
        let total = self.runtime.block_on(aggregate(
            Arc::clone(snapshot),
            root,
            self.listener.clone(),
        ));
        info!("Size of record {} is {} bytes", root, total);
        Ok(total)
    }
}

/// Compute and publish the size of `root` and every directory below it
///
/// Must run inside a multi-threaded tokio runtime.
pub async fn aggregate(
    snapshot: Arc<Snapshot>,
    root: RecordId,
    listener: Option<Arc<dyn DiskSizeListener>>,
) -> u64 {
    let node = snapshot.node(root);
    if !node.is_directory() {
        let size = node.size_on_disk(&snapshot);
        return size_or_zero(size);
    }
    if !node.size_cell().try_begin() {
        let state = node.size_cell().state();
        debug!("Size of record {} already claimed: {:?}", root, state);
        return size_or_zero(state);
    }
    size_task(snapshot, node, 0, listener).await
}

fn size_or_zero(state: MemoState<u64>) -> u64 {
    match state {
        MemoState::Computed(size) => size,
        _ => 0,
    }
}

fn notify(listener: &Listener, event: DiskSizeEvent, node: &Node) {
    if let Some(listener) = listener {
        listener.on_event(event, node);
    }
}

/// Size reported by a joined subtask
///
/// A subtask that died never published its total, so its claimed cell is
/// completed with zero here.
fn settle(child: &Node, result: std::result::Result<u64, JoinError>) -> u64 {
    match result {
        Ok(size) => size,
        Err(e) => {
            warn!("Size task for record {} failed: {}", child.id(), e);
            child.size_cell().complete(0);
            0
        }
    }
}

/// Size of one claimed directory; `depth` is 0 for the walk root
fn size_task(
    snapshot: Arc<Snapshot>,
    node: Arc<Node>,
    depth: usize,
    listener: Listener,
) -> BoxFuture<'static, u64> {
    async move {
        let decoded = {
            let snapshot = Arc::clone(&snapshot);
            let node = Arc::clone(&node);
            tokio::task::spawn_blocking(move || {
                let mut files = 0u64;
                let mut directories = Vec::new();
                for child in node.children(&snapshot) {
                    if child.is_directory() {
                        directories.push(child);
                    } else {
                        files += size_or_zero(child.size_on_disk(&snapshot));
                    }
                }
                (files, directories)
            })
            .await
        };
        let (mut total, directories) = decoded.unwrap_or_else(|e| {
            warn!("Decoding record {} failed: {}", node.id(), e);
            (0, Vec::new())
        });

        let mut claimed = Vec::with_capacity(directories.len());
        let mut subtasks = Vec::with_capacity(directories.len());
        for child in directories {
            if child.size_cell().try_begin() {
                if depth == 0 {
                    notify(&listener, DiskSizeEvent::Started, &child);
                }
                subtasks.push(tokio::spawn(size_task(
                    Arc::clone(&snapshot),
                    Arc::clone(&child),
                    depth + 1,
                    listener.clone(),
                )));
                claimed.push(child);
            } else if let Some(size) = child.size_cell().get() {
                total += size;
            } else {
                debug!(
                    "Record {} is being sized by another task, counting 0",
                    child.id()
                );
            }
        }

        for (child, result) in claimed.iter().zip(join_all(subtasks).await) {
            total += settle(child, result);
        }

        node.size_cell().complete(total);
        if depth == 1 {
            notify(&listener, DiskSizeEvent::Done, &node);
        }
        total
    }
    .boxed()
}
