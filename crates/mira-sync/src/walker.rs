// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Source address-space traversal.
//!
//! The [`TreeWalker`] turns a live node graph into a stream of
//! [`NodeSnapshot`]s. Traversal is depth-first pre-order, so a parent's
//! snapshot is always emitted before its children's and Create ordering
//! falls out of walk order downstream.
//!
//! # Failure Policy
//!
//! - A node whose id was already visited in this walk is recorded as a
//!   back-reference: it is not re-descended and does not appear twice in
//!   the output. This makes cyclic graphs terminate.
//! - Attribute or value read failures leave the field absent; the node is
//!   still emitted.
//! - Child enumeration failure marks the snapshot `partial`, records the
//!   node in the walk error set, and the walk continues. Partial subtrees
//!   are later excluded from delete inference.
//!
//! The walk is lazy: snapshots stream through a bounded channel while
//! traversal continues, bounding memory for very large address spaces. It is
//! restartable from any root but not resumable mid-traversal; cancellation
//! stops at the next node boundary.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use mira_core::cancel::CancelToken;
use mira_core::session::SourceSession;
use mira_core::snapshot::NodeSnapshot;
use mira_core::types::{NodeClass, NodeId};

/// Default bound on the snapshot channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// WalkReport
// =============================================================================

/// Summary of a finished (or cancelled) walk.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Nodes whose child enumeration failed. Their snapshots are `partial`.
    pub errors: HashSet<NodeId>,

    /// Number of snapshots emitted.
    pub emitted: usize,

    /// Number of already-visited children encountered (cycle or diamond
    /// back-references).
    pub back_references: usize,

    /// `true` if the walk stopped at a node boundary due to cancellation.
    pub cancelled: bool,
}

impl WalkReport {
    /// Returns `true` if the walk completed without enumeration failures.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.errors.is_empty()
    }
}

// =============================================================================
// WalkHandle
// =============================================================================

/// Consumer side of an in-progress walk.
///
/// Snapshots can be drained one at a time with [`next`](WalkHandle::next)
/// while the traversal is still running, or gathered wholesale with
/// [`collect`](WalkHandle::collect).
#[derive(Debug)]
pub struct WalkHandle {
    receiver: mpsc::Receiver<NodeSnapshot>,
    report: oneshot::Receiver<WalkReport>,
}

impl WalkHandle {
    /// Returns the next snapshot, or `None` once the walk has finished.
    pub async fn next(&mut self) -> Option<NodeSnapshot> {
        self.receiver.recv().await
    }

    /// Drains the remaining snapshots and returns them with the walk report.
    pub async fn collect(mut self) -> (Vec<NodeSnapshot>, WalkReport) {
        let mut snapshots = Vec::new();
        while let Some(snapshot) = self.receiver.recv().await {
            snapshots.push(snapshot);
        }
        let report = self.report.await.unwrap_or_default();
        (snapshots, report)
    }
}

// =============================================================================
// TreeWalker
// =============================================================================

/// Depth-first, cycle-safe traversal of a source session's node graph.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    channel_capacity: usize,
}

impl TreeWalker {
    /// Creates a walker with the default channel bound.
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Creates a walker with a custom channel bound.
    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Starts walking from `root` on a background task.
    ///
    /// The returned handle yields snapshots as they are captured; the walk
    /// keeps running while the consumer lags, up to the channel bound.
    pub fn walk(
        &self,
        session: Arc<dyn SourceSession>,
        root: NodeId,
        cancel: CancelToken,
    ) -> WalkHandle {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let (report_tx, report_rx) = oneshot::channel();

        tokio::spawn(async move {
            let report = traverse(session, root, cancel, tx).await;
            let _ = report_tx.send(report);
        });

        WalkHandle {
            receiver: rx,
            report: report_rx,
        }
    }
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Traversal
// =============================================================================

async fn traverse(
    session: Arc<dyn SourceSession>,
    root: NodeId,
    cancel: CancelToken,
    tx: mpsc::Sender<NodeSnapshot>,
) -> WalkReport {
    let mut report = WalkReport::default();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(root, None)];

    while let Some((id, parent)) = stack.pop() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            debug!(emitted = report.emitted, "walk cancelled at node boundary");
            break;
        }

        // A child reachable through more than one path (or through a cycle)
        // is emitted exactly once; later sightings are back-references.
        if !visited.insert(id.clone()) {
            report.back_references += 1;
            continue;
        }

        let snapshot = capture(session.as_ref(), id, parent, &mut report).await;

        // Descend only into mirrored classes; unsupported nodes are leaves.
        for child in snapshot.children.iter().rev() {
            stack.push((child.clone(), Some(snapshot.id.clone())));
        }

        report.emitted += 1;
        if tx.send(snapshot).await.is_err() {
            // Consumer dropped the handle; nothing left to report to.
            break;
        }
    }

    report
}

/// Captures a single node, absorbing per-node read failures.
async fn capture(
    session: &dyn SourceSession,
    id: NodeId,
    parent: Option<NodeId>,
    report: &mut WalkReport,
) -> NodeSnapshot {
    let (display_name, class, attrs_failed) = match session.attributes(&id).await {
        Ok(attrs) => (attrs.display_name, attrs.class, false),
        Err(err) => {
            // Without attributes the class is unknown; treat the node as an
            // unmirrored leaf but keep it in the output so it is never
            // inferred as deleted.
            warn!(node = %id, error = %err, "attribute read failed, emitting placeholder");
            (id.to_string(), NodeClass::Unsupported(0), true)
        }
    };

    let value = if class.has_value() {
        session.value(&id).await.ok()
    } else {
        None
    };

    let (children, partial) = if class.is_mirrored() {
        match session.children(&id).await {
            Ok(children) => (children, false),
            Err(err) => {
                warn!(node = %id, error = %err, "child enumeration failed, marking partial");
                report.errors.insert(id.clone());
                (Vec::new(), true)
            }
        }
    } else {
        (Vec::new(), false)
    };

    let snapshot = NodeSnapshot {
        id,
        display_name,
        class,
        value,
        children,
        parent,
        // An attribute failure also guards the node's previously mirrored
        // descendants from delete inference.
        partial: partial || attrs_failed,
    };
    if snapshot.partial {
        report.errors.insert(snapshot.id.clone());
    }
    snapshot
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use mira_core::memory::MemoryAddressSpace;
    use mira_core::session::TargetSession;
    use mira_core::types::Value;

    async fn seeded_space() -> (Arc<MemoryAddressSpace>, NodeId, NodeId, NodeId) {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();
        let device = space.create_object(&root, "Device1").await.unwrap();
        let temp = space
            .create_variable(&device, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();
        (space, root, device, temp)
    }

    #[tokio::test]
    async fn walk_emits_parents_before_children() {
        let (space, root, device, temp) = seeded_space().await;

        let handle = TreeWalker::new().walk(space, root.clone(), CancelToken::new());
        let (snapshots, report) = handle.collect().await;

        let order: Vec<&NodeId> = snapshots.iter().map(|s| &s.id).collect();
        assert_eq!(order, vec![&root, &device, &temp]);
        assert!(report.is_complete());
        assert_eq!(report.emitted, 3);
    }

    #[tokio::test]
    async fn walk_records_parent_links() {
        let (space, root, device, temp) = seeded_space().await;

        let (snapshots, _) = TreeWalker::new()
            .walk(space, root.clone(), CancelToken::new())
            .collect()
            .await;

        let by_id = |id: &NodeId| snapshots.iter().find(|s| &s.id == id).unwrap();
        assert_eq!(by_id(&root).parent, None);
        assert_eq!(by_id(&device).parent, Some(root.clone()));
        assert_eq!(by_id(&temp).parent, Some(device));
    }

    #[tokio::test]
    async fn walk_is_cycle_safe() {
        let (space, root, device, _temp) = seeded_space().await;
        // Nested -> Device1 back-edge makes the graph cyclic.
        let nested = space.create_object(&device, "Nested").await.unwrap();
        space.link_child(&nested, &device);

        let (snapshots, report) = TreeWalker::new()
            .walk(space, root, CancelToken::new())
            .collect()
            .await;

        // Device1 appears exactly once despite the cycle, and the walk is finite.
        let device_count = snapshots.iter().filter(|s| s.id == device).count();
        assert_eq!(device_count, 1);
        assert_eq!(report.back_references, 1);

        // The back-reference is still listed among Nested's children.
        let nested_snap = snapshots.iter().find(|s| s.id == nested).unwrap();
        assert!(nested_snap.children.contains(&device));
    }

    #[tokio::test]
    async fn unreadable_value_leaves_field_absent() {
        let (space, root, _device, temp) = seeded_space().await;
        space.set_unreadable(&temp);

        let (snapshots, report) = TreeWalker::new()
            .walk(space, root, CancelToken::new())
            .collect()
            .await;

        let temp_snap = snapshots.iter().find(|s| s.id == temp).unwrap();
        assert!(temp_snap.value.is_none());
        assert!(!temp_snap.partial);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_at_node_boundary() {
        let (space, root, _device, _temp) = seeded_space().await;

        let cancel = CancelToken::new();
        cancel.cancel();

        let (snapshots, report) = TreeWalker::new().walk(space, root, cancel).collect().await;
        assert!(snapshots.is_empty());
        assert!(report.cancelled);
    }

    #[tokio::test]
    async fn walk_streams_lazily() {
        let (space, root, _device, _temp) = seeded_space().await;

        // Capacity of 1 forces the walker to block on the consumer.
        let mut handle = TreeWalker::with_capacity(1).walk(space, root.clone(), CancelToken::new());
        let first = handle.next().await.unwrap();
        assert_eq!(first.id, root);

        // Remaining snapshots are still delivered.
        let mut rest = 0;
        while handle.next().await.is_some() {
            rest += 1;
        }
        assert_eq!(rest, 2);
    }
}
