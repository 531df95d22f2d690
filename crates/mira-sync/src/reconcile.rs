// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Snapshot reconciliation.
//!
//! The [`Reconciler`] diffs the mirror table (what the target is known to
//! hold) against a fresh snapshot set and produces the minimal operation
//! sequence that brings the target in line:
//!
//! - Creates for nodes new to the walk, ordered parents-before-children
//!   (pre-order walk order is already topological; a cycle back-reference is
//!   never a structural parent edge)
//! - Updates for nodes whose value hash or display name changed
//! - Deletes for previously mirrored nodes missing from the walk, ordered
//!   children-before-parent, unless the node sits under a `partial` snapshot
//!   (a transient enumeration failure must never cascade into deletes)
//!
//! Reconciliation is pure: no I/O, and identical inputs always produce an
//! identical operation sequence, which is what makes the diff layer
//! deterministic to test.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mira_core::snapshot::NodeSnapshot;
use mira_core::types::{optional_content_hash, NodeClass, NodeId, Value};

// =============================================================================
// MirrorRecord
// =============================================================================

/// Persistent mapping from one source node to its mirror on the target.
///
/// Records are created on first successful create, refreshed on successful
/// write, and removed on successful delete; the table and the target's nodes
/// stay 1:1 for the mirror's entire life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    /// Source-side identity.
    pub source_id: NodeId,

    /// Target-side identity returned by the create call.
    pub target_id: NodeId,

    /// Source-side structural parent. `None` for the mirror root.
    pub parent: Option<NodeId>,

    /// Node class at creation time.
    pub class: NodeClass,

    /// Display name last written to the target.
    pub display_name: String,

    /// Content hash of the value last written to the target.
    pub value_hash: u64,

    /// Position in the source walk, used as the stable sibling tie-break.
    pub walk_order: u64,

    /// When the record was last confirmed against the target.
    pub last_sync: DateTime<Utc>,
}

// =============================================================================
// MirrorTable
// =============================================================================

/// The `NodeId -> MirrorRecord` map owned by the sync engine.
///
/// Insertion assigns a monotonic walk-order stamp so that delete sequencing
/// can fall back to source-walk order for siblings.
#[derive(Debug, Default)]
pub struct MirrorTable {
    records: HashMap<NodeId, MirrorRecord>,
    next_order: u64,
}

impl MirrorTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a freshly created mirror record.
    pub fn insert(
        &mut self,
        source_id: NodeId,
        target_id: NodeId,
        parent: Option<NodeId>,
        class: NodeClass,
        display_name: String,
        value_hash: u64,
    ) {
        let order = self.next_order;
        self.next_order += 1;
        self.records.insert(
            source_id.clone(),
            MirrorRecord {
                source_id,
                target_id,
                parent,
                class,
                display_name,
                value_hash,
                walk_order: order,
                last_sync: Utc::now(),
            },
        );
    }

    /// Returns the record for a source node.
    pub fn get(&self, source_id: &NodeId) -> Option<&MirrorRecord> {
        self.records.get(source_id)
    }

    /// Returns the record for a source node, mutably.
    pub fn get_mut(&mut self, source_id: &NodeId) -> Option<&mut MirrorRecord> {
        self.records.get_mut(source_id)
    }

    /// Removes the record for a source node.
    pub fn remove(&mut self, source_id: &NodeId) -> Option<MirrorRecord> {
        self.records.remove(source_id)
    }

    /// Returns `true` if the source node is mirrored.
    pub fn contains(&self, source_id: &NodeId) -> bool {
        self.records.contains_key(source_id)
    }

    /// Number of mirrored nodes.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is mirrored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over all records.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &MirrorRecord)> {
        self.records.iter()
    }

    /// Depth of a record in the previously mirrored tree (root = 0).
    ///
    /// Follows parent links through the table with a visited guard so a
    /// corrupted chain cannot loop.
    fn depth_of(&self, source_id: &NodeId) -> usize {
        let mut depth = 0;
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut current = self.records.get(source_id);

        while let Some(record) = current {
            match &record.parent {
                Some(parent) if seen.insert(parent) => {
                    depth += 1;
                    current = self.records.get(parent);
                }
                _ => break,
            }
        }
        depth
    }

    /// Returns `true` if `source_id` or any of its previous-tree ancestors
    /// is flagged partial in the current walk.
    fn covered_by_partial(&self, source_id: &NodeId, partial: &HashSet<&NodeId>) -> bool {
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut current = self.records.get(source_id);

        while let Some(record) = current {
            match &record.parent {
                Some(parent) => {
                    if partial.contains(parent) {
                        return true;
                    }
                    if !seen.insert(parent) {
                        break;
                    }
                    current = self.records.get(parent);
                }
                None => break,
            }
        }
        false
    }
}

// =============================================================================
// Operation
// =============================================================================

/// One mutation of the target, immutable once emitted.
///
/// Each operation is tagged with the source node it concerns; creates also
/// carry the source-side parent so the applier can resolve the target parent
/// through the mirror table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create an Object node.
    CreateObject {
        /// Source node being mirrored.
        node: NodeId,
        /// Source-side parent; `None` attaches to the configured target root.
        parent: Option<NodeId>,
        /// Display name to create with.
        display_name: String,
    },

    /// Create a Variable node with an optional initial value.
    CreateVariable {
        /// Source node being mirrored.
        node: NodeId,
        /// Source-side parent; `None` attaches to the configured target root.
        parent: Option<NodeId>,
        /// Display name to create with.
        display_name: String,
        /// Initial value; absent when the source value was unreadable.
        value: Option<Value>,
    },

    /// Push a new value (and refreshed display name) to the mirror.
    UpdateValue {
        /// Source node whose mirror is updated.
        node: NodeId,
        /// Current display name.
        display_name: String,
        /// New value; absent when the source value became unreadable.
        value: Option<Value>,
    },

    /// Remove the mirror node.
    Delete {
        /// Source node whose mirror is removed.
        node: NodeId,
    },
}

impl Operation {
    /// Returns the source node this operation concerns.
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::CreateObject { node, .. }
            | Self::CreateVariable { node, .. }
            | Self::UpdateValue { node, .. }
            | Self::Delete { node } => node,
        }
    }

    /// Returns the source-side parent for create operations.
    pub fn parent(&self) -> Option<&NodeId> {
        match self {
            Self::CreateObject { parent, .. } | Self::CreateVariable { parent, .. } => {
                parent.as_ref()
            }
            _ => None,
        }
    }

    /// Returns `true` for create operations.
    pub fn is_create(&self) -> bool {
        matches!(self, Self::CreateObject { .. } | Self::CreateVariable { .. })
    }

    /// Returns the operation kind label used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateObject { .. } => "create-object",
            Self::CreateVariable { .. } => "create-variable",
            Self::UpdateValue { .. } => "update-value",
            Self::Delete { .. } => "delete",
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Pure diff between the mirror table and a fresh snapshot set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Produces the ordered operation sequence that brings the target in
    /// line with `current`.
    ///
    /// `current` must be in walk order (parents before children), which the
    /// walker guarantees.
    pub fn reconcile(previous: &MirrorTable, current: &[NodeSnapshot]) -> Vec<Operation> {
        let current_ids: HashSet<&NodeId> = current.iter().map(|s| &s.id).collect();
        let partial_ids: HashSet<&NodeId> =
            current.iter().filter(|s| s.partial).map(|s| &s.id).collect();

        let mut operations = Vec::new();

        // Creates and updates, in walk order. Pre-order walk order already
        // places every parent's create before its children's.
        for snapshot in current {
            if !snapshot.is_mirrored() {
                continue;
            }

            match previous.get(&snapshot.id) {
                None => operations.push(Self::create_for(snapshot)),
                Some(record) => {
                    let hash = optional_content_hash(snapshot.value.as_ref());
                    if hash != record.value_hash || snapshot.display_name != record.display_name {
                        operations.push(Operation::UpdateValue {
                            node: snapshot.id.clone(),
                            display_name: snapshot.display_name.clone(),
                            value: snapshot.value.clone(),
                        });
                    }
                }
            }
        }

        // Deletes: previously mirrored nodes missing from this walk, unless
        // shielded by a partial subtree. Children delete before parents;
        // siblings keep source-walk order.
        let mut delete_candidates: Vec<(&NodeId, usize, u64)> = previous
            .iter()
            .filter(|(id, _)| !current_ids.contains(*id))
            .filter(|(id, _)| {
                !partial_ids.contains(*id) && !previous.covered_by_partial(id, &partial_ids)
            })
            .map(|(id, record)| (id, previous.depth_of(id), record.walk_order))
            .collect();

        delete_candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        operations.extend(delete_candidates.into_iter().map(|(id, _, _)| Operation::Delete {
            node: id.clone(),
        }));

        operations
    }

    fn create_for(snapshot: &NodeSnapshot) -> Operation {
        match snapshot.class {
            NodeClass::Variable => Operation::CreateVariable {
                node: snapshot.id.clone(),
                parent: snapshot.parent.clone(),
                display_name: snapshot.display_name.clone(),
                value: snapshot.value.clone(),
            },
            // Only mirrored classes reach this point.
            _ => Operation::CreateObject {
                node: snapshot.id.clone(),
                parent: snapshot.parent.clone(),
                display_name: snapshot.display_name.clone(),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NodeId {
        NodeId::numeric(2, n)
    }

    /// root(1) -> device(2) -> temp(3)=20
    fn three_level_tree() -> Vec<NodeSnapshot> {
        vec![
            NodeSnapshot::object(id(1), "Objects").with_children(vec![id(2)]),
            NodeSnapshot::object(id(2), "Device1")
                .with_parent(id(1))
                .with_children(vec![id(3)]),
            NodeSnapshot::variable(id(3), "temp", Some(Value::Int32(20))).with_parent(id(2)),
        ]
    }

    /// Applies the effects of `operations` to `table` as a perfect target would.
    fn apply_effects(table: &mut MirrorTable, operations: &[Operation]) {
        for (n, op) in operations.iter().enumerate() {
            match op {
                Operation::CreateObject {
                    node,
                    parent,
                    display_name,
                } => table.insert(
                    node.clone(),
                    NodeId::numeric(9, 1000 + n as u32),
                    parent.clone(),
                    NodeClass::Object,
                    display_name.clone(),
                    0,
                ),
                Operation::CreateVariable {
                    node,
                    parent,
                    display_name,
                    value,
                } => table.insert(
                    node.clone(),
                    NodeId::numeric(9, 1000 + n as u32),
                    parent.clone(),
                    NodeClass::Variable,
                    display_name.clone(),
                    optional_content_hash(value.as_ref()),
                ),
                Operation::UpdateValue {
                    node,
                    display_name,
                    value,
                } => {
                    let record = table.get_mut(node).unwrap();
                    record.display_name = display_name.clone();
                    record.value_hash = optional_content_hash(value.as_ref());
                }
                Operation::Delete { node } => {
                    table.remove(node);
                }
            }
        }
    }

    #[test]
    fn initial_sync_creates_everything_in_order() {
        let table = MirrorTable::new();
        let ops = Reconciler::reconcile(&table, &three_level_tree());

        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].node_id(), &id(1));
        assert_eq!(ops[1].node_id(), &id(2));
        assert_eq!(ops[2].node_id(), &id(3));
        assert!(ops.iter().take(2).all(|op| op.kind() == "create-object"));
        assert_eq!(ops[2].kind(), "create-variable");
    }

    #[test]
    fn reconcile_is_idempotent_after_effects() {
        let mut table = MirrorTable::new();
        let current = three_level_tree();

        let first = Reconciler::reconcile(&table, &current);
        apply_effects(&mut table, &first);

        let second = Reconciler::reconcile(&table, &current);
        assert!(second.is_empty(), "expected no ops, got {:?}", second);
    }

    #[test]
    fn value_change_emits_single_update() {
        let mut table = MirrorTable::new();
        let mut current = three_level_tree();
        { let __eff = Reconciler::reconcile(&table, &current); apply_effects(&mut table, &__eff); }

        current[2].value = Some(Value::Int32(21));
        let ops = Reconciler::reconcile(&table, &current);

        assert_eq!(
            ops,
            vec![Operation::UpdateValue {
                node: id(3),
                display_name: "temp".to_string(),
                value: Some(Value::Int32(21)),
            }]
        );
    }

    #[test]
    fn display_name_change_emits_update() {
        let mut table = MirrorTable::new();
        let mut current = three_level_tree();
        { let __eff = Reconciler::reconcile(&table, &current); apply_effects(&mut table, &__eff); }

        current[1].display_name = "Device1-renamed".to_string();
        let ops = Reconciler::reconcile(&table, &current);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].node_id(), &id(2));
        assert_eq!(ops[0].kind(), "update-value");
    }

    #[test]
    fn removed_subtree_deletes_children_first() {
        let mut table = MirrorTable::new();
        { let __eff = Reconciler::reconcile(&table, &three_level_tree()); apply_effects(&mut table, &__eff); }

        // Device1 and temp are gone; only the root remains.
        let current = vec![NodeSnapshot::object(id(1), "Objects")];
        let ops = Reconciler::reconcile(&table, &current);

        assert_eq!(
            ops,
            vec![
                Operation::Delete { node: id(3) },
                Operation::Delete { node: id(2) },
            ]
        );
    }

    #[test]
    fn empty_current_deletes_bottom_up() {
        let mut table = MirrorTable::new();
        { let __eff = Reconciler::reconcile(&table, &three_level_tree()); apply_effects(&mut table, &__eff); }

        let ops = Reconciler::reconcile(&table, &[]);
        let order: Vec<&NodeId> = ops.iter().map(|op| op.node_id()).collect();
        assert_eq!(order, vec![&id(3), &id(2), &id(1)]);
        assert!(ops.iter().all(|op| op.kind() == "delete"));
    }

    #[test]
    fn partial_subtree_suppresses_deletes() {
        let mut table = MirrorTable::new();
        { let __eff = Reconciler::reconcile(&table, &three_level_tree()); apply_effects(&mut table, &__eff); }

        // Device1's enumeration failed this cycle: its snapshot is partial
        // and temp is missing from the walk.
        let current = vec![
            NodeSnapshot::object(id(1), "Objects").with_children(vec![id(2)]),
            NodeSnapshot::object(id(2), "Device1")
                .with_parent(id(1))
                .mark_partial(),
        ];

        let ops = Reconciler::reconcile(&table, &current);
        assert!(
            ops.is_empty(),
            "partial subtree must never infer deletes, got {:?}",
            ops
        );
    }

    #[test]
    fn partial_shields_deep_descendants() {
        let mut table = MirrorTable::new();
        let current = vec![
            NodeSnapshot::object(id(1), "Objects").with_children(vec![id(2)]),
            NodeSnapshot::object(id(2), "Area")
                .with_parent(id(1))
                .with_children(vec![id(3)]),
            NodeSnapshot::object(id(3), "Device1")
                .with_parent(id(2))
                .with_children(vec![id(4)]),
            NodeSnapshot::variable(id(4), "temp", Some(Value::Int32(1))).with_parent(id(3)),
        ];
        { let __eff = Reconciler::reconcile(&table, &current); apply_effects(&mut table, &__eff); }

        // The top-level Area fails enumeration: everything below vanishes
        // from the walk but nothing may be deleted.
        let degraded = vec![
            NodeSnapshot::object(id(1), "Objects").with_children(vec![id(2)]),
            NodeSnapshot::object(id(2), "Area")
                .with_parent(id(1))
                .mark_partial(),
        ];

        let ops = Reconciler::reconcile(&table, &degraded);
        assert!(ops.is_empty());
    }

    #[test]
    fn genuinely_removed_sibling_still_deletes_next_to_partial() {
        let mut table = MirrorTable::new();
        let current = vec![
            NodeSnapshot::object(id(1), "Objects").with_children(vec![id(2), id(3)]),
            NodeSnapshot::object(id(2), "A").with_parent(id(1)),
            NodeSnapshot::object(id(3), "B").with_parent(id(1)),
        ];
        { let __eff = Reconciler::reconcile(&table, &current); apply_effects(&mut table, &__eff); }

        // A fails enumeration; B is genuinely gone. B's parent (the root)
        // enumerated fine, so B's delete must still be emitted.
        let next = vec![
            NodeSnapshot::object(id(1), "Objects").with_children(vec![id(2)]),
            NodeSnapshot::object(id(2), "A").with_parent(id(1)).mark_partial(),
        ];

        let ops = Reconciler::reconcile(&table, &next);
        assert_eq!(ops, vec![Operation::Delete { node: id(3) }]);
    }

    #[test]
    fn unsupported_nodes_produce_no_operations() {
        let table = MirrorTable::new();
        let current = vec![
            NodeSnapshot::object(id(1), "Objects").with_children(vec![id(2)]),
            NodeSnapshot::unsupported(id(2), "DoSomething", 4).with_parent(id(1)),
        ];

        let ops = Reconciler::reconcile(&table, &current);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].node_id(), &id(1));
    }

    #[test]
    fn sibling_deletes_keep_walk_order() {
        let mut table = MirrorTable::new();
        let current = vec![
            NodeSnapshot::object(id(1), "Objects").with_children(vec![id(2), id(3), id(4)]),
            NodeSnapshot::object(id(2), "A").with_parent(id(1)),
            NodeSnapshot::object(id(3), "B").with_parent(id(1)),
            NodeSnapshot::object(id(4), "C").with_parent(id(1)),
        ];
        { let __eff = Reconciler::reconcile(&table, &current); apply_effects(&mut table, &__eff); }

        let ops = Reconciler::reconcile(&table, &[NodeSnapshot::object(id(1), "Objects")]);
        let order: Vec<&NodeId> = ops.iter().map(|op| op.node_id()).collect();
        assert_eq!(order, vec![&id(2), &id(3), &id(4)]);
    }

    #[test]
    fn unreadable_transition_is_detected() {
        let mut table = MirrorTable::new();
        let mut current = three_level_tree();
        { let __eff = Reconciler::reconcile(&table, &current); apply_effects(&mut table, &__eff); }

        // Value becomes unreadable: hash changes, one update emitted.
        current[2].value = None;
        let ops = Reconciler::reconcile(&table, &current);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind(), "update-value");

        apply_effects(&mut table, &ops);
        assert!(Reconciler::reconcile(&table, &current).is_empty());
    }
}
