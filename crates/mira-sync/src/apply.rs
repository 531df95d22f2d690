// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Operation execution against the target session.
//!
//! The [`MirrorApplier`] consumes an operation sequence exactly once,
//! strictly in the given order (the reconciler has already resolved
//! dependency ordering). Failures are isolated per operation: the batch
//! rolls forward past a failed node, with one exception: operations that
//! would attach under a failed create are skipped, transitively, because
//! there is nothing to attach to.
//!
//! The mirror table is updated per operation only after the target session
//! confirms the mutation, so a crash or failure can never leave the table
//! claiming more than the target holds.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mira_core::cancel::CancelToken;
use mira_core::session::TargetSession;
use mira_core::types::{optional_content_hash, NodeClass, NodeId};

use crate::reconcile::{MirrorTable, Operation};

// =============================================================================
// Outcomes
// =============================================================================

/// Terminal status of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The target confirmed the mutation and the record was updated.
    Applied,

    /// The target rejected the mutation; the record is unchanged.
    Failed {
        /// Error kind label (`create`, `write`, `delete`, `transport`).
        kind: String,
        /// Rendered error.
        error: String,
    },

    /// Skipped because an ancestor's create failed in this batch.
    SkippedDependency {
        /// The failed ancestor (source id).
        parent: NodeId,
    },

    /// Not attempted: the batch was cancelled at a node boundary.
    Cancelled,
}

/// Per-operation outcome, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Source node the operation concerned.
    pub node: NodeId,

    /// Operation kind label.
    pub operation: String,

    /// What happened.
    pub status: OutcomeStatus,
}

// =============================================================================
// ApplyReport
// =============================================================================

/// Result of applying one operation sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Nodes created on the target.
    pub created: usize,

    /// Values/names updated on the target.
    pub updated: usize,

    /// Nodes deleted from the target.
    pub deleted: usize,

    /// Operations the target rejected.
    pub failed: usize,

    /// Operations skipped due to a failed ancestor create.
    pub skipped: usize,

    /// Operations not attempted due to cancellation.
    pub cancelled: usize,

    /// Per-operation outcomes, in execution order.
    pub outcomes: Vec<OperationOutcome>,

    /// Source ids of Variables created in this batch (for subscription
    /// bring-up).
    pub created_variables: Vec<NodeId>,

    /// Source ids of Variables deleted in this batch (for subscription
    /// teardown).
    pub deleted_variables: Vec<NodeId>,
}

impl ApplyReport {
    /// Total operations accounted for.
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.failed + self.skipped + self.cancelled
    }

    /// Returns `true` if every operation applied cleanly.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.cancelled == 0
    }

    fn record(&mut self, op: &Operation, status: OutcomeStatus) {
        match &status {
            OutcomeStatus::Applied => match op {
                Operation::CreateObject { .. } | Operation::CreateVariable { .. } => {
                    self.created += 1
                }
                Operation::UpdateValue { .. } => self.updated += 1,
                Operation::Delete { .. } => self.deleted += 1,
            },
            OutcomeStatus::Failed { .. } => self.failed += 1,
            OutcomeStatus::SkippedDependency { .. } => self.skipped += 1,
            OutcomeStatus::Cancelled => self.cancelled += 1,
        }

        self.outcomes.push(OperationOutcome {
            node: op.node_id().clone(),
            operation: op.kind().to_string(),
            status,
        });
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created={} updated={} deleted={} failed={} skipped={} cancelled={}",
            self.created, self.updated, self.deleted, self.failed, self.skipped, self.cancelled
        )
    }
}

// =============================================================================
// MirrorApplier
// =============================================================================

/// Executes operation sequences against the target session.
///
/// The applier is the single writer to both the target session and the
/// mirror table; the engine serializes all calls to it.
pub struct MirrorApplier {
    target: Arc<dyn TargetSession>,

    /// Target node that operations with no source parent attach under.
    target_root: NodeId,
}

impl MirrorApplier {
    /// Creates an applier attaching root-level nodes under `target_root`.
    pub fn new(target: Arc<dyn TargetSession>, target_root: NodeId) -> Self {
        Self {
            target,
            target_root,
        }
    }

    /// Applies `operations` in order, updating `table` per confirmed
    /// mutation, and returns the report.
    pub async fn apply(
        &self,
        operations: &[Operation],
        table: &mut MirrorTable,
        cancel: &CancelToken,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        // Source ids whose create failed or was skipped in this batch;
        // anything parented under them cannot attach.
        let mut dead_parents: HashSet<NodeId> = HashSet::new();
        let mut remaining = operations.iter();

        for op in remaining.by_ref() {
            if cancel.is_cancelled() {
                report.record(op, OutcomeStatus::Cancelled);
                break;
            }

            if let Some(parent) = op.parent() {
                if let Some(dead) = dead_parents.get(parent) {
                    let dead = dead.clone();
                    if op.is_create() {
                        dead_parents.insert(op.node_id().clone());
                    }
                    report.record(op, OutcomeStatus::SkippedDependency { parent: dead });
                    continue;
                }
            }

            let status = self.execute(op, table, &mut report).await;
            let attach_failed = matches!(
                status,
                OutcomeStatus::Failed { .. } | OutcomeStatus::SkippedDependency { .. }
            );
            if attach_failed && op.is_create() {
                dead_parents.insert(op.node_id().clone());
            }
            report.record(op, status);
        }

        // Everything after a cancellation boundary is reported, not applied.
        for op in remaining {
            report.record(op, OutcomeStatus::Cancelled);
        }

        debug!(%report, "apply batch finished");
        report
    }

    async fn execute(
        &self,
        op: &Operation,
        table: &mut MirrorTable,
        report: &mut ApplyReport,
    ) -> OutcomeStatus {
        match op {
            Operation::CreateObject {
                node,
                parent,
                display_name,
            } => {
                let target_parent = match self.resolve_parent(parent.as_ref(), table) {
                    Ok(id) => id,
                    Err(status) => return status,
                };
                match self.target.create_object(&target_parent, display_name).await {
                    Ok(target_id) => {
                        table.insert(
                            node.clone(),
                            target_id,
                            parent.clone(),
                            NodeClass::Object,
                            display_name.clone(),
                            optional_content_hash(None),
                        );
                        OutcomeStatus::Applied
                    }
                    Err(err) => {
                        warn!(node = %node, error = %err, "create object failed");
                        OutcomeStatus::Failed {
                            kind: err.kind().to_string(),
                            error: err.to_string(),
                        }
                    }
                }
            }

            Operation::CreateVariable {
                node,
                parent,
                display_name,
                value,
            } => {
                let target_parent = match self.resolve_parent(parent.as_ref(), table) {
                    Ok(id) => id,
                    Err(status) => return status,
                };
                match self
                    .target
                    .create_variable(&target_parent, display_name, value.clone())
                    .await
                {
                    Ok(target_id) => {
                        table.insert(
                            node.clone(),
                            target_id,
                            parent.clone(),
                            NodeClass::Variable,
                            display_name.clone(),
                            optional_content_hash(value.as_ref()),
                        );
                        report.created_variables.push(node.clone());
                        OutcomeStatus::Applied
                    }
                    Err(err) => {
                        warn!(node = %node, error = %err, "create variable failed");
                        OutcomeStatus::Failed {
                            kind: err.kind().to_string(),
                            error: err.to_string(),
                        }
                    }
                }
            }

            Operation::UpdateValue {
                node,
                display_name,
                value,
            } => {
                let Some(record) = table.get(node) else {
                    return OutcomeStatus::Failed {
                        kind: "write".to_string(),
                        error: format!("no mirror record for '{}'", node),
                    };
                };
                let target_id = record.target_id.clone();

                let write_result = match value {
                    Some(value) => self.target.write_value(&target_id, value).await,
                    // The value became unreadable at the source; there is
                    // nothing to push, only the record to refresh.
                    None => Ok(()),
                };

                match write_result {
                    Ok(()) => {
                        if let Some(record) = table.get_mut(node) {
                            record.display_name = display_name.clone();
                            record.value_hash = optional_content_hash(value.as_ref());
                            record.last_sync = chrono::Utc::now();
                        }
                        OutcomeStatus::Applied
                    }
                    Err(err) => {
                        warn!(node = %node, error = %err, "value update failed");
                        OutcomeStatus::Failed {
                            kind: err.kind().to_string(),
                            error: err.to_string(),
                        }
                    }
                }
            }

            Operation::Delete { node } => {
                let (target_id, class) = match table.get(node) {
                    Some(record) => (record.target_id.clone(), record.class),
                    None => {
                        return OutcomeStatus::Failed {
                            kind: "delete".to_string(),
                            error: format!("no mirror record for '{}'", node),
                        }
                    }
                };

                match self.target.delete_node(&target_id).await {
                    Ok(()) => {
                        table.remove(node);
                        if class.has_value() {
                            report.deleted_variables.push(node.clone());
                        }
                        OutcomeStatus::Applied
                    }
                    Err(err) => {
                        warn!(node = %node, error = %err, "delete failed");
                        OutcomeStatus::Failed {
                            kind: err.kind().to_string(),
                            error: err.to_string(),
                        }
                    }
                }
            }
        }
    }

    /// Resolves the target-side parent for a create.
    fn resolve_parent(
        &self,
        parent: Option<&NodeId>,
        table: &MirrorTable,
    ) -> Result<NodeId, OutcomeStatus> {
        match parent {
            None => Ok(self.target_root.clone()),
            Some(source_parent) => match table.get(source_parent) {
                Some(record) => Ok(record.target_id.clone()),
                // The parent never made it onto the target (failed in an
                // earlier cycle, or is an unmirrored class).
                None => Err(OutcomeStatus::SkippedDependency {
                    parent: source_parent.clone(),
                }),
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

    use mira_core::memory::MemoryAddressSpace;
    use mira_core::types::Value;

    fn id(n: u32) -> NodeId {
        NodeId::numeric(2, n)
    }

    fn creates_for_device_tree() -> Vec<Operation> {
        vec![
            Operation::CreateObject {
                node: id(1),
                parent: None,
                display_name: "Device1".to_string(),
            },
            Operation::CreateVariable {
                node: id(2),
                parent: Some(id(1)),
                display_name: "temp".to_string(),
                value: Some(Value::Int32(20)),
            },
        ]
    }

    #[tokio::test]
    async fn apply_creates_and_records() {
        let target = Arc::new(MemoryAddressSpace::new());
        let applier = MirrorApplier::new(target.clone(), target.root_id());
        let mut table = MirrorTable::new();

        let report = applier
            .apply(&creates_for_device_tree(), &mut table, &CancelToken::new())
            .await;

        assert_eq!(report.created, 2);
        assert!(report.is_clean());
        assert_eq!(table.len(), 2);
        assert_eq!(report.created_variables, vec![id(2)]);

        // The mirrored tree is really on the target.
        let device_target = table.get(&id(1)).unwrap().target_id.clone();
        assert!(target.contains(&device_target));
        let temp_target = table.get(&id(2)).unwrap().target_id.clone();
        assert_eq!(target.value_of(&temp_target), Some(Value::Int32(20)));
    }

    #[tokio::test]
    async fn failed_create_skips_dependents_transitively() {
        let target = Arc::new(MemoryAddressSpace::new());
        // Point the applier at a root that does not exist so the first
        // create fails on the target.
        let applier = MirrorApplier::new(target.clone(), NodeId::numeric(9, 999));
        let mut table = MirrorTable::new();

        let ops = vec![
            Operation::CreateObject {
                node: id(1),
                parent: None,
                display_name: "Broken".to_string(),
            },
            Operation::CreateObject {
                node: id(2),
                parent: Some(id(1)),
                display_name: "Child".to_string(),
            },
            Operation::CreateVariable {
                node: id(3),
                parent: Some(id(2)),
                display_name: "grandchild".to_string(),
                value: None,
            },
        ];

        let report = applier.apply(&ops, &mut table, &CancelToken::new()).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 2);
        assert!(table.is_empty());
        assert!(matches!(
            report.outcomes[1].status,
            OutcomeStatus::SkippedDependency { .. }
        ));
        assert!(matches!(
            report.outcomes[2].status,
            OutcomeStatus::SkippedDependency { .. }
        ));
    }

    #[tokio::test]
    async fn independent_operations_survive_a_failure() {
        let target = Arc::new(MemoryAddressSpace::new());
        let applier = MirrorApplier::new(target.clone(), target.root_id());
        let mut table = MirrorTable::new();

        // Op 2 fails (update with no record); 1 and 3 are independent.
        let ops = vec![
            Operation::CreateObject {
                node: id(1),
                parent: None,
                display_name: "A".to_string(),
            },
            Operation::UpdateValue {
                node: id(99),
                display_name: "ghost".to_string(),
                value: Some(Value::Int32(1)),
            },
            Operation::CreateObject {
                node: id(3),
                parent: None,
                display_name: "B".to_string(),
            },
        ];

        let report = applier.apply(&ops, &mut table, &CancelToken::new()).await;
        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn delete_updates_table_and_reports_variables() {
        let target = Arc::new(MemoryAddressSpace::new());
        let applier = MirrorApplier::new(target.clone(), target.root_id());
        let mut table = MirrorTable::new();

        applier
            .apply(&creates_for_device_tree(), &mut table, &CancelToken::new())
            .await;

        let deletes = vec![
            Operation::Delete { node: id(2) },
            Operation::Delete { node: id(1) },
        ];
        let report = applier.apply(&deletes, &mut table, &CancelToken::new()).await;

        assert_eq!(report.deleted, 2);
        assert_eq!(report.deleted_variables, vec![id(2)]);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancellation_reports_remainder() {
        let target = Arc::new(MemoryAddressSpace::new());
        let applier = MirrorApplier::new(target.clone(), target.root_id());
        let mut table = MirrorTable::new();

        let cancel = CancelToken::new();
        cancel.cancel();

        let report = applier
            .apply(&creates_for_device_tree(), &mut table, &cancel)
            .await;

        assert_eq!(report.cancelled, 2);
        assert_eq!(report.created, 0);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn failed_delete_leaves_record_in_place() {
        let target = Arc::new(MemoryAddressSpace::new());
        let applier = MirrorApplier::new(target.clone(), target.root_id());
        let mut table = MirrorTable::new();

        applier
            .apply(&creates_for_device_tree(), &mut table, &CancelToken::new())
            .await;

        // Remove the node behind the table's back so the delete fails.
        let temp_target = table.get(&id(2)).unwrap().target_id.clone();
        target.remove_subtree(&temp_target);

        let report = applier
            .apply(&[Operation::Delete { node: id(2) }], &mut table, &CancelToken::new())
            .await;

        assert_eq!(report.failed, 1);
        // Invariant: on failure the record is left unchanged.
        assert!(table.contains(&id(2)));
    }
}
