// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Point-in-time node snapshots.
//!
//! A [`NodeSnapshot`] is the immutable record of one remote node as observed
//! during a walk: identity, class, display name, value (if readable), and
//! the enumerable children at capture time. Snapshots are what the walker
//! streams and what the reconciler diffs against the mirror table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{NodeClass, NodeId, Value};

// =============================================================================
// NodeSnapshot
// =============================================================================

/// Immutable description of one remote node at a point in time.
///
/// Invariant: `children` is exactly the set of children that could be
/// enumerated at capture time. When enumeration partially failed the
/// snapshot is marked [`partial`](NodeSnapshot::partial) and the reconciler
/// excludes the subtree from delete inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Source-side node identity.
    pub id: NodeId,

    /// Localized display name.
    pub display_name: String,

    /// Node class.
    pub class: NodeClass,

    /// Value at capture time. Present only for readable Variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Enumerable children at capture time, in browse order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,

    /// Structural parent. `None` for the walk root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,

    /// `true` if child enumeration failed for this node.
    #[serde(default)]
    pub partial: bool,
}

impl NodeSnapshot {
    /// Creates an Object snapshot.
    pub fn object(id: NodeId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            class: NodeClass::Object,
            value: None,
            children: Vec::new(),
            parent: None,
            partial: false,
        }
    }

    /// Creates a Variable snapshot.
    pub fn variable(id: NodeId, display_name: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            class: NodeClass::Variable,
            value,
            children: Vec::new(),
            parent: None,
            partial: false,
        }
    }

    /// Creates a snapshot for an unsupported node class.
    ///
    /// Unsupported nodes are recorded as leaves: no value, no descent.
    pub fn unsupported(id: NodeId, display_name: impl Into<String>, raw_class: u32) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            class: NodeClass::Unsupported(raw_class),
            value: None,
            children: Vec::new(),
            parent: None,
            partial: false,
        }
    }

    /// Sets the structural parent.
    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the children list.
    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        self.children = children;
        self
    }

    /// Marks the snapshot as partial (child enumeration failed).
    pub fn mark_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Returns `true` if this node is a Variable.
    #[inline]
    pub fn is_variable(&self) -> bool {
        self.class == NodeClass::Variable
    }

    /// Returns `true` if this node is replicated onto the target.
    #[inline]
    pub fn is_mirrored(&self) -> bool {
        self.class.is_mirrored()
    }
}

impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}){}",
            self.class,
            self.display_name,
            self.id,
            if self.partial { " partial" } else { "" }
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_constructors() {
        let obj = NodeSnapshot::object(NodeId::numeric(2, 1), "Device1");
        assert!(obj.is_mirrored());
        assert!(!obj.is_variable());
        assert!(obj.value.is_none());

        let var = NodeSnapshot::variable(NodeId::numeric(2, 2), "temp", Some(Value::Int32(20)))
            .with_parent(NodeId::numeric(2, 1));
        assert!(var.is_variable());
        assert_eq!(var.parent, Some(NodeId::numeric(2, 1)));

        let other = NodeSnapshot::unsupported(NodeId::numeric(2, 3), "DoThing", 4);
        assert!(!other.is_mirrored());
        assert!(other.children.is_empty());
    }

    #[test]
    fn partial_flag() {
        let snap = NodeSnapshot::object(NodeId::numeric(2, 1), "Device1").mark_partial();
        assert!(snap.partial);
        assert!(snap.to_string().contains("partial"));
    }
}
