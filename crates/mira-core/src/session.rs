// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session capability traits.
//!
//! The mirror engine never talks to a wire protocol directly. It consumes a
//! source-side capability (read attributes, enumerate children, subscribe to
//! value changes) and a target-side capability (create nodes, write values,
//! delete nodes), both injected at construction time. This keeps every
//! component testable against in-memory implementations and leaves the
//! OPC UA encoding, security channel, and session lifecycle to the transport
//! backend.
//!
//! # Design Principles
//!
//! - **Protocol agnostic**: the engine sees node identities and values only
//! - **Async first**: every capability call may block on the network
//! - **Thread safe**: implementations are `Send + Sync` for concurrent use
//!
//! # Example
//!
//! ```rust,ignore
//! async fn dump_root(source: &dyn SourceSession) -> SyncResult<()> {
//!     let root = source.root().await?;
//!     for child in source.children(&root).await? {
//!         let attrs = source.attributes(&child).await?;
//!         println!("{}: {}", child, attrs.display_name);
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{EnumerationError, OperationError, ReadError, TransportError};
use crate::types::{NodeClass, NodeId, Value};

// =============================================================================
// NodeAttributes
// =============================================================================

/// The attribute set the mirror reads for every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttributes {
    /// Localized display name.
    pub display_name: String,

    /// Node class.
    pub class: NodeClass,
}

impl NodeAttributes {
    /// Creates a new attribute set.
    pub fn new(display_name: impl Into<String>, class: NodeClass) -> Self {
        Self {
            display_name: display_name.into(),
            class,
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Server-side handle for an active value subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u64);

impl SubscriptionHandle {
    /// Creates a new handle.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw handle value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A single value-change notification from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    /// The node whose value changed.
    pub node_id: NodeId,

    /// The new value.
    pub value: Value,

    /// When the change was observed.
    pub timestamp: DateTime<Utc>,
}

impl ValueChange {
    /// Creates a notification stamped with the current time.
    pub fn now(node_id: NodeId, value: Value) -> Self {
        Self {
            node_id,
            value,
            timestamp: Utc::now(),
        }
    }
}

/// An active value subscription.
///
/// Notifications arrive on `receiver`; the channel closing signals that the
/// source dropped the subscription (disconnect or teardown). The handle must
/// be passed back to [`SourceSession::unsubscribe`] to release server-side
/// resources.
#[derive(Debug)]
pub struct ValueSubscription {
    /// Server-side handle for this subscription.
    pub handle: SubscriptionHandle,

    /// The subscribed node.
    pub node_id: NodeId,

    /// Notification stream.
    pub receiver: mpsc::Receiver<ValueChange>,
}

// =============================================================================
// SourceSession
// =============================================================================

/// Read-side capability over the source server's address space.
///
/// # Error Contract
///
/// - `root` / `subscribe` fail only on transport problems
/// - `attributes` / `value` failures are per-node; the walker leaves the
///   field absent and keeps going
/// - `children` failures mark the node's snapshot `partial`
#[async_trait]
pub trait SourceSession: Send + Sync {
    /// Returns the root node of the subtree this session exposes.
    async fn root(&self) -> Result<NodeId, TransportError>;

    /// Reads the display name and class of a node.
    async fn attributes(&self, id: &NodeId) -> Result<NodeAttributes, ReadError>;

    /// Reads the current value of a Variable node.
    async fn value(&self, id: &NodeId) -> Result<Value, ReadError>;

    /// Enumerates the hierarchical children of a node, in browse order.
    async fn children(&self, id: &NodeId) -> Result<Vec<NodeId>, EnumerationError>;

    /// Opens a value-change subscription on a Variable node.
    async fn subscribe(&self, id: &NodeId) -> Result<ValueSubscription, TransportError>;

    /// Releases a subscription previously opened with `subscribe`.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError>;
}

// =============================================================================
// TargetSession
// =============================================================================

/// Write-side capability over the target server's address space.
///
/// The applier is the only caller and serializes all mutations: the target
/// session is a single-writer resource and implementations never see two
/// concurrent operations from the engine.
#[async_trait]
pub trait TargetSession: Send + Sync {
    /// Creates an Object node under `parent` and returns its identity.
    async fn create_object(
        &self,
        parent: &NodeId,
        display_name: &str,
    ) -> Result<NodeId, OperationError>;

    /// Creates a Variable node under `parent` with an optional initial value.
    async fn create_variable(
        &self,
        parent: &NodeId,
        display_name: &str,
        value: Option<Value>,
    ) -> Result<NodeId, OperationError>;

    /// Writes a new value to an existing Variable node.
    async fn write_value(&self, id: &NodeId, value: &Value) -> Result<(), OperationError>;

    /// Deletes a node. Implementations delete any remaining descendants as
    /// well, but the applier always issues deletes children-first.
    async fn delete_node(&self, id: &NodeId) -> Result<(), OperationError>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_handle_display() {
        assert_eq!(SubscriptionHandle::new(7).to_string(), "sub-7");
        assert_eq!(SubscriptionHandle::new(7).value(), 7);
    }

    #[test]
    fn value_change_is_timestamped() {
        let change = ValueChange::now(NodeId::numeric(2, 1), Value::Int32(42));
        assert_eq!(change.value, Value::Int32(42));
        assert!(change.timestamp <= Utc::now());
    }
}
