// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory address space.
//!
//! [`MemoryAddressSpace`] is a thread-safe node tree implementing both
//! [`SourceSession`] and [`TargetSession`]. It backs the simulation mode of
//! the `mira` binary and the whole test suite: tests seed a tree through the
//! target capability, mutate it with [`set_value`](MemoryAddressSpace::set_value)
//! (which fans out to active subscriptions), and point the engine at it from
//! either side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{EnumerationError, OperationError, ReadError, TransportError};
use crate::session::{
    NodeAttributes, SourceSession, SubscriptionHandle, TargetSession, ValueChange,
    ValueSubscription,
};
use crate::types::{NodeClass, NodeId, Value};

/// Buffered notifications per subscription channel.
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// Node storage
// =============================================================================

#[derive(Debug, Clone)]
struct NodeEntry {
    display_name: String,
    class: NodeClass,
    value: Option<Value>,
    readable: bool,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

#[derive(Debug)]
struct SubscriptionEntry {
    node_id: NodeId,
    sender: mpsc::Sender<ValueChange>,
}

// =============================================================================
// MemoryAddressSpace
// =============================================================================

/// A thread-safe in-memory node tree usable as source, target, or both.
#[derive(Debug)]
pub struct MemoryAddressSpace {
    nodes: RwLock<HashMap<NodeId, NodeEntry>>,
    root: NodeId,
    namespace: u16,
    subscriptions: DashMap<u64, SubscriptionEntry>,
    next_handle: AtomicU64,
    next_node: AtomicU32,
}

impl MemoryAddressSpace {
    /// Creates an address space containing only the standard Objects folder.
    pub fn new() -> Self {
        Self::with_root(NodeId::OBJECTS_FOLDER, "Objects", 2)
    }

    /// Creates an address space with a custom root node and namespace for
    /// generated identities.
    pub fn with_root(root: NodeId, root_name: impl Into<String>, namespace: u16) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            root.clone(),
            NodeEntry {
                display_name: root_name.into(),
                class: NodeClass::Object,
                value: None,
                readable: false,
                children: Vec::new(),
                parent: None,
            },
        );

        Self {
            nodes: RwLock::new(nodes),
            root,
            namespace,
            subscriptions: DashMap::new(),
            next_handle: AtomicU64::new(1),
            next_node: AtomicU32::new(1000),
        }
    }

    /// Returns the root node identity.
    pub fn root_id(&self) -> NodeId {
        self.root.clone()
    }

    fn generate_id(&self) -> NodeId {
        NodeId::numeric(self.namespace, self.next_node.fetch_add(1, Ordering::SeqCst))
    }

    // =========================================================================
    // Seeding and mutation helpers
    // =========================================================================

    /// Adds a node with an explicit identity, attached under `parent`.
    ///
    /// Used by fixtures that need stable node ids across cycles. Returns the
    /// id back for chaining.
    pub fn insert_node(
        &self,
        id: NodeId,
        parent: &NodeId,
        display_name: impl Into<String>,
        class: NodeClass,
        value: Option<Value>,
    ) -> Result<NodeId, OperationError> {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(parent) {
            return Err(OperationError::create_failed(
                display_name,
                parent.clone(),
                "parent does not exist",
            ));
        }
        if nodes.contains_key(&id) {
            return Err(OperationError::create_failed(
                display_name,
                parent.clone(),
                "node already exists",
            ));
        }

        nodes.insert(
            id.clone(),
            NodeEntry {
                display_name: display_name.into(),
                class,
                readable: class.has_value(),
                value,
                children: Vec::new(),
                parent: Some(parent.clone()),
            },
        );
        if let Some(entry) = nodes.get_mut(parent) {
            entry.children.push(id.clone());
        }
        Ok(id)
    }

    /// Appends an existing node to another node's child list.
    ///
    /// This creates a second reference to `child` without re-creating it,
    /// which is how fixtures model diamond shapes and cycles.
    pub fn link_child(&self, parent: &NodeId, child: &NodeId) {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(child) {
            return;
        }
        if let Some(entry) = nodes.get_mut(parent) {
            if !entry.children.contains(child) {
                entry.children.push(child.clone());
            }
        }
    }

    /// Updates a Variable's value and notifies active subscriptions.
    pub async fn set_value(&self, id: &NodeId, value: Value) -> Result<(), OperationError> {
        {
            let mut nodes = self.nodes.write();
            let entry = nodes
                .get_mut(id)
                .ok_or_else(|| OperationError::write_failed(id.clone(), "no such node"))?;
            if !entry.class.has_value() {
                return Err(OperationError::write_failed(
                    id.clone(),
                    "node class carries no value",
                ));
            }
            entry.value = Some(value.clone());
            entry.readable = true;
        }

        self.notify(id, value).await;
        Ok(())
    }

    /// Renames a node in place.
    pub fn set_display_name(&self, id: &NodeId, display_name: impl Into<String>) {
        if let Some(entry) = self.nodes.write().get_mut(id) {
            entry.display_name = display_name.into();
        }
    }

    /// Marks a Variable's value as unreadable from the source side.
    pub fn set_unreadable(&self, id: &NodeId) {
        if let Some(entry) = self.nodes.write().get_mut(id) {
            entry.readable = false;
        }
    }

    /// Removes a node and its whole subtree.
    pub fn remove_subtree(&self, id: &NodeId) {
        let removed = {
            let mut nodes = self.nodes.write();
            let mut removed = Vec::new();
            let mut stack = vec![id.clone()];

            while let Some(current) = stack.pop() {
                if let Some(entry) = nodes.remove(&current) {
                    stack.extend(entry.children);
                    removed.push(current);
                }
            }

            if let Some(first) = removed.first() {
                let parent = nodes
                    .values_mut()
                    .find(|entry| entry.children.contains(first));
                if let Some(parent) = parent {
                    parent.children.retain(|child| child != first);
                }
            }
            removed
        };

        // Close subscriptions on removed nodes so readers observe the drop.
        self.subscriptions
            .retain(|_, sub| !removed.contains(&sub.node_id));
    }

    /// Drops every active subscription, simulating a source disconnect.
    pub fn drop_all_subscriptions(&self) {
        self.subscriptions.clear();
    }

    /// Returns the number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns `true` if the node exists.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.read().contains_key(id)
    }

    /// Returns the current value of a node, if any.
    pub fn value_of(&self, id: &NodeId) -> Option<Value> {
        self.nodes.read().get(id).and_then(|entry| entry.value.clone())
    }

    /// Returns the display name of a node, if it exists.
    pub fn display_name_of(&self, id: &NodeId) -> Option<String> {
        self.nodes.read().get(id).map(|entry| entry.display_name.clone())
    }

    /// Returns the number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Finds the first node with the given display name, depth-first.
    pub fn find_by_name(&self, display_name: &str) -> Option<NodeId> {
        let nodes = self.nodes.read();
        let mut stack = vec![self.root.clone()];
        let mut seen: std::collections::HashSet<NodeId> = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(entry) = nodes.get(&current) {
                if entry.display_name == display_name {
                    return Some(current);
                }
                stack.extend(entry.children.iter().rev().cloned());
            }
        }
        None
    }

    async fn notify(&self, id: &NodeId, value: Value) {
        let targets: Vec<(u64, mpsc::Sender<ValueChange>)> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().node_id == *id)
            .map(|entry| (*entry.key(), entry.value().sender.clone()))
            .collect();

        for (handle, sender) in targets {
            let change = ValueChange::now(id.clone(), value.clone());
            if sender.send(change).await.is_err() {
                self.subscriptions.remove(&handle);
            }
        }
    }
}

impl Default for MemoryAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SourceSession
// =============================================================================

#[async_trait]
impl SourceSession for MemoryAddressSpace {
    async fn root(&self) -> Result<NodeId, TransportError> {
        Ok(self.root.clone())
    }

    async fn attributes(&self, id: &NodeId) -> Result<NodeAttributes, ReadError> {
        let nodes = self.nodes.read();
        let entry = nodes
            .get(id)
            .ok_or_else(|| ReadError::unreadable(id.clone(), "no such node"))?;
        Ok(NodeAttributes::new(entry.display_name.clone(), entry.class))
    }

    async fn value(&self, id: &NodeId) -> Result<Value, ReadError> {
        let nodes = self.nodes.read();
        let entry = nodes
            .get(id)
            .ok_or_else(|| ReadError::unreadable(id.clone(), "no such node"))?;
        if !entry.readable {
            return Err(ReadError::unreadable(id.clone(), "value not readable"));
        }
        entry
            .value
            .clone()
            .ok_or_else(|| ReadError::unreadable(id.clone(), "no value set"))
    }

    async fn children(&self, id: &NodeId) -> Result<Vec<NodeId>, EnumerationError> {
        let nodes = self.nodes.read();
        let entry = nodes
            .get(id)
            .ok_or_else(|| EnumerationError::failed(id.clone(), "no such node"))?;
        Ok(entry.children.clone())
    }

    async fn subscribe(&self, id: &NodeId) -> Result<ValueSubscription, TransportError> {
        if !self.contains(id) {
            return Err(TransportError::connection_lost(format!(
                "subscribe target '{}' does not exist",
                id
            )));
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let handle = SubscriptionHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.insert(
            handle.value(),
            SubscriptionEntry {
                node_id: id.clone(),
                sender,
            },
        );

        Ok(ValueSubscription {
            handle,
            node_id: id.clone(),
            receiver,
        })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        self.subscriptions.remove(&handle.value());
        Ok(())
    }
}

// =============================================================================
// TargetSession
// =============================================================================

#[async_trait]
impl TargetSession for MemoryAddressSpace {
    async fn create_object(
        &self,
        parent: &NodeId,
        display_name: &str,
    ) -> Result<NodeId, OperationError> {
        let id = self.generate_id();
        self.insert_node(id, parent, display_name, NodeClass::Object, None)
    }

    async fn create_variable(
        &self,
        parent: &NodeId,
        display_name: &str,
        value: Option<Value>,
    ) -> Result<NodeId, OperationError> {
        let id = self.generate_id();
        self.insert_node(id, parent, display_name, NodeClass::Variable, value)
    }

    async fn write_value(&self, id: &NodeId, value: &Value) -> Result<(), OperationError> {
        self.set_value(id, value.clone()).await
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), OperationError> {
        if !self.contains(id) {
            return Err(OperationError::delete_failed(id.clone(), "no such node"));
        }
        self.remove_subtree(id);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seed_and_read_back() {
        let space = MemoryAddressSpace::new();
        let root = space.root_id();

        let device = space.create_object(&root, "Device1").await.unwrap();
        let temp = space
            .create_variable(&device, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        let attrs = space.attributes(&device).await.unwrap();
        assert_eq!(attrs.display_name, "Device1");
        assert_eq!(attrs.class, NodeClass::Object);

        assert_eq!(space.value(&temp).await.unwrap(), Value::Int32(20));
        assert_eq!(space.children(&root).await.unwrap(), vec![device]);
    }

    #[tokio::test]
    async fn unreadable_value_is_a_read_error() {
        let space = MemoryAddressSpace::new();
        let root = space.root_id();
        let var = space
            .create_variable(&root, "hidden", Some(Value::Int32(1)))
            .await
            .unwrap();

        space.set_unreadable(&var);
        let err = space.value(&var).await.unwrap_err();
        assert!(err.is_unreadable());
    }

    #[tokio::test]
    async fn subscription_receives_value_changes() {
        let space = MemoryAddressSpace::new();
        let root = space.root_id();
        let var = space
            .create_variable(&root, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        let mut sub = space.subscribe(&var).await.unwrap();
        space.set_value(&var, Value::Int32(21)).await.unwrap();

        let change = sub.receiver.recv().await.unwrap();
        assert_eq!(change.node_id, var);
        assert_eq!(change.value, Value::Int32(21));

        space.unsubscribe(sub.handle).await.unwrap();
        assert_eq!(space.subscription_count(), 0);
    }

    #[tokio::test]
    async fn delete_removes_whole_subtree_and_subscriptions() {
        let space = MemoryAddressSpace::new();
        let root = space.root_id();
        let device = space.create_object(&root, "Device1").await.unwrap();
        let temp = space
            .create_variable(&device, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        let _sub = space.subscribe(&temp).await.unwrap();
        assert_eq!(space.subscription_count(), 1);

        space.delete_node(&device).await.unwrap();
        assert!(!space.contains(&device));
        assert!(!space.contains(&temp));
        assert_eq!(space.subscription_count(), 0);
        // Root no longer lists the deleted child.
        assert!(space.children(&root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_subscriptions_close_receivers() {
        let space = MemoryAddressSpace::new();
        let root = space.root_id();
        let var = space
            .create_variable(&root, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        let mut sub = space.subscribe(&var).await.unwrap();
        space.drop_all_subscriptions();

        assert!(sub.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn create_under_missing_parent_fails() {
        let space = MemoryAddressSpace::new();
        let missing = NodeId::numeric(9, 999);
        let err = space.create_object(&missing, "orphan").await.unwrap_err();
        assert_eq!(err.kind(), "create");
    }
}
