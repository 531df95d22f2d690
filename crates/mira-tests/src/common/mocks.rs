// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Fault-injecting session decorators for testing MIRA components in
//! isolation.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different failure scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use mira_core::error::{EnumerationError, OperationError, ReadError, TransportError};
use mira_core::memory::MemoryAddressSpace;
use mira_core::session::{
    NodeAttributes, SourceSession, SubscriptionHandle, TargetSession, ValueSubscription,
};
use mira_core::types::{NodeId, Value};

// =============================================================================
// FaultInjectingSource
// =============================================================================

/// A [`SourceSession`] decorator over [`MemoryAddressSpace`] with scripted
/// failures.
pub struct FaultInjectingSource {
    inner: Arc<MemoryAddressSpace>,

    /// Nodes whose child enumeration fails.
    fail_children_for: Mutex<HashSet<NodeId>>,

    /// Nodes whose value read fails.
    fail_value_for: Mutex<HashSet<NodeId>>,

    /// Remaining `root()` calls that fail (u32::MAX = fail forever).
    root_failures_remaining: AtomicU32,

    /// Force every subscribe to fail.
    fail_subscribe: AtomicBool,

    /// Call counters for verification.
    root_calls: AtomicU64,
    children_calls: AtomicU64,
    value_calls: AtomicU64,
}

impl FaultInjectingSource {
    /// Wraps a memory space with no faults scripted.
    pub fn new(inner: Arc<MemoryAddressSpace>) -> Self {
        Self {
            inner,
            fail_children_for: Mutex::new(HashSet::new()),
            fail_value_for: Mutex::new(HashSet::new()),
            root_failures_remaining: AtomicU32::new(0),
            fail_subscribe: AtomicBool::new(false),
            root_calls: AtomicU64::new(0),
            children_calls: AtomicU64::new(0),
            value_calls: AtomicU64::new(0),
        }
    }

    /// Makes child enumeration fail for `node`.
    pub fn fail_children(&self, node: NodeId) {
        self.fail_children_for.lock().insert(node);
    }

    /// Clears a scripted enumeration failure.
    pub fn heal_children(&self, node: &NodeId) {
        self.fail_children_for.lock().remove(node);
    }

    /// Makes value reads fail for `node`.
    pub fn fail_value(&self, node: NodeId) {
        self.fail_value_for.lock().insert(node);
    }

    /// Makes the next `count` root resolutions fail.
    pub fn fail_root_times(&self, count: u32) {
        self.root_failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Makes every root resolution fail.
    pub fn fail_root_forever(&self) {
        self.root_failures_remaining.store(u32::MAX, Ordering::SeqCst);
    }

    /// Makes every subscribe call fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Number of `root()` calls observed.
    pub fn root_call_count(&self) -> u64 {
        self.root_calls.load(Ordering::SeqCst)
    }

    /// Number of `children()` calls observed.
    pub fn children_call_count(&self) -> u64 {
        self.children_calls.load(Ordering::SeqCst)
    }

    /// Number of `value()` calls observed.
    pub fn value_call_count(&self) -> u64 {
        self.value_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceSession for FaultInjectingSource {
    async fn root(&self) -> Result<NodeId, TransportError> {
        self.root_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.root_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.root_failures_remaining
                    .store(remaining - 1, Ordering::SeqCst);
            }
            return Err(TransportError::connection_lost("scripted root failure"));
        }
        self.inner.root().await
    }

    async fn attributes(&self, id: &NodeId) -> Result<NodeAttributes, ReadError> {
        self.inner.attributes(id).await
    }

    async fn value(&self, id: &NodeId) -> Result<Value, ReadError> {
        self.value_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_value_for.lock().contains(id) {
            return Err(ReadError::unreadable(id.clone(), "scripted read failure"));
        }
        self.inner.value(id).await
    }

    async fn children(&self, id: &NodeId) -> Result<Vec<NodeId>, EnumerationError> {
        self.children_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_children_for.lock().contains(id) {
            return Err(EnumerationError::failed(
                id.clone(),
                "scripted enumeration failure",
            ));
        }
        self.inner.children(id).await
    }

    async fn subscribe(&self, id: &NodeId) -> Result<ValueSubscription, TransportError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::connection_lost("scripted subscribe failure"));
        }
        self.inner.subscribe(id).await
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        self.inner.unsubscribe(handle).await
    }
}

// =============================================================================
// FaultInjectingTarget
// =============================================================================

/// A [`TargetSession`] decorator over [`MemoryAddressSpace`] with scripted
/// failures and a write history.
pub struct FaultInjectingTarget {
    inner: Arc<MemoryAddressSpace>,

    /// Creates with these display names fail.
    fail_create_names: Mutex<HashSet<String>>,

    /// Force every write to fail.
    fail_writes: AtomicBool,

    /// Force every delete to fail.
    fail_deletes: AtomicBool,

    /// Writes observed, in order.
    write_history: Mutex<Vec<(NodeId, Value)>>,
}

impl FaultInjectingTarget {
    /// Wraps a memory space with no faults scripted.
    pub fn new(inner: Arc<MemoryAddressSpace>) -> Self {
        Self {
            inner,
            fail_create_names: Mutex::new(HashSet::new()),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            write_history: Mutex::new(Vec::new()),
        }
    }

    /// Makes creates with this display name fail.
    pub fn fail_create_named(&self, display_name: impl Into<String>) {
        self.fail_create_names.lock().insert(display_name.into());
    }

    /// Makes every write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every delete fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Returns the observed writes, in order.
    pub fn writes(&self) -> Vec<(NodeId, Value)> {
        self.write_history.lock().clone()
    }

    fn create_blocked(&self, display_name: &str) -> bool {
        self.fail_create_names.lock().contains(display_name)
    }
}

#[async_trait]
impl TargetSession for FaultInjectingTarget {
    async fn create_object(
        &self,
        parent: &NodeId,
        display_name: &str,
    ) -> Result<NodeId, OperationError> {
        if self.create_blocked(display_name) {
            return Err(OperationError::create_failed(
                display_name,
                parent.clone(),
                "scripted create failure",
            ));
        }
        self.inner.create_object(parent, display_name).await
    }

    async fn create_variable(
        &self,
        parent: &NodeId,
        display_name: &str,
        value: Option<Value>,
    ) -> Result<NodeId, OperationError> {
        if self.create_blocked(display_name) {
            return Err(OperationError::create_failed(
                display_name,
                parent.clone(),
                "scripted create failure",
            ));
        }
        self.inner.create_variable(parent, display_name, value).await
    }

    async fn write_value(&self, id: &NodeId, value: &Value) -> Result<(), OperationError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OperationError::write_failed(
                id.clone(),
                "scripted write failure",
            ));
        }
        self.write_history.lock().push((id.clone(), value.clone()));
        self.inner.write_value(id, value).await
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), OperationError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(OperationError::delete_failed(
                id.clone(),
                "scripted delete failure",
            ));
        }
        self.inner.delete_node(id).await
    }
}
