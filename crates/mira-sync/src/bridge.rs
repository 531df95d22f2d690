// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Live value-change forwarding.
//!
//! After the initial structural mirror, the [`SubscriptionBridge`] keeps one
//! live subscription per mirrored Variable and forwards each notification
//! into the engine's ordered event queue, bypassing the reconciler (the diff
//! is already known: it is a single value update).
//!
//! # State Machine
//!
//! ```text
//! Inactive -> Subscribing -> Active
//!                 ^            |
//!                 |            v (channel closed / subscribe failed)
//!           Resubscribing <- Error -> Closed (retries exhausted)
//! ```
//!
//! Each subscription runs on its own task. A source disconnect closes the
//! notification channel, the task transitions to Error and retries with
//! exponential backoff; exhausting the retry cap closes the subscription,
//! which the engine surfaces as a degraded bridge.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mira_core::retry::{ExponentialBackoff, RetryConfig};
use mira_core::session::{SourceSession, SubscriptionHandle, ValueChange};
use mira_core::types::NodeId;

// =============================================================================
// BridgeState
// =============================================================================

/// Lifecycle state of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Tracked but not yet started.
    #[default]
    Inactive,

    /// Subscribe call in flight.
    Subscribing,

    /// Receiving notifications.
    Active,

    /// The subscription dropped; a retry is pending.
    Error,

    /// Backing off before the next subscribe attempt.
    Resubscribing,

    /// Torn down, or retries exhausted. Terminal.
    Closed,
}

impl BridgeState {
    /// Returns `true` if notifications can arrive in this state.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` for the terminal state.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "Inactive"),
            Self::Subscribing => write!(f, "Subscribing"),
            Self::Active => write!(f, "Active"),
            Self::Error => write!(f, "Error"),
            Self::Resubscribing => write!(f, "Resubscribing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// BridgeHealth
// =============================================================================

/// Aggregate subscription health, exposed through `status()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeHealth {
    /// Tracked subscriptions.
    pub total: usize,
    /// Currently receiving notifications.
    pub active: usize,
    /// Subscribe call in flight.
    pub subscribing: usize,
    /// Waiting out a backoff delay.
    pub resubscribing: usize,
    /// Dropped and awaiting retry.
    pub error: usize,
    /// Terminally closed (retries exhausted).
    pub closed: usize,
}

impl BridgeHealth {
    /// Returns `true` when every tracked subscription is live or recovering.
    pub fn is_healthy(&self) -> bool {
        self.closed == 0 && self.error == 0
    }
}

// =============================================================================
// SubscriptionBridge
// =============================================================================

struct BridgeEntry {
    state: Arc<Mutex<BridgeState>>,
    handle: Arc<Mutex<Option<SubscriptionHandle>>>,
    task: JoinHandle<()>,
}

/// Maintains live subscriptions for mirrored Variables.
pub struct SubscriptionBridge {
    source: Arc<dyn SourceSession>,
    events: mpsc::Sender<ValueChange>,
    backoff: ExponentialBackoff,
    entries: DashMap<NodeId, BridgeEntry>,
}

impl SubscriptionBridge {
    /// Creates a bridge forwarding notifications into `events`.
    pub fn new(
        source: Arc<dyn SourceSession>,
        events: mpsc::Sender<ValueChange>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            events,
            backoff: ExponentialBackoff::new(retry),
            entries: DashMap::new(),
        }
    }

    /// Starts tracking a Variable. Idempotent: an already tracked node is
    /// left undisturbed.
    pub fn track(&self, node_id: NodeId) {
        if self.entries.contains_key(&node_id) {
            return;
        }

        let state = Arc::new(Mutex::new(BridgeState::Inactive));
        let handle = Arc::new(Mutex::new(None));

        let task = tokio::spawn(run_subscription(
            self.source.clone(),
            node_id.clone(),
            self.events.clone(),
            self.backoff.clone(),
            state.clone(),
            handle.clone(),
        ));

        debug!(node = %node_id, "tracking variable");
        self.entries.insert(node_id, BridgeEntry { state, handle, task });
    }

    /// Tears down the subscription for a deleted mirror node.
    ///
    /// Called on the applier's delete success path; the task is stopped and
    /// the server-side handle released before this returns.
    pub async fn teardown(&self, node_id: &NodeId) {
        if let Some((_, entry)) = self.entries.remove(node_id) {
            entry.task.abort();
            *entry.state.lock() = BridgeState::Closed;
            let handle = entry.handle.lock().take();
            if let Some(handle) = handle {
                if let Err(err) = self.source.unsubscribe(handle).await {
                    warn!(node = %node_id, error = %err, "unsubscribe failed during teardown");
                }
            }
            debug!(node = %node_id, "subscription torn down");
        }
    }

    /// Returns `true` if the node is tracked.
    pub fn is_tracked(&self, node_id: &NodeId) -> bool {
        self.entries.contains_key(node_id)
    }

    /// Returns the current state of one subscription.
    pub fn state_of(&self, node_id: &NodeId) -> Option<BridgeState> {
        self.entries.get(node_id).map(|entry| *entry.state.lock())
    }

    /// Aggregates per-state counts across all subscriptions.
    pub fn health(&self) -> BridgeHealth {
        let mut health = BridgeHealth::default();
        for entry in self.entries.iter() {
            health.total += 1;
            match *entry.state.lock() {
                BridgeState::Inactive | BridgeState::Subscribing => health.subscribing += 1,
                BridgeState::Active => health.active += 1,
                BridgeState::Resubscribing => health.resubscribing += 1,
                BridgeState::Error => health.error += 1,
                BridgeState::Closed => health.closed += 1,
            }
        }
        health
    }

    /// Stops every subscription task. Used on engine shutdown.
    pub async fn shutdown(&self) {
        let nodes: Vec<NodeId> = self.entries.iter().map(|e| e.key().clone()).collect();
        for node in nodes {
            self.teardown(&node).await;
        }
    }
}

impl fmt::Debug for SubscriptionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionBridge")
            .field("tracked", &self.entries.len())
            .finish()
    }
}

// =============================================================================
// Subscription task
// =============================================================================

async fn run_subscription(
    source: Arc<dyn SourceSession>,
    node_id: NodeId,
    events: mpsc::Sender<ValueChange>,
    backoff: ExponentialBackoff,
    state: Arc<Mutex<BridgeState>>,
    handle_slot: Arc<Mutex<Option<SubscriptionHandle>>>,
) {
    let mut attempt: u32 = 0;

    loop {
        *state.lock() = BridgeState::Subscribing;

        match source.subscribe(&node_id).await {
            Ok(mut subscription) => {
                *handle_slot.lock() = Some(subscription.handle);
                *state.lock() = BridgeState::Active;
                // A successful subscribe resets the retry budget.
                attempt = 0;

                while let Some(change) = subscription.receiver.recv().await {
                    if events.send(change).await.is_err() {
                        // Engine gone; nothing to forward to anymore.
                        *state.lock() = BridgeState::Closed;
                        return;
                    }
                }

                // Channel closed: the source dropped the subscription.
                *handle_slot.lock() = None;
                *state.lock() = BridgeState::Error;
                warn!(node = %node_id, "subscription lost, will resubscribe");
            }
            Err(err) => {
                *state.lock() = BridgeState::Error;
                warn!(node = %node_id, error = %err, "subscribe failed");
            }
        }

        attempt += 1;
        if attempt >= backoff.max_attempts() {
            warn!(node = %node_id, attempts = attempt, "subscription retries exhausted");
            *state.lock() = BridgeState::Closed;
            return;
        }

        *state.lock() = BridgeState::Resubscribing;
        tokio::time::sleep(backoff.delay_for(attempt)).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use mira_core::memory::MemoryAddressSpace;
    use mira_core::session::TargetSession;
    use mira_core::types::Value;

    fn test_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    async fn wait_for_state(
        bridge: &SubscriptionBridge,
        node: &NodeId,
        wanted: BridgeState,
    ) -> bool {
        for _ in 0..100 {
            if bridge.state_of(node) == Some(wanted) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn forwards_value_changes() {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();
        let temp = space
            .create_variable(&root, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let bridge = SubscriptionBridge::new(space.clone(), tx, test_retry());
        bridge.track(temp.clone());

        assert!(wait_for_state(&bridge, &temp, BridgeState::Active).await);

        space.set_value(&temp, Value::Int32(21)).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.node_id, temp);
        assert_eq!(change.value, Value::Int32(21));
    }

    #[tokio::test]
    async fn disconnect_triggers_resubscribe() {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();
        let temp = space
            .create_variable(&root, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let bridge = SubscriptionBridge::new(space.clone(), tx, test_retry());
        bridge.track(temp.clone());
        assert!(wait_for_state(&bridge, &temp, BridgeState::Active).await);

        // Simulated source disconnect closes the notification channel.
        space.drop_all_subscriptions();

        // The bridge recovers on its own and keeps forwarding.
        assert!(wait_for_state(&bridge, &temp, BridgeState::Active).await);
        space.set_value(&temp, Value::Int32(22)).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.value, Value::Int32(22));
    }

    #[tokio::test]
    async fn persistent_failure_closes_subscription() {
        let space = Arc::new(MemoryAddressSpace::new());
        // Track a node that does not exist: every subscribe fails.
        let ghost = NodeId::numeric(9, 404);

        let (tx, _rx) = mpsc::channel(16);
        let bridge = SubscriptionBridge::new(space.clone(), tx, test_retry());
        bridge.track(ghost.clone());

        assert!(wait_for_state(&bridge, &ghost, BridgeState::Closed).await);
        let health = bridge.health();
        assert_eq!(health.closed, 1);
        assert!(!health.is_healthy());
    }

    #[tokio::test]
    async fn teardown_releases_server_side_handle() {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();
        let temp = space
            .create_variable(&root, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let bridge = SubscriptionBridge::new(space.clone(), tx, test_retry());
        bridge.track(temp.clone());
        assert!(wait_for_state(&bridge, &temp, BridgeState::Active).await);
        assert_eq!(space.subscription_count(), 1);

        bridge.teardown(&temp).await;
        assert!(!bridge.is_tracked(&temp));
        assert_eq!(space.subscription_count(), 0);
    }

    #[tokio::test]
    async fn track_is_idempotent() {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();
        let temp = space
            .create_variable(&root, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let bridge = SubscriptionBridge::new(space.clone(), tx, test_retry());
        bridge.track(temp.clone());
        bridge.track(temp.clone());

        assert_eq!(bridge.health().total, 1);
    }
}
