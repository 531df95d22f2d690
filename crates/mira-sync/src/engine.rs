// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sync cycle orchestration.
//!
//! The [`SyncEngine`] ties the pipeline together and owns its concurrency
//! story:
//!
//! - Full sync (walk -> reconcile -> apply) runs for the initial mirror and
//!   on the periodic resync interval for drift correction.
//! - Subscription notifications drain from one ordered event queue and
//!   replay through the applier's update path without re-walking.
//! - All mutations of the mirror table and the target session are
//!   serialized behind the table lock: a full resync and an incremental
//!   update can never interleave mid-operation-sequence, and the target only
//!   ever sees one writer. Events arriving during a full sync stay queued
//!   until the cycle completes.
//! - Transport failures retry with capped exponential backoff; exhaustion
//!   marks the engine `Degraded` and surfaces it through `status()` instead
//!   of retrying forever. A later successful cycle recovers to `Running`.
//!
//! `stop()` is graceful: the in-flight cycle finishes before the worker
//! halts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mira_core::cancel::CancelToken;
use mira_core::error::{SyncError, SyncResult};
use mira_core::retry::{ExponentialBackoff, RetryConfig};
use mira_core::session::{SourceSession, TargetSession, ValueChange};
use mira_core::types::NodeId;

use crate::apply::{ApplyReport, MirrorApplier};
use crate::bridge::{BridgeHealth, SubscriptionBridge};
use crate::reconcile::{MirrorTable, Operation, Reconciler};
use crate::walker::TreeWalker;

// =============================================================================
// EngineConfig
// =============================================================================

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Source node the mirror is rooted at. The null node id means "ask the
    /// source session for its root".
    pub root_node_id: NodeId,

    /// Target node the mirrored root attaches under.
    pub target_root: NodeId,

    /// Period between drift-correcting full resyncs. `None` disables the
    /// periodic resync; the initial full sync always runs.
    pub full_resync_interval: Option<Duration>,

    /// Backoff policy for transport recovery (root resolution and
    /// subscription repair).
    pub retry: RetryConfig,

    /// Bound on the walker's snapshot channel.
    pub walk_channel_capacity: usize,

    /// Bound on the subscription event queue.
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_node_id: NodeId::numeric(0, 0),
            target_root: NodeId::OBJECTS_FOLDER,
            full_resync_interval: None,
            retry: RetryConfig::default(),
            walk_channel_capacity: 64,
            event_queue_capacity: 256,
        }
    }
}

// =============================================================================
// EngineState / EngineStatus
// =============================================================================

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Constructed, not started.
    #[default]
    Idle,

    /// Sync cycles are running.
    Running,

    /// Retries were exhausted; the engine keeps running but needs attention.
    Degraded,

    /// Graceful stop requested; the in-flight cycle is finishing.
    Stopping,

    /// Stopped.
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Point-in-time engine status, as returned by [`SyncEngine::status`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Lifecycle state.
    pub state: EngineState,

    /// `true` while the engine, its subscriptions, and the last apply batch
    /// are all clean.
    pub healthy: bool,

    /// Completed full sync cycles.
    pub cycles_completed: u64,

    /// Applied subscription-driven updates.
    pub incremental_updates: u64,

    /// When the last full sync finished.
    pub last_full_sync: Option<DateTime<Utc>>,

    /// The most recent apply report (full or incremental).
    pub last_report: Option<ApplyReport>,

    /// Aggregate subscription health.
    pub subscriptions: BridgeHealth,
}

// =============================================================================
// SyncEngine
// =============================================================================

struct EngineShared {
    source: Arc<dyn SourceSession>,
    config: EngineConfig,
    walker: TreeWalker,
    applier: MirrorApplier,
    bridge: SubscriptionBridge,
    backoff: ExponentialBackoff,
    table: tokio::sync::Mutex<MirrorTable>,
    state: Mutex<EngineState>,
    last_report: Mutex<Option<ApplyReport>>,
    last_full_sync: Mutex<Option<DateTime<Utc>>>,
    cycles: AtomicU64,
    incremental: AtomicU64,
    cancel: CancelToken,
}

/// Orchestrates full and incremental sync cycles against a source/target
/// session pair.
pub struct SyncEngine {
    shared: Arc<EngineShared>,
    events_rx: Mutex<Option<mpsc::Receiver<ValueChange>>>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Creates an engine over the given session capabilities.
    pub fn new(
        source: Arc<dyn SourceSession>,
        target: Arc<dyn TargetSession>,
        config: EngineConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(EngineShared {
            walker: TreeWalker::with_capacity(config.walk_channel_capacity),
            applier: MirrorApplier::new(target, config.target_root.clone()),
            bridge: SubscriptionBridge::new(source.clone(), events_tx, config.retry.clone()),
            backoff: ExponentialBackoff::new(config.retry.clone()),
            source,
            config,
            table: tokio::sync::Mutex::new(MirrorTable::new()),
            state: Mutex::new(EngineState::Idle),
            last_report: Mutex::new(None),
            last_full_sync: Mutex::new(None),
            cycles: AtomicU64::new(0),
            incremental: AtomicU64::new(0),
            cancel: CancelToken::new(),
        });

        Self {
            shared,
            events_rx: Mutex::new(Some(events_rx)),
            shutdown_tx,
            worker: Mutex::new(None),
        }
    }

    /// Starts the background worker: an initial full sync, then event-driven
    /// incremental updates interleaved with periodic resyncs.
    pub fn start(&self) -> SyncResult<()> {
        let events = self
            .events_rx
            .lock()
            .take()
            .ok_or_else(|| SyncError::invalid_state("engine already started"))?;

        *self.shared.state.lock() = EngineState::Running;
        let shared = self.shared.clone();
        let shutdown = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(run_loop(shared, events, shutdown));
        *self.worker.lock() = Some(handle);

        info!("sync engine started");
        Ok(())
    }

    /// Requests a graceful stop and waits for the worker to finish its
    /// in-flight cycle.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if matches!(*state, EngineState::Stopped) {
                return;
            }
            *state = EngineState::Stopping;
        }

        let _ = self.shutdown_tx.send(true);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        self.shared.bridge.shutdown().await;

        *self.shared.state.lock() = EngineState::Stopped;
        info!("sync engine stopped");
    }

    /// Runs one full sync cycle (walk, reconcile, apply) immediately.
    ///
    /// Used by the worker loop, and directly by callers that want a
    /// one-shot mirror without starting the background worker.
    pub async fn run_full_sync(&self) -> SyncResult<ApplyReport> {
        EngineShared::full_sync(&self.shared).await
    }

    /// Applies one subscription event through the incremental path.
    pub async fn run_incremental(&self, change: ValueChange) {
        EngineShared::incremental(&self.shared, change).await;
    }

    /// Returns the current engine status.
    pub fn status(&self) -> EngineStatus {
        let state = *self.shared.state.lock();
        let subscriptions = self.shared.bridge.health();
        let last_report = self.shared.last_report.lock().clone();

        let healthy = matches!(state, EngineState::Idle | EngineState::Running)
            && subscriptions.is_healthy()
            && last_report.as_ref().map(ApplyReport::is_clean).unwrap_or(true);

        EngineStatus {
            state,
            healthy,
            cycles_completed: self.shared.cycles.load(Ordering::Relaxed),
            incremental_updates: self.shared.incremental.load(Ordering::Relaxed),
            last_full_sync: *self.shared.last_full_sync.lock(),
            last_report,
            subscriptions,
        }
    }

    /// Number of nodes currently mirrored.
    pub async fn mirrored_count(&self) -> usize {
        self.shared.table.lock().await.len()
    }
}

impl EngineShared {
    /// Resolves the walk root from configuration or the source session.
    async fn resolve_root(&self) -> SyncResult<NodeId> {
        if !self.config.root_node_id.is_null() {
            return Ok(self.config.root_node_id.clone());
        }
        self.backoff
            .execute("resolve-root", || self.source.root())
            .await
    }

    async fn full_sync(shared: &Arc<Self>) -> SyncResult<ApplyReport> {
        let root = shared.resolve_root().await?;

        let handle = shared
            .walker
            .walk(shared.source.clone(), root, shared.cancel.clone());
        let (snapshots, walk_report) = handle.collect().await;

        if walk_report.cancelled {
            return Err(SyncError::Cancelled);
        }
        if !walk_report.errors.is_empty() {
            warn!(
                partial_nodes = walk_report.errors.len(),
                "walk finished with enumeration failures; their subtrees are \
                 excluded from delete inference this cycle"
            );
        }

        // The table lock is the cycle-scoped exclusivity token: queued
        // subscription events cannot touch the table or target until the
        // whole operation sequence has been applied.
        let mut table = shared.table.lock().await;
        let operations = Reconciler::reconcile(&table, &snapshots);
        info!(
            nodes = snapshots.len(),
            operations = operations.len(),
            mirrored = table.len(),
            "full sync cycle"
        );
        let report = shared.applier.apply(&operations, &mut table, &shared.cancel).await;
        drop(table);

        // Subscription maintenance follows the apply outcome: deletes tear
        // down first so a torn-down node can never re-enter the queue ahead
        // of its removal.
        for node in &report.deleted_variables {
            shared.bridge.teardown(node).await;
        }
        for node in &report.created_variables {
            shared.bridge.track(node.clone());
        }

        *shared.last_report.lock() = Some(report.clone());
        *shared.last_full_sync.lock() = Some(Utc::now());
        shared.cycles.fetch_add(1, Ordering::Relaxed);

        let mut state = shared.state.lock();
        if matches!(*state, EngineState::Running | EngineState::Degraded | EngineState::Idle) {
            *state = EngineState::Running;
        }

        Ok(report)
    }

    async fn incremental(shared: &Arc<Self>, change: ValueChange) {
        let mut table = shared.table.lock().await;

        // The node may have been deleted between the notification and now.
        let Some(record) = table.get(&change.node_id) else {
            debug!(node = %change.node_id, "dropping event for unmirrored node");
            return;
        };

        let operation = Operation::UpdateValue {
            node: change.node_id.clone(),
            display_name: record.display_name.clone(),
            value: Some(change.value),
        };

        let report = shared
            .applier
            .apply(std::slice::from_ref(&operation), &mut table, &shared.cancel)
            .await;
        drop(table);

        if report.is_clean() {
            shared.incremental.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(node = %change.node_id, report = %report, "incremental update failed");
        }
        *shared.last_report.lock() = Some(report);
    }

    fn mark_degraded(&self, error: &SyncError) {
        error.log("full-sync");
        let mut state = self.state.lock();
        if !matches!(*state, EngineState::Stopping | EngineState::Stopped) {
            *state = EngineState::Degraded;
        }
    }
}

// =============================================================================
// Worker loop
// =============================================================================

async fn run_loop(
    shared: Arc<EngineShared>,
    mut events: mpsc::Receiver<ValueChange>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Initial structural mirror.
    if let Err(err) = EngineShared::full_sync(&shared).await {
        shared.mark_degraded(&err);
    }

    let mut resync = shared.config.full_resync_interval.map(|period| {
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            _ = tick_or_never(&mut resync) => {
                if let Err(err) = EngineShared::full_sync(&shared).await {
                    shared.mark_degraded(&err);
                }
            }

            event = events.recv() => match event {
                Some(change) => EngineShared::incremental(&shared, change).await,
                None => break,
            },
        }
    }

    debug!("engine worker exited");
}

async fn tick_or_never(resync: &mut Option<tokio::time::Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
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

    fn fast_config() -> EngineConfig {
        EngineConfig {
            retry: RetryConfig {
                max_attempts: 2,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
                jitter: 0.0,
            },
            ..Default::default()
        }
    }

    async fn seeded_pair() -> (Arc<MemoryAddressSpace>, Arc<MemoryAddressSpace>, NodeId) {
        let source = Arc::new(MemoryAddressSpace::new());
        let target = Arc::new(MemoryAddressSpace::with_root(
            NodeId::OBJECTS_FOLDER,
            "Objects",
            3,
        ));
        let root = source.root_id();
        let device = source.create_object(&root, "Device1").await.unwrap();
        source
            .create_variable(&device, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();
        (source, target, device)
    }

    #[tokio::test]
    async fn one_shot_full_sync_mirrors_the_tree() {
        let (source, target, _device) = seeded_pair().await;
        let engine = SyncEngine::new(source, target.clone(), fast_config());

        let report = engine.run_full_sync().await.unwrap();
        assert_eq!(report.created, 3);
        assert!(report.is_clean());
        assert_eq!(engine.mirrored_count().await, 3);

        // The mirrored names exist on the target.
        assert!(target.find_by_name("Device1").is_some());
        assert!(target.find_by_name("temp").is_some());
    }

    #[tokio::test]
    async fn second_sync_is_a_no_op() {
        let (source, target, _device) = seeded_pair().await;
        let engine = SyncEngine::new(source, target, fast_config());

        engine.run_full_sync().await.unwrap();
        let report = engine.run_full_sync().await.unwrap();
        assert_eq!(report.total(), 0);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (source, target, _device) = seeded_pair().await;
        let engine = SyncEngine::new(source, target, fast_config());

        engine.start().unwrap();
        assert!(matches!(
            engine.start(),
            Err(SyncError::InvalidState { .. })
        ));
        engine.stop().await;
        assert_eq!(engine.status().state, EngineState::Stopped);
    }

    #[tokio::test]
    async fn value_drift_corrected_by_resync() {
        let (source, target, _device) = seeded_pair().await;
        let engine = SyncEngine::new(source.clone(), target.clone(), fast_config());

        engine.run_full_sync().await.unwrap();
        let temp = source.find_by_name("temp").unwrap();
        source.set_value(&temp, Value::Int32(25)).await.unwrap();

        let report = engine.run_full_sync().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 0);

        let mirrored_temp = target.find_by_name("temp").unwrap();
        assert_eq!(target.value_of(&mirrored_temp), Some(Value::Int32(25)));
    }

    #[tokio::test]
    async fn incremental_event_updates_mirror() {
        let (source, target, _device) = seeded_pair().await;
        let engine = SyncEngine::new(source.clone(), target.clone(), fast_config());
        engine.run_full_sync().await.unwrap();

        let temp = source.find_by_name("temp").unwrap();
        engine
            .run_incremental(ValueChange::now(temp, Value::Int32(99)))
            .await;

        let mirrored_temp = target.find_by_name("temp").unwrap();
        assert_eq!(target.value_of(&mirrored_temp), Some(Value::Int32(99)));
        assert_eq!(engine.status().incremental_updates, 1);
    }

    #[tokio::test]
    async fn event_for_unmirrored_node_is_dropped() {
        let (source, target, _device) = seeded_pair().await;
        let engine = SyncEngine::new(source, target, fast_config());
        engine.run_full_sync().await.unwrap();

        engine
            .run_incremental(ValueChange::now(NodeId::numeric(9, 404), Value::Int32(1)))
            .await;
        assert_eq!(engine.status().incremental_updates, 0);
    }

    #[tokio::test]
    async fn removed_device_is_deleted_from_target() {
        let (source, target, device) = seeded_pair().await;
        let engine = SyncEngine::new(source.clone(), target.clone(), fast_config());
        engine.run_full_sync().await.unwrap();

        source.remove_subtree(&device);
        let report = engine.run_full_sync().await.unwrap();

        assert_eq!(report.deleted, 2);
        assert!(target.find_by_name("Device1").is_none());
        assert!(target.find_by_name("temp").is_none());
        assert_eq!(engine.mirrored_count().await, 1);
    }

    #[tokio::test]
    async fn status_reflects_cycles_and_health() {
        let (source, target, _device) = seeded_pair().await;
        let engine = SyncEngine::new(source, target, fast_config());

        let before = engine.status();
        assert_eq!(before.state, EngineState::Idle);
        assert!(before.healthy);
        assert_eq!(before.cycles_completed, 0);

        engine.run_full_sync().await.unwrap();
        let after = engine.status();
        assert_eq!(after.cycles_completed, 1);
        assert!(after.last_full_sync.is_some());
        assert!(after.last_report.is_some());
    }
}
