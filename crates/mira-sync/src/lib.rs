// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address-space synchronization engine for MIRA.
//!
//! This crate turns the session capabilities from `mira-core` into a running
//! mirror: it walks a live (possibly large and cyclic) source node graph,
//! reconciles it incrementally against the target, and keeps the mirror
//! consistent as the source changes, tolerating partial failures and
//! disconnects along the way.
//!
//! # Pipeline
//!
//! ```text
//! ┌────────────┐   snapshots   ┌────────────┐   operations   ┌──────────────┐
//! │ TreeWalker │ ────────────► │ Reconciler │ ─────────────► │ MirrorApplier│
//! └────────────┘               └────────────┘                └──────────────┘
//!        ▲                            ▲                             │
//!        │                      MirrorTable ◄──────────────────────┘
//!        │                                                         ▲
//! ┌──────┴─────┐            value-change events                    │
//! │   source   │ ──► SubscriptionBridge ──► event queue ──► update path
//! └────────────┘
//! ```
//!
//! The [`SyncEngine`](engine::SyncEngine) orchestrates the pipeline into
//! repeating cycles and is the only type most callers need.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod apply;
pub mod bridge;
pub mod engine;
pub mod reconcile;
pub mod walker;

// Re-export the engine surface
pub use apply::{ApplyReport, MirrorApplier, OperationOutcome, OutcomeStatus};
pub use bridge::{BridgeHealth, BridgeState, SubscriptionBridge};
pub use engine::{EngineConfig, EngineState, EngineStatus, SyncEngine};
pub use reconcile::{MirrorRecord, MirrorTable, Operation, Reconciler};
pub use walker::{TreeWalker, WalkHandle, WalkReport};
