// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for address-space mirroring.
//!
//! The taxonomy follows the recovery policy of each failure class rather
//! than its origin:
//!
//! ```text
//! SyncError
//! ├── Transport    - connection lost; retried with backoff, never fatal at once
//! ├── Enumeration  - child listing failed; snapshot marked partial, walk continues
//! ├── Read         - value/attribute unreadable; field left absent, not an error
//! ├── Operation    - per-node create/write/delete failure; isolated, batch continues
//! ├── Identity     - malformed node identifier
//! ├── Cancelled    - cooperative cancellation at a node boundary
//! └── RetriesExhausted - backoff gave up; engine surfaces Degraded
//! ```
//!
//! # Example
//!
//! ```
//! use mira_core::error::{SyncError, TransportError};
//!
//! let error = SyncError::from(TransportError::connection_lost("keepalive missed"));
//! assert!(error.is_retryable());
//! assert_eq!(error.category(), "transport");
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::types::NodeId;

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Severity classification used for logging and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected condition, informational only.
    Info,

    /// Degraded but recoverable condition.
    Warning,

    /// Operation failed; the batch or cycle continues.
    Error,

    /// The engine cannot make progress without intervention.
    Critical,
}

impl ErrorSeverity {
    /// Maps the severity to a tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// =============================================================================
// TransportError
// =============================================================================

/// Session transport failures.
///
/// Transport errors are always treated as transient: the owning component
/// retries with exponential backoff up to the configured cap before the
/// engine surfaces a `Degraded` status.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection to the peer was lost.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Why the connection dropped, as far as the transport knows.
        reason: String,
    },

    /// The peer refused the connection.
    #[error("connection refused to '{endpoint}'")]
    Refused {
        /// Target endpoint.
        endpoint: String,
    },

    /// The operation timed out.
    #[error("request timed out after {duration:?}")]
    TimedOut {
        /// Elapsed time before giving up.
        duration: Duration,
    },

    /// No session is currently established.
    #[error("not connected")]
    NotConnected,

    /// The session was closed by the peer.
    #[error("session closed by peer")]
    Closed,
}

impl TransportError {
    /// Creates a connection lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Creates a connection refused error.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timed_out(duration: Duration) -> Self {
        Self::TimedOut { duration }
    }

    /// Transport errors are always retryable.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::TimedOut { .. } | Self::NotConnected => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

// =============================================================================
// EnumerationError
// =============================================================================

/// Child enumeration failure during a walk.
///
/// The walker records the failing node in the walk error set, marks its
/// snapshot `partial`, and keeps going. Partial subtrees are excluded from
/// delete inference so a transient enumeration failure can never cascade
/// into data loss on the target.
#[derive(Debug, Clone, Error)]
pub enum EnumerationError {
    /// The server rejected or failed the browse request.
    #[error("enumeration failed for node '{node_id}': {reason}")]
    Failed {
        /// The node whose children could not be listed.
        node_id: NodeId,
        /// Failure detail.
        reason: String,
    },

    /// The session does not permit browsing this node.
    #[error("access denied enumerating node '{node_id}'")]
    AccessDenied {
        /// The node whose children could not be listed.
        node_id: NodeId,
    },

    /// The transport dropped mid-enumeration.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl EnumerationError {
    /// Creates an enumeration failed error.
    pub fn failed(node_id: NodeId, reason: impl Into<String>) -> Self {
        Self::Failed {
            node_id,
            reason: reason.into(),
        }
    }

    /// Creates an access denied error.
    pub fn access_denied(node_id: NodeId) -> Self {
        Self::AccessDenied { node_id }
    }

    /// Returns `true` if retrying the enumeration could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Transport(_))
    }
}

// =============================================================================
// ReadError
// =============================================================================

/// Attribute or value read failure.
///
/// An unreadable value is a policy outcome, not an error: the snapshot field
/// is left absent and the node is still emitted.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// The node's value or attribute cannot be read.
    #[error("node '{node_id}' is unreadable: {reason}")]
    Unreadable {
        /// The node that could not be read.
        node_id: NodeId,
        /// Failure detail.
        reason: String,
    },

    /// The transport dropped mid-read.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ReadError {
    /// Creates an unreadable error.
    pub fn unreadable(node_id: NodeId, reason: impl Into<String>) -> Self {
        Self::Unreadable {
            node_id,
            reason: reason.into(),
        }
    }

    /// Returns `true` for the benign unreadable-value case.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::Unreadable { .. })
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Per-operation failure while mutating the target session.
///
/// Each operation's failure is isolated: the applier records it in the
/// report and rolls forward. A single node failure never aborts a batch.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// Node creation on the target failed.
    #[error("create failed for '{display_name}' under '{parent}': {reason}")]
    CreateFailed {
        /// Display name of the node being created.
        display_name: String,
        /// Target parent the node was being attached to.
        parent: NodeId,
        /// Failure detail.
        reason: String,
    },

    /// Value write on the target failed.
    #[error("write failed for node '{node_id}': {reason}")]
    WriteFailed {
        /// Target node being written.
        node_id: NodeId,
        /// Failure detail.
        reason: String,
    },

    /// Node deletion on the target failed.
    #[error("delete failed for node '{node_id}': {reason}")]
    DeleteFailed {
        /// Target node being deleted.
        node_id: NodeId,
        /// Failure detail.
        reason: String,
    },

    /// The transport dropped mid-operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl OperationError {
    /// Creates a create failed error.
    pub fn create_failed(
        display_name: impl Into<String>,
        parent: NodeId,
        reason: impl Into<String>,
    ) -> Self {
        Self::CreateFailed {
            display_name: display_name.into(),
            parent,
            reason: reason.into(),
        }
    }

    /// Creates a write failed error.
    pub fn write_failed(node_id: NodeId, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            node_id,
            reason: reason.into(),
        }
    }

    /// Creates a delete failed error.
    pub fn delete_failed(node_id: NodeId, reason: impl Into<String>) -> Self {
        Self::DeleteFailed {
            node_id,
            reason: reason.into(),
        }
    }

    /// Returns the error kind label used in apply reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateFailed { .. } => "create",
            Self::WriteFailed { .. } => "write",
            Self::DeleteFailed { .. } => "delete",
            Self::Transport(_) => "transport",
        }
    }

    /// Returns `true` if retrying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// =============================================================================
// IdentityError
// =============================================================================

/// Malformed node identifier.
#[derive(Debug, Clone, Error)]
#[error("malformed node id '{input}': {reason}")]
pub struct IdentityError {
    /// The offending input.
    pub input: String,
    /// Why parsing failed.
    pub reason: String,
}

impl IdentityError {
    /// Creates a malformed identifier error.
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// SyncError
// =============================================================================

/// Umbrella error for engine-level failures.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Transport failure that escaped local retry.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Enumeration failure escalated past the walk.
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    /// Read failure escalated past the walk.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Target mutation failure escalated past the applier.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Malformed node identifier.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The operation was cancelled at a node boundary.
    #[error("cancelled")]
    Cancelled,

    /// The engine was driven through an invalid lifecycle transition.
    #[error("invalid engine state: {message}")]
    InvalidState {
        /// What went wrong.
        message: String,
    },

    /// Backoff retries were exhausted.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The final error, rendered.
        last_error: String,
    },
}

impl SyncError {
    /// Creates a retries exhausted error.
    pub fn retries_exhausted(attempts: u32, last_error: impl fmt::Display) -> Self {
        Self::RetriesExhausted {
            attempts,
            last_error: last_error.to_string(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns `true` if the condition is transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Enumeration(e) => e.is_retryable(),
            Self::Read(_) => false,
            Self::Operation(e) => e.is_retryable(),
            Self::Identity(_) => false,
            Self::Cancelled => false,
            Self::InvalidState { .. } => false,
            Self::RetriesExhausted { .. } => false,
        }
    }

    /// Returns the error category for logging and status reporting.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Enumeration(_) => "enumeration",
            Self::Read(_) => "read",
            Self::Operation(_) => "operation",
            Self::Identity(_) => "identity",
            Self::Cancelled => "cancelled",
            Self::InvalidState { .. } => "state",
            Self::RetriesExhausted { .. } => "retries-exhausted",
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Transport(e) => e.severity(),
            Self::Enumeration(_) => ErrorSeverity::Warning,
            Self::Read(_) => ErrorSeverity::Info,
            Self::Operation(_) => ErrorSeverity::Error,
            Self::Identity(_) => ErrorSeverity::Error,
            Self::Cancelled => ErrorSeverity::Info,
            Self::InvalidState { .. } => ErrorSeverity::Error,
            Self::RetriesExhausted { .. } => ErrorSeverity::Critical,
        }
    }

    /// Logs this error at the level matching its severity.
    pub fn log(&self, context: &str) {
        match self.severity().to_tracing_level() {
            Level::ERROR => tracing::error!(
                category = self.category(),
                context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                category = self.category(),
                context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                category = self.category(),
                context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

/// Convenience result alias for engine-level operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(TransportError::connection_lost("x").is_retryable());
        assert!(TransportError::NotConnected.is_retryable());
        assert!(TransportError::timed_out(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn sync_error_categories() {
        let e = SyncError::from(TransportError::NotConnected);
        assert_eq!(e.category(), "transport");
        assert!(e.is_retryable());

        let e = SyncError::from(OperationError::write_failed(
            NodeId::numeric(2, 1),
            "bad status",
        ));
        assert_eq!(e.category(), "operation");
        assert!(!e.is_retryable());

        let e = SyncError::Cancelled;
        assert!(!e.is_retryable());
        assert_eq!(e.severity(), ErrorSeverity::Info);
    }

    #[test]
    fn retries_exhausted_is_critical() {
        let e = SyncError::retries_exhausted(5, TransportError::NotConnected);
        assert_eq!(e.severity(), ErrorSeverity::Critical);
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("5 attempts"));
    }

    #[test]
    fn operation_error_kinds() {
        let parent = NodeId::numeric(2, 1);
        assert_eq!(
            OperationError::create_failed("Device1", parent.clone(), "full").kind(),
            "create"
        );
        assert_eq!(
            OperationError::write_failed(parent.clone(), "x").kind(),
            "write"
        );
        assert_eq!(OperationError::delete_failed(parent, "x").kind(), "delete");
    }
}
