//! Core types for the reconciler.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where a reconcile invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcilePhase {
    /// The claim no longer exists.
    ClaimNotFound,
    /// Deletion protocol ran for a claim marked for deletion.
    Deleted,
    /// The referenced backing store does not exist yet.
    WaitingForDependency,
    /// The claim's finalizer was added and persisted in this invocation.
    FinalizerAttached,
    /// The backing store exists but is not ready.
    WaitingForDependencyReady,
    /// The provisioning job is in flight.
    Provisioning,
    /// The database exists; status marked completed.
    Completed,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ClaimNotFound => "ClaimNotFound",
            Self::Deleted => "Deleted",
            Self::WaitingForDependency => "WaitingForDependency",
            Self::FinalizerAttached => "FinalizerAttached",
            Self::WaitingForDependencyReady => "WaitingForDependencyReady",
            Self::Provisioning => "Provisioning",
            Self::Completed => "Completed",
        };
        f.write_str(name)
    }
}

/// Result of one reconcile invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileResult {
    pub phase: ReconcilePhase,
    /// Call again after this delay; `None` waits for the next change.
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    /// Finished; no requeue.
    pub const fn done(phase: ReconcilePhase) -> Self {
        Self {
            phase,
            requeue_after: None,
        }
    }

    /// Come back after `delay`.
    pub const fn requeue(phase: ReconcilePhase, delay: Duration) -> Self {
        Self {
            phase,
            requeue_after: Some(delay),
        }
    }

    pub const fn is_requeue(&self) -> bool {
        self.requeue_after.is_some()
    }
}
