//! Error types for the reconciler crate.

use dbclaim_core::ObjectKey;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Object store call failed (I/O, permission). Retried by the caller.
    #[error("object store operation '{operation}' failed: {reason}")]
    Store { operation: String, reason: String },

    /// Optimistic write lost against a newer version.
    #[error("{kind} '{key}' was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        kind: String,
        key: ObjectKey,
        expected: u64,
        found: u64,
    },

    /// Object does not exist.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: ObjectKey },

    /// Claim is missing data the reconciler requires.
    #[error("invalid claim '{key}': {reason}")]
    InvalidClaim { key: ObjectKey, reason: String },

    /// Provisioning job terminated unsuccessfully.
    #[error("action '{action}' failed in job '{job}': {reason}")]
    ProvisioningFailed {
        action: String,
        job: ObjectKey,
        reason: String,
    },

    /// Job input could not be hashed.
    #[error("failed to hash job input: {reason}")]
    Hash { reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a store error.
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(kind: impl Into<String>, key: ObjectKey) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key,
        }
    }

    /// Create an invalid claim error.
    pub fn invalid_claim(key: ObjectKey, reason: impl Into<String>) -> Self {
        Self::InvalidClaim {
            key,
            reason: reason.into(),
        }
    }

    /// Create a provisioning failure.
    pub fn provisioning_failed(
        action: impl Into<String>,
        job: ObjectKey,
        reason: impl Into<String>,
    ) -> Self {
        Self::ProvisioningFailed {
            action: action.into(),
            job,
            reason: reason.into(),
        }
    }

    /// Create a hash error.
    pub fn hash(reason: impl Into<String>) -> Self {
        Self::Hash {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether this error is the "does not exist" condition.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
