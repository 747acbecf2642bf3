//! Reconciler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Finalizer token the reconciler places on claims.
pub const DEFAULT_FINALIZER: &str = "dbclaim.io/databaseclaim";

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Finalizer token placed on claims. Backing stores get
    /// `<finalizer>-<claim name>`.
    #[serde(default = "default_finalizer")]
    pub finalizer: String,

    /// Requeue delay while the backing store is missing or not ready.
    #[serde(default = "default_dependency_requeue")]
    pub dependency_requeue_secs: u64,

    /// Poll interval while a provisioning job is in flight.
    #[serde(default = "default_job_poll")]
    pub job_poll_secs: u64,

    /// Keep finished jobs instead of deleting them after success.
    #[serde(default)]
    pub preserve_jobs: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            finalizer: default_finalizer(),
            dependency_requeue_secs: default_dependency_requeue(),
            job_poll_secs: default_job_poll(),
            preserve_jobs: false,
        }
    }
}

impl ReconcilerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty finalizer or a zero
    /// interval.
    pub fn validate(&self) -> Result<()> {
        if self.finalizer.trim().is_empty() {
            return Err(Error::invalid_config("finalizer must not be empty"));
        }

        if self.dependency_requeue_secs == 0 {
            return Err(Error::invalid_config(
                "dependency_requeue_secs must be greater than 0",
            ));
        }

        if self.job_poll_secs == 0 {
            return Err(Error::invalid_config("job_poll_secs must be greater than 0"));
        }

        Ok(())
    }

    #[must_use]
    pub const fn dependency_requeue(&self) -> Duration {
        Duration::from_secs(self.dependency_requeue_secs)
    }

    #[must_use]
    pub const fn job_poll_interval(&self) -> Duration {
        Duration::from_secs(self.job_poll_secs)
    }
}

fn default_finalizer() -> String {
    DEFAULT_FINALIZER.to_string()
}

const fn default_dependency_requeue() -> u64 {
    10
}

const fn default_job_poll() -> u64 {
    5
}
