//! Hash-gated execution of one-shot provisioning jobs.
//!
//! [`JobExecutor::run`] is called on every reconcile. It only dispatches a job
//! when the hash of the job's input differs from the hash the claim status
//! last recorded for the action, and it never blocks: while a job is in
//! flight it asks the caller to come back later.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hash::hash_payload;
use crate::payload::DbCreatePayload;
use crate::runner::{JobDefinition, JobRunner, JobState};

/// Result of one [`JobExecutor::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job dispatched or still running; poll again after the delay.
    Requeue(Duration),
    /// Job input is applied. `changed` is false when nothing had to run.
    Done { changed: bool, hash: String },
}

/// Runs provisioning actions through a [`JobRunner`].
#[derive(Clone)]
pub struct JobExecutor {
    runner: Arc<dyn JobRunner>,
    preserve_jobs: bool,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(runner: Arc<dyn JobRunner>, preserve_jobs: bool) -> Self {
        Self {
            runner,
            preserve_jobs,
        }
    }

    /// Drive `action` for `payload` one step forward.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProvisioningFailed`] when the job terminated
    /// unsuccessfully, [`Error::Hash`] if the payload cannot be hashed, and
    /// any runner error unchanged.
    pub async fn run(
        &self,
        action: &str,
        payload: DbCreatePayload,
        last_hash: Option<&str>,
        stale_after: Duration,
    ) -> Result<JobOutcome> {
        let hash = hash_payload(&payload)?;
        let key = payload.job_key();

        if last_hash == Some(hash.as_str()) {
            debug!(action, job = %key, hash = %hash, "Job input unchanged");
            return Ok(JobOutcome::Done {
                changed: false,
                hash,
            });
        }

        let definition = JobDefinition {
            key: key.clone(),
            action: action.to_string(),
            payload,
            hash: hash.clone(),
        };

        let Some(record) = self.runner.get(&key).await? else {
            self.dispatch(&definition).await?;
            return Ok(JobOutcome::Requeue(stale_after));
        };

        if record.definition.hash != hash {
            info!(
                action,
                job = %key,
                old_hash = %record.definition.hash,
                new_hash = %hash,
                "Job input changed, replacing job"
            );
            self.runner.delete(&key).await?;
            self.dispatch(&definition).await?;
            return Ok(JobOutcome::Requeue(stale_after));
        }

        match record.state {
            JobState::Running => {
                debug!(action, job = %key, "Job still running");
                Ok(JobOutcome::Requeue(stale_after))
            }
            JobState::Failed { reason } => {
                warn!(action, job = %key, reason = %reason, "Job failed");
                Err(Error::provisioning_failed(action, key, reason))
            }
            JobState::Succeeded => {
                info!(action, job = %key, hash = %hash, "Job succeeded");
                if !self.preserve_jobs {
                    self.runner.delete(&key).await?;
                }
                Ok(JobOutcome::Done {
                    changed: true,
                    hash,
                })
            }
        }
    }

    async fn dispatch(&self, definition: &JobDefinition) -> Result<()> {
        info!(
            action = %definition.action,
            job = %definition.key,
            hash = %definition.hash,
            "Dispatching job"
        );
        self.runner.create(definition).await.map(|_| ())
    }
}
