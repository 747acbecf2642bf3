//! Provisioning job runner trait and implementations.
//!
//! A [`JobRunner`] is the substrate that actually runs one-shot jobs. The
//! reconciler only needs to look a job up, dispatch one, and clean one up;
//! scheduling the workload is the runner's business.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dbclaim_core::ObjectKey;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::payload::DbCreatePayload;

/// A job to run, identified by key and stamped with its input hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub key: ObjectKey,
    /// Action name, also the status hash key.
    pub action: String,
    pub payload: DbCreatePayload,
    /// Hash of `payload` the job was created from.
    pub hash: String,
}

/// Observed state of a dispatched job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Running,
    Succeeded,
    Failed { reason: String },
}

/// A dispatched job and its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub definition: JobDefinition,
    pub state: JobState,
}

/// Trait for job runner backends.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Look up a job by key.
    async fn get(&self, key: &ObjectKey) -> Result<Option<JobRecord>>;

    /// Dispatch a job. If one already exists under the key it is returned
    /// untouched.
    async fn create(&self, definition: &JobDefinition) -> Result<JobRecord>;

    /// Delete a job. Deleting a missing job is not an error.
    async fn delete(&self, key: &ObjectKey) -> Result<()>;
}

/// How [`InMemoryJobRunner`] finishes running jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JobCompletion {
    /// Jobs stay running until [`InMemoryJobRunner::set_state`].
    #[default]
    Manual,
    /// Jobs finish with this state the first time they are looked up.
    OnFirstPoll(JobState),
}

/// In-memory job runner for tests and local simulation.
#[derive(Default)]
pub struct InMemoryJobRunner {
    jobs: RwLock<HashMap<ObjectKey, JobRecord>>,
    completion: JobCompletion,
    dispatches: AtomicUsize,
}

impl InMemoryJobRunner {
    /// Create a runner whose jobs are finished manually.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner with the given completion behavior.
    pub fn with_completion(completion: JobCompletion) -> Self {
        Self {
            completion,
            ..Self::default()
        }
    }

    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Force a job into `state`. Returns `false` if the job does not exist.
    pub async fn set_state(&self, key: &ObjectKey, state: JobState) -> bool {
        self.jobs
            .write()
            .await
            .get_mut(key)
            .map(|record| record.state = state)
            .is_some()
    }

    /// Number of jobs dispatched so far.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    pub async fn job(&self, key: &ObjectKey) -> Option<JobRecord> {
        self.jobs.read().await.get(key).cloned()
    }
}

#[async_trait]
impl JobRunner for InMemoryJobRunner {
    async fn get(&self, key: &ObjectKey) -> Result<Option<JobRecord>> {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(key) else {
            return Ok(None);
        };

        if let (JobCompletion::OnFirstPoll(state), JobState::Running) =
            (&self.completion, &record.state)
        {
            record.state = state.clone();
        }
        Ok(Some(record.clone()))
    }

    async fn create(&self, definition: &JobDefinition) -> Result<JobRecord> {
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs.get(&definition.key) {
            return Ok(existing.clone());
        }

        let record = JobRecord {
            definition: definition.clone(),
            state: JobState::Running,
        };
        jobs.insert(definition.key.clone(), record.clone());
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.jobs.write().await.remove(key);
        Ok(())
    }
}
