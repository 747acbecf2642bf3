//! Reconciler implementation.

use std::sync::Arc;

use dbclaim_core::{DB_CREATE_HASH, DatabaseClaim, ObjectKey};
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::finalizer::FinalizerCoordinator;
use crate::job::{JobExecutor, JobOutcome};
use crate::payload::DbCreatePayload;
use crate::resolver::{Resolution, resolve};
use crate::runner::JobRunner;
use crate::store::ObjectStore;
use crate::types::{ReconcilePhase, ReconcileResult};

/// K8s-style reconciler for database claims.
///
/// Every call re-derives its decisions from stored state: the claim's
/// finalizers and status hashes, the backing store's finalizers and
/// readiness, and the state of the provisioning job.
pub struct Reconciler {
    /// Object store holding claims and backing stores.
    store: Arc<dyn ObjectStore>,
    finalizers: FinalizerCoordinator,
    jobs: JobExecutor,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        runner: Arc<dyn JobRunner>,
        config: ReconcilerConfig,
    ) -> Self {
        let finalizers = FinalizerCoordinator::new(store.clone(), config.finalizer.clone());
        let jobs = JobExecutor::new(runner, config.preserve_jobs);
        Self {
            store,
            finalizers,
            jobs,
            config,
        }
    }

    /// Reconcile the claim stored under `key`.
    ///
    /// The claim's status is patched exactly once before returning, whatever
    /// the outcome, as long as the claim could be fetched.
    ///
    /// # Errors
    ///
    /// Returns store errors, [`Error::InvalidClaim`] for a claim without a
    /// backing store name, and [`Error::ProvisioningFailed`] when the
    /// database creation job failed.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileResult> {
        let Some(mut claim) = self.store.get_claim(key).await? else {
            debug!(claim = %key, "Claim not found, nothing to do");
            return Ok(ReconcileResult::done(ReconcilePhase::ClaimNotFound));
        };

        debug!(
            claim = %key,
            deleting = claim.metadata.is_deleting(),
            version = claim.metadata.resource_version,
            "Starting reconciliation"
        );

        let outcome = self.reconcile_claim(&mut claim).await;
        let patched = self.patch_status(&claim).await;

        match (outcome, patched) {
            (Ok(result), Ok(())) => {
                info!(
                    claim = %key,
                    phase = %result.phase,
                    requeue_after = ?result.requeue_after,
                    "Reconciliation complete"
                );
                Ok(result)
            }
            (Ok(_), Err(e)) | (Err(e), Ok(())) => {
                warn!(claim = %key, error = %e, "Reconciliation failed");
                Err(e)
            }
            (Err(e), Err(patch_err)) => {
                warn!(
                    claim = %key,
                    error = %e,
                    patch_error = %patch_err,
                    "Reconciliation failed and status could not be persisted"
                );
                Err(e)
            }
        }
    }

    async fn reconcile_claim(&self, claim: &mut DatabaseClaim) -> Result<ReconcileResult> {
        let resolution = resolve(self.store.as_ref(), claim).await;

        if claim.metadata.is_deleting() {
            return self.reconcile_delete(claim, resolution).await;
        }

        let Resolution::Found(mut backing) = resolution? else {
            info!(
                claim = %claim.metadata.key(),
                backing_store = ?claim.backing_store_name(),
                "Backing store not found, requeue"
            );
            return Ok(ReconcileResult::requeue(
                ReconcilePhase::WaitingForDependency,
                self.config.dependency_requeue(),
            ));
        };

        let attachment = self.finalizers.attach(claim, &mut backing).await?;
        if attachment.claim_attached {
            // The claim's finalizer is committed on its own; provisioning
            // starts on the next invocation.
            return Ok(ReconcileResult::done(ReconcilePhase::FinalizerAttached));
        }

        if !backing.is_ready() {
            info!(
                claim = %claim.metadata.key(),
                kind = %backing.kind(),
                backing_store = %backing.metadata().key(),
                "Backing store not ready, requeue"
            );
            return Ok(ReconcileResult::requeue(
                ReconcilePhase::WaitingForDependencyReady,
                self.config.dependency_requeue(),
            ));
        }

        let payload = DbCreatePayload::new(claim, &backing.connection());
        let last_hash = claim.status.hash_for(DB_CREATE_HASH).map(str::to_owned);

        let outcome = self
            .jobs
            .run(
                DB_CREATE_HASH,
                payload,
                last_hash.as_deref(),
                self.config.job_poll_interval(),
            )
            .await?;

        match outcome {
            JobOutcome::Requeue(delay) => Ok(ReconcileResult::requeue(
                ReconcilePhase::Provisioning,
                delay,
            )),
            JobOutcome::Done { changed, hash } => {
                if changed {
                    info!(
                        claim = %claim.metadata.key(),
                        action = DB_CREATE_HASH,
                        hash = %hash,
                        "Job hash recorded"
                    );
                    claim.status.record_hash(DB_CREATE_HASH, hash);
                }
                claim.status.completed = true;
                Ok(ReconcileResult::done(ReconcilePhase::Completed))
            }
        }
    }

    /// Deletion always proceeds, whatever the readiness of the backing store.
    async fn reconcile_delete(
        &self,
        claim: &mut DatabaseClaim,
        resolution: Result<Resolution>,
    ) -> Result<ReconcileResult> {
        let resolution = match resolution {
            Ok(resolution) => resolution,
            // No name, so nothing was ever attached.
            Err(Error::InvalidClaim { .. }) => Resolution::NotFound,
            Err(e) => return Err(e),
        };

        info!(claim = %claim.metadata.key(), "Claim marked for deletion, releasing finalizers");
        self.finalizers.finalize(claim, resolution).await?;
        Ok(ReconcileResult::done(ReconcilePhase::Deleted))
    }

    /// Persist status. A claim that vanished through its own deletion has
    /// nothing left to patch.
    async fn patch_status(&self, claim: &DatabaseClaim) -> Result<()> {
        match self.store.patch_claim_status(claim).await {
            Err(e) if e.is_not_found() && claim.metadata.is_deleting() => {
                debug!(claim = %claim.metadata.key(), "Claim removed, skipping status patch");
                Ok(())
            }
            other => other,
        }
    }

    /// Get the object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Builder for Reconciler.
#[derive(Default)]
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ObjectStore>>,
    runner: Option<Arc<dyn JobRunner>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the object store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the job runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the finalizer token.
    #[must_use]
    pub fn finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.config.finalizer = finalizer.into();
        self
    }

    /// Keep finished jobs.
    #[must_use]
    pub const fn preserve_jobs(mut self, preserve: bool) -> Self {
        self.config.preserve_jobs = preserve;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the store or runner is missing or
    /// the configuration does not validate.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("Object store is required"))?;
        let runner = self
            .runner
            .ok_or_else(|| Error::invalid_config("Job runner is required"))?;
        self.config.validate()?;

        Ok(Reconciler::new(store, runner, self.config))
    }
}
