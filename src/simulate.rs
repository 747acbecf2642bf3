//! Local requeue-aware driver for the reconciler.
//!
//! Stands in for a controller work queue: each round reconciles every pending
//! claim once, keeps the ones that asked to come back, and optionally sleeps
//! for the shortest requested delay before the next round.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dbclaim_core::ObjectKey;
use dbclaim_reconciler::{
    Error, InMemoryJobRunner, InMemoryObjectStore, JobCompletion, JobState, ReconcilePhase,
    ReconcileResult, Reconciler, ReconcilerBuilder, ReconcilerConfig, TracingObjectStore,
};
use tracing::{debug, info, warn};

/// How a claim ended up when the driver stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Reconcile returned without a requeue.
    Settled(ReconcilePhase),
    /// Still asking to be requeued when the round limit was hit.
    Pending(ReconcilePhase),
    /// Reconcile returned an error the driver does not retry.
    Failed(String),
}

impl ClaimOutcome {
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }
}

/// Driver options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulateOptions {
    pub max_rounds: usize,
    /// Sleep for requested requeue delays between rounds.
    pub wait: bool,
    /// Jobs succeed the first time they are polled; otherwise they fail.
    pub jobs_succeed: bool,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            wait: false,
            jobs_succeed: true,
        }
    }
}

/// Final state of a simulation run.
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    pub rounds: usize,
    pub outcomes: BTreeMap<ObjectKey, ClaimOutcome>,
}

/// What the queue does with a claim after one reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// Reconcile again, after the delay if one was requested.
    Requeue(Option<Duration>),
    Drop,
}

impl SimulationReport {
    pub fn all_settled(&self) -> bool {
        self.outcomes.values().all(ClaimOutcome::is_settled)
    }

    /// Record the outcome of one reconcile of `key`.
    fn record(
        &mut self,
        key: &ObjectKey,
        outcome: dbclaim_reconciler::Result<ReconcileResult>,
    ) -> Next {
        match outcome {
            Ok(result) if result.is_requeue() => {
                self.outcomes
                    .insert(key.clone(), ClaimOutcome::Pending(result.phase));
                Next::Requeue(result.requeue_after)
            }
            // The claim update is a watch event in a real controller.
            Ok(result) if result.phase == ReconcilePhase::FinalizerAttached => {
                self.outcomes
                    .insert(key.clone(), ClaimOutcome::Pending(result.phase));
                Next::Requeue(None)
            }
            Ok(result) => {
                self.outcomes
                    .insert(key.clone(), ClaimOutcome::Settled(result.phase));
                Next::Drop
            }
            Err(Error::Conflict { .. }) => {
                debug!(claim = %key, "Write conflict, retrying next round");
                // Keep the last phase seen; a first-round conflict has none.
                let phase = match self.outcomes.get(key) {
                    Some(ClaimOutcome::Pending(phase)) => *phase,
                    _ => ReconcilePhase::WaitingForDependency,
                };
                self.outcomes
                    .insert(key.clone(), ClaimOutcome::Pending(phase));
                Next::Requeue(None)
            }
            Err(err) => {
                warn!(claim = %key, error = %err, "Reconcile failed");
                self.outcomes
                    .insert(key.clone(), ClaimOutcome::Failed(err.to_string()));
                Next::Drop
            }
        }
    }
}

/// In-memory collaborators plus the reconciler wired to them.
pub struct Simulation {
    pub store: Arc<InMemoryObjectStore>,
    pub runner: Arc<InMemoryJobRunner>,
    pub reconciler: Reconciler,
    options: SimulateOptions,
}

impl Simulation {
    /// Wire a reconciler to fresh in-memory collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: ReconcilerConfig, options: SimulateOptions) -> dbclaim_reconciler::Result<Self> {
        let completion = if options.jobs_succeed {
            JobState::Succeeded
        } else {
            JobState::Failed {
                reason: "simulated job failure".to_string(),
            }
        };

        let store = InMemoryObjectStore::new_arc();
        let runner = Arc::new(InMemoryJobRunner::with_completion(
            JobCompletion::OnFirstPoll(completion),
        ));
        let reconciler = ReconcilerBuilder::new()
            .with_store(Arc::new(TracingObjectStore::new(store.clone())))
            .with_runner(runner.clone())
            .with_config(config)
            .build()?;

        Ok(Self {
            store,
            runner,
            reconciler,
            options,
        })
    }

    /// Reconcile `keys` until every claim settles, fails, or the round limit
    /// is reached.
    pub async fn run(&self, keys: &[ObjectKey]) -> SimulationReport {
        let mut report = SimulationReport::default();
        let mut pending: Vec<ObjectKey> = keys.to_vec();

        while !pending.is_empty() && report.rounds < self.options.max_rounds {
            report.rounds = report.rounds.saturating_add(1);
            let mut next = Vec::new();
            let mut delay: Option<Duration> = None;

            for key in pending {
                let outcome = self.reconciler.reconcile(&key).await;
                if let Ok(result) = &outcome {
                    debug!(claim = %key, round = report.rounds, phase = %result.phase, "Reconciled");
                }

                if let Next::Requeue(after) = report.record(&key, outcome) {
                    if let Some(after) = after {
                        delay = Some(delay.map_or(after, |current| current.min(after)));
                    }
                    next.push(key);
                }
            }

            pending = next;
            if let Some(delay) = delay.filter(|_| self.options.wait && !pending.is_empty()) {
                info!(?delay, pending = pending.len(), "Waiting before next round");
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            rounds = report.rounds,
            settled = report.outcomes.values().filter(|o| o.is_settled()).count(),
            total = report.outcomes.len(),
            "Simulation finished"
        );
        report
    }

    /// Mark `key` for deletion and drive it until it is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim does not exist.
    pub async fn delete(&self, key: &ObjectKey) -> dbclaim_reconciler::Result<SimulationReport> {
        self.store.request_claim_deletion(key).await?;
        info!(claim = %key, "Deletion requested");
        Ok(self.run(std::slice::from_ref(key)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbclaim_core::{
        DatabaseClaim, DatabaseClaimSpec, Galera, GaleraSpec, GaleraStatus, MariaDb, MariaDbSpec,
        MariaDbStatus, ObjectMeta,
    };

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn claim(name: &str, backing: &str) -> DatabaseClaim {
        DatabaseClaim::new(
            ObjectMeta::new("openstack", name),
            backing,
            DatabaseClaimSpec::new(name),
        )
    }

    fn ready_mariadb(name: &str) -> MariaDb {
        MariaDb {
            metadata: ObjectMeta::new("openstack", name),
            spec: MariaDbSpec {
                secret: "osp-secret".to_string(),
                container_image: "mariadb:10.5".to_string(),
            },
            status: MariaDbStatus {
                db_init_hash: "init".to_string(),
            },
        }
    }

    fn unready_galera(name: &str) -> Galera {
        Galera {
            metadata: ObjectMeta::new("openstack", name),
            spec: GaleraSpec {
                secret: "osp-secret".to_string(),
                container_image: "mariadb-galera:10.5".to_string(),
                replicas: 3,
            },
            status: GaleraStatus {
                bootstrapped: false,
            },
        }
    }

    #[tokio::test]
    async fn test_ready_backing_store_settles_completed() -> TestResult {
        let sim = Simulation::new(ReconcilerConfig::default(), SimulateOptions::default())?;
        sim.store.insert_mariadb(ready_mariadb("openstack")).await;
        sim.store.insert_claim(claim("keystone", "openstack")).await;

        let key = ObjectKey::new("openstack", "keystone");
        let report = sim.run(std::slice::from_ref(&key)).await;

        assert!(report.all_settled());
        assert_eq!(
            report.outcomes.get(&key),
            Some(&ClaimOutcome::Settled(ReconcilePhase::Completed))
        );
        let stored = sim.store.claim(&key).await.ok_or("claim missing")?;
        assert!(stored.status.completed);
        assert_eq!(sim.runner.dispatch_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unready_backing_store_stays_pending() -> TestResult {
        let options = SimulateOptions {
            max_rounds: 3,
            ..SimulateOptions::default()
        };
        let sim = Simulation::new(ReconcilerConfig::default(), options)?;
        sim.store.insert_galera(unready_galera("openstack")).await;
        sim.store.insert_claim(claim("keystone", "openstack")).await;

        let key = ObjectKey::new("openstack", "keystone");
        let report = sim.run(std::slice::from_ref(&key)).await;

        assert_eq!(report.rounds, 3);
        assert_eq!(
            report.outcomes.get(&key),
            Some(&ClaimOutcome::Pending(ReconcilePhase::WaitingForDependencyReady))
        );
        assert_eq!(sim.runner.dispatch_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_jobs_are_reported() -> TestResult {
        let options = SimulateOptions {
            jobs_succeed: false,
            ..SimulateOptions::default()
        };
        let sim = Simulation::new(ReconcilerConfig::default(), options)?;
        sim.store.insert_mariadb(ready_mariadb("openstack")).await;
        sim.store.insert_claim(claim("keystone", "openstack")).await;

        let key = ObjectKey::new("openstack", "keystone");
        let report = sim.run(std::slice::from_ref(&key)).await;

        assert!(matches!(report.outcomes.get(&key), Some(ClaimOutcome::Failed(_))));
        let stored = sim.store.claim(&key).await.ok_or("claim missing")?;
        assert!(!stored.status.completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes_claim_and_releases_backing_store() -> TestResult {
        let sim = Simulation::new(ReconcilerConfig::default(), SimulateOptions::default())?;
        sim.store.insert_mariadb(ready_mariadb("openstack")).await;
        sim.store.insert_claim(claim("keystone", "openstack")).await;

        let key = ObjectKey::new("openstack", "keystone");
        sim.run(std::slice::from_ref(&key)).await;
        let report = sim.delete(&key).await?;

        assert_eq!(
            report.outcomes.get(&key),
            Some(&ClaimOutcome::Settled(ReconcilePhase::Deleted))
        );
        assert!(sim.store.claim(&key).await.is_none());
        let backing = sim
            .store
            .mariadb(&ObjectKey::new("openstack", "openstack"))
            .await
            .ok_or("backing store missing")?;
        assert!(backing.metadata.finalizers.is_empty());
        Ok(())
    }

    #[test]
    fn test_conflict_only_claim_is_not_settled() {
        let key = ObjectKey::new("openstack", "keystone");
        let conflict = Error::Conflict {
            kind: "DatabaseClaim".to_string(),
            key: key.clone(),
            expected: 1,
            found: 2,
        };

        let mut report = SimulationReport::default();
        assert_eq!(report.record(&key, Err(conflict)), Next::Requeue(None));

        assert!(matches!(
            report.outcomes.get(&key),
            Some(ClaimOutcome::Pending(_))
        ));
        assert!(!report.all_settled());
    }

    #[test]
    fn test_conflict_keeps_last_pending_phase() {
        let key = ObjectKey::new("openstack", "keystone");
        let mut report = SimulationReport::default();
        report.record(
            &key,
            Ok(ReconcileResult::done(ReconcilePhase::FinalizerAttached)),
        );
        report.record(
            &key,
            Err(Error::Conflict {
                kind: "Galera".to_string(),
                key: ObjectKey::new("openstack", "openstack"),
                expected: 3,
                found: 4,
            }),
        );

        assert_eq!(
            report.outcomes.get(&key),
            Some(&ClaimOutcome::Pending(ReconcilePhase::FinalizerAttached))
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_claim_is_an_error() -> TestResult {
        let sim = Simulation::new(ReconcilerConfig::default(), SimulateOptions::default())?;
        let result = sim.delete(&ObjectKey::new("openstack", "missing")).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }
}
