//! K8s-style reconciliation loop for database claims.
//!
//! A [`DatabaseClaim`](dbclaim_core::DatabaseClaim) asks for a database inside
//! a backing store. Each [`Reconciler::reconcile`] call drives the real world
//! one step toward that request and tells the caller whether to come back:
//!
//! 1. Fetch the claim (gone: nothing to do)
//! 2. Resolve its backing store, clustered first, then standalone
//! 3. Marked for deletion: release the backing store, then the claim
//! 4. Otherwise attach finalizers on both sides, persisting each
//! 5. Wait for the backing store to be ready
//! 6. Run the hash-gated database creation job
//! 7. Patch the claim status, always, exactly once
//!
//! Waiting is never blocking: a missing or unready backing store, or a job
//! still in flight, yields a [`ReconcileResult`] with `requeue_after` set.
//!
//! # Example
//!
//! ```ignore
//! use dbclaim_reconciler::{
//!     InMemoryJobRunner, InMemoryObjectStore, Reconciler, ReconcilerConfig,
//! };
//! use dbclaim_core::ObjectKey;
//!
//! #[tokio::main]
//! async fn main() -> dbclaim_reconciler::Result<()> {
//!     let store = InMemoryObjectStore::new_arc();
//!     let runner = InMemoryJobRunner::new_arc();
//!     let reconciler = Reconciler::new(store, runner, ReconcilerConfig::default());
//!
//!     let result = reconciler.reconcile(&ObjectKey::new("openstack", "keystone")).await?;
//!     if let Some(delay) = result.requeue_after {
//!         // schedule another reconcile after `delay`
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod error;
pub mod finalizer;
pub mod hash;
pub mod job;
pub mod payload;
pub mod reconciler;
pub mod resolver;
pub mod runner;
pub mod store;
pub mod types;

// Re-export main types
pub use config::{DEFAULT_FINALIZER, ReconcilerConfig};
pub use error::{Error, Result};
pub use finalizer::{Attachment, FinalizerCoordinator};
pub use job::{JobExecutor, JobOutcome};
pub use payload::DbCreatePayload;
pub use reconciler::{Reconciler, ReconcilerBuilder};
pub use resolver::{Resolution, resolve};
pub use runner::{InMemoryJobRunner, JobCompletion, JobDefinition, JobRecord, JobRunner, JobState};
pub use store::{InMemoryObjectStore, ObjectStore, StoreOperation, TracingObjectStore};
pub use types::{ReconcilePhase, ReconcileResult};
