//! Input for the database creation job.

use dbclaim_core::{BackingStoreConnection, DatabaseClaim, ObjectKey};
use serde::{Deserialize, Serialize};

/// Suffix of the job name, appended to the database name.
pub const DB_SYNC_JOB_SUFFIX: &str = "database-sync";

/// Everything the database creation job is defined by. Hashing this value
/// decides whether the job has to run again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCreatePayload {
    /// Claim the job works for.
    pub claim: ObjectKey,
    pub database_name: String,
    /// Service name of the backing store.
    pub database_host: String,
    /// Admin credentials of the backing store.
    pub root_secret: String,
    /// Credentials for the database user, if the claim sets any.
    pub database_secret: Option<String>,
    pub container_image: String,
    pub character_set: String,
    pub collation: String,
}

impl DbCreatePayload {
    /// Build the payload from a claim and its resolved backing store.
    pub fn new(claim: &DatabaseClaim, connection: &BackingStoreConnection) -> Self {
        Self {
            claim: claim.metadata.key(),
            database_name: claim.spec.name.clone(),
            database_host: connection.name.clone(),
            root_secret: connection.secret.clone(),
            database_secret: claim.spec.secret.clone(),
            container_image: connection.container_image.clone(),
            character_set: claim.spec.default_character_set.clone(),
            collation: claim.spec.default_collation.clone(),
        }
    }

    /// Key of the job running this payload: `<database name>-database-sync`
    /// in the claim's namespace.
    ///
    /// The key is derived from the database name, not the claim name. Two
    /// claims in one namespace asking for the same database share one job;
    /// if their inputs differ, each reconcile sees the other's job as stale
    /// and replaces it.
    pub fn job_key(&self) -> ObjectKey {
        ObjectKey::new(
            self.claim.namespace.clone(),
            format!("{}-{DB_SYNC_JOB_SUFFIX}", self.database_name),
        )
    }
}
