//! Backing store discovery.

use dbclaim_core::{BackingStore, DatabaseClaim, ObjectKey};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::ObjectStore;

/// Outcome of resolving a claim's backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(BackingStore),
    NotFound,
}

/// Find the backing store a claim references.
///
/// The clustered variant is looked up first and wins whenever it exists,
/// ready or not; the standalone variant is only tried when no clustered store
/// has that name.
///
/// # Errors
///
/// Returns [`Error::InvalidClaim`] when the claim carries no backing store
/// name, and any store error other than "does not exist" unchanged.
pub async fn resolve(store: &dyn ObjectStore, claim: &DatabaseClaim) -> Result<Resolution> {
    let claim_key = claim.metadata.key();
    let name = claim
        .backing_store_name()
        .ok_or_else(|| Error::invalid_claim(claim_key.clone(), "backing store name is empty"))?;
    let key = ObjectKey::new(claim_key.namespace.clone(), name);

    if let Some(galera) = store.get_galera(&key).await? {
        debug!(claim = %claim_key, backing_store = %key, "Resolved Galera");
        return Ok(Resolution::Found(BackingStore::Clustered(galera)));
    }

    if let Some(mariadb) = store.get_mariadb(&key).await? {
        debug!(claim = %claim_key, backing_store = %key, "Resolved MariaDB");
        return Ok(Resolution::Found(BackingStore::Standalone(mariadb)));
    }

    debug!(claim = %claim_key, backing_store = %key, "Backing store not found");
    Ok(Resolution::NotFound)
}
