//! Object store trait and implementations.
//!
//! The reconciler reads claims and backing stores through [`ObjectStore`],
//! writes their metadata back with optimistic versioning, and patches claim
//! status. [`InMemoryObjectStore`] mirrors the semantics of an API server
//! closely enough for tests and local simulation: an object whose deletion
//! marker is set is removed as soon as its finalizer set becomes empty.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dbclaim_core::{BackingStore, DatabaseClaim, Galera, MariaDb, ObjectKey, ObjectMeta};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Trait for object store backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a claim. `None` means it does not exist.
    async fn get_claim(&self, key: &ObjectKey) -> Result<Option<DatabaseClaim>>;

    /// Fetch a clustered backing store.
    async fn get_galera(&self, key: &ObjectKey) -> Result<Option<Galera>>;

    /// Fetch a standalone backing store.
    async fn get_mariadb(&self, key: &ObjectKey) -> Result<Option<MariaDb>>;

    /// Write a claim's metadata and spec. Returns the stored copy.
    async fn update_claim(&self, claim: &DatabaseClaim) -> Result<DatabaseClaim>;

    /// Write a backing store's metadata and spec. Returns the stored copy.
    async fn update_backing_store(&self, store: &BackingStore) -> Result<BackingStore>;

    /// Replace a claim's status. No version check.
    async fn patch_claim_status(&self, claim: &DatabaseClaim) -> Result<()>;
}

/// Store operations, used to inject failures in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    GetClaim,
    GetGalera,
    GetMariaDb,
    UpdateClaim,
    UpdateBackingStore,
    PatchClaimStatus,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GetClaim => "get_claim",
            Self::GetGalera => "get_galera",
            Self::GetMariaDb => "get_mariadb",
            Self::UpdateClaim => "update_claim",
            Self::UpdateBackingStore => "update_backing_store",
            Self::PatchClaimStatus => "patch_claim_status",
        };
        f.write_str(name)
    }
}

/// An object kept in one of the in-memory tables.
trait StoredObject: Clone {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Carry the stored status over into an incoming metadata/spec write.
    fn keep_status_of(&mut self, stored: &Self);
}

impl StoredObject for DatabaseClaim {
    const KIND: &'static str = "DatabaseClaim";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn keep_status_of(&mut self, stored: &Self) {
        self.status = stored.status.clone();
    }
}

impl StoredObject for Galera {
    const KIND: &'static str = "Galera";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn keep_status_of(&mut self, stored: &Self) {
        self.status = stored.status.clone();
    }
}

impl StoredObject for MariaDb {
    const KIND: &'static str = "MariaDB";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn keep_status_of(&mut self, stored: &Self) {
        self.status = stored.status.clone();
    }
}

/// Apply an optimistic metadata/spec write to a table.
fn write_object<T: StoredObject>(table: &mut HashMap<ObjectKey, T>, incoming: &T) -> Result<T> {
    let key = incoming.meta().key();
    let stored = table
        .get(&key)
        .ok_or_else(|| Error::not_found(T::KIND, key.clone()))?;

    let expected = incoming.meta().resource_version;
    let found = stored.meta().resource_version;
    if expected != found {
        return Err(Error::Conflict {
            kind: T::KIND.to_string(),
            key,
            expected,
            found,
        });
    }

    let mut next = incoming.clone();
    next.keep_status_of(stored);
    next.meta_mut().resource_version = found.saturating_add(1);
    // Deletion marker is owned by the store; writers cannot clear it.
    if next.meta().deletion_timestamp.is_none() {
        next.meta_mut().deletion_timestamp = stored.meta().deletion_timestamp;
    }

    if next.meta().is_deleting() && next.meta().finalizers.is_empty() {
        table.remove(&key);
    } else {
        table.insert(key, next.clone());
    }
    Ok(next)
}

/// Seed or overwrite an object, bumping its version.
fn insert_object<T: StoredObject>(table: &mut HashMap<ObjectKey, T>, mut object: T) {
    let key = object.meta().key();
    let version = table
        .get(&key)
        .map_or(1, |stored| stored.meta().resource_version.saturating_add(1));
    object.meta_mut().resource_version = version;
    table.insert(key, object);
}

/// Set the deletion marker; remove at once when nothing holds the object.
fn mark_deleted<T: StoredObject>(table: &mut HashMap<ObjectKey, T>, key: &ObjectKey) -> bool {
    let Some(object) = table.get_mut(key) else {
        return false;
    };

    if object.meta().deletion_timestamp.is_none() {
        object.meta_mut().deletion_timestamp = Some(Utc::now());
        let version = object.meta().resource_version.saturating_add(1);
        object.meta_mut().resource_version = version;
    }

    if object.meta().finalizers.is_empty() {
        table.remove(key);
    }
    true
}

/// In-memory object store for tests and local simulation.
#[derive(Default)]
pub struct InMemoryObjectStore {
    claims: RwLock<HashMap<ObjectKey, DatabaseClaim>>,
    galeras: RwLock<HashMap<ObjectKey, Galera>>,
    mariadbs: RwLock<HashMap<ObjectKey, MariaDb>>,
    failing: RwLock<HashSet<StoreOperation>>,
    status_patches: AtomicUsize,
}

impl InMemoryObjectStore {
    /// Create a new in-memory object store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory object store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn insert_claim(&self, claim: DatabaseClaim) {
        insert_object(&mut *self.claims.write().await, claim);
    }

    pub async fn insert_galera(&self, galera: Galera) {
        insert_object(&mut *self.galeras.write().await, galera);
    }

    pub async fn insert_mariadb(&self, mariadb: MariaDb) {
        insert_object(&mut *self.mariadbs.write().await, mariadb);
    }

    /// Request deletion of a claim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the claim does not exist.
    pub async fn request_claim_deletion(&self, key: &ObjectKey) -> Result<()> {
        if mark_deleted(&mut *self.claims.write().await, key) {
            Ok(())
        } else {
            Err(Error::not_found(DatabaseClaim::KIND, key.clone()))
        }
    }

    /// Request deletion of whichever backing store variant exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if neither variant exists.
    pub async fn request_backing_store_deletion(&self, key: &ObjectKey) -> Result<()> {
        let galera = mark_deleted(&mut *self.galeras.write().await, key);
        let mariadb = mark_deleted(&mut *self.mariadbs.write().await, key);
        if galera || mariadb {
            Ok(())
        } else {
            Err(Error::not_found("BackingStore", key.clone()))
        }
    }

    /// Make every call of `operation` fail until [`Self::clear_failures`].
    pub async fn fail_operation(&self, operation: StoreOperation) {
        self.failing.write().await.insert(operation);
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    pub async fn claim(&self, key: &ObjectKey) -> Option<DatabaseClaim> {
        self.claims.read().await.get(key).cloned()
    }

    pub async fn galera(&self, key: &ObjectKey) -> Option<Galera> {
        self.galeras.read().await.get(key).cloned()
    }

    pub async fn mariadb(&self, key: &ObjectKey) -> Option<MariaDb> {
        self.mariadbs.read().await.get(key).cloned()
    }

    /// All claims, ordered by key.
    pub async fn claims(&self) -> Vec<DatabaseClaim> {
        let mut claims: Vec<_> = self.claims.read().await.values().cloned().collect();
        claims.sort_by(|a, b| a.metadata.key().cmp(&b.metadata.key()));
        claims
    }

    /// All backing stores of both variants, ordered by kind then key.
    pub async fn backing_stores(&self) -> Vec<BackingStore> {
        let mut galeras: Vec<_> = self.galeras.read().await.values().cloned().collect();
        galeras.sort_by(|a, b| a.metadata.key().cmp(&b.metadata.key()));
        let mut mariadbs: Vec<_> = self.mariadbs.read().await.values().cloned().collect();
        mariadbs.sort_by(|a, b| a.metadata.key().cmp(&b.metadata.key()));

        galeras
            .into_iter()
            .map(BackingStore::Clustered)
            .chain(mariadbs.into_iter().map(BackingStore::Standalone))
            .collect()
    }

    /// Number of status patches applied so far.
    pub fn status_patches(&self) -> usize {
        self.status_patches.load(Ordering::SeqCst)
    }

    async fn check(&self, operation: StoreOperation) -> Result<()> {
        if self.failing.read().await.contains(&operation) {
            return Err(Error::store(operation.to_string(), "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_claim(&self, key: &ObjectKey) -> Result<Option<DatabaseClaim>> {
        self.check(StoreOperation::GetClaim).await?;
        Ok(self.claims.read().await.get(key).cloned())
    }

    async fn get_galera(&self, key: &ObjectKey) -> Result<Option<Galera>> {
        self.check(StoreOperation::GetGalera).await?;
        Ok(self.galeras.read().await.get(key).cloned())
    }

    async fn get_mariadb(&self, key: &ObjectKey) -> Result<Option<MariaDb>> {
        self.check(StoreOperation::GetMariaDb).await?;
        Ok(self.mariadbs.read().await.get(key).cloned())
    }

    async fn update_claim(&self, claim: &DatabaseClaim) -> Result<DatabaseClaim> {
        self.check(StoreOperation::UpdateClaim).await?;
        write_object(&mut *self.claims.write().await, claim)
    }

    async fn update_backing_store(&self, store: &BackingStore) -> Result<BackingStore> {
        self.check(StoreOperation::UpdateBackingStore).await?;
        match store {
            BackingStore::Clustered(galera) => {
                write_object(&mut *self.galeras.write().await, galera).map(BackingStore::Clustered)
            }
            BackingStore::Standalone(mariadb) => {
                write_object(&mut *self.mariadbs.write().await, mariadb)
                    .map(BackingStore::Standalone)
            }
        }
    }

    async fn patch_claim_status(&self, claim: &DatabaseClaim) -> Result<()> {
        self.check(StoreOperation::PatchClaimStatus).await?;
        let key = claim.metadata.key();
        let mut claims = self.claims.write().await;
        let stored = claims
            .get_mut(&key)
            .ok_or_else(|| Error::not_found(DatabaseClaim::KIND, key.clone()))?;
        stored.status = claim.status.clone();
        self.status_patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A wrapper that adds tracing to an object store.
///
/// Holds the inner store behind an `Arc` so callers can keep seeding and
/// inspecting it while the reconciler writes through the wrapper.
pub struct TracingObjectStore<S: ObjectStore> {
    inner: Arc<S>,
}

impl<S: ObjectStore> TracingObjectStore<S> {
    /// Create a new tracing object store.
    pub const fn new(inner: Arc<S>) -> Self {
        Self { inner }
    }

    pub const fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TracingObjectStore<S> {
    async fn get_claim(&self, key: &ObjectKey) -> Result<Option<DatabaseClaim>> {
        tracing::debug!(key = %key, "Getting claim");
        self.inner.get_claim(key).await
    }

    async fn get_galera(&self, key: &ObjectKey) -> Result<Option<Galera>> {
        tracing::debug!(key = %key, "Getting Galera");
        self.inner.get_galera(key).await
    }

    async fn get_mariadb(&self, key: &ObjectKey) -> Result<Option<MariaDb>> {
        tracing::debug!(key = %key, "Getting MariaDB");
        self.inner.get_mariadb(key).await
    }

    async fn update_claim(&self, claim: &DatabaseClaim) -> Result<DatabaseClaim> {
        tracing::debug!(
            key = %claim.metadata.key(),
            finalizers = ?claim.metadata.finalizers,
            "Updating claim"
        );
        let result = self.inner.update_claim(claim).await;
        if let Ok(ref stored) = result {
            tracing::trace!(version = stored.metadata.resource_version, "Claim updated");
        }
        result
    }

    async fn update_backing_store(&self, store: &BackingStore) -> Result<BackingStore> {
        tracing::debug!(
            kind = %store.kind(),
            key = %store.metadata().key(),
            finalizers = ?store.metadata().finalizers,
            "Updating backing store"
        );
        self.inner.update_backing_store(store).await
    }

    async fn patch_claim_status(&self, claim: &DatabaseClaim) -> Result<()> {
        tracing::debug!(
            key = %claim.metadata.key(),
            completed = claim.status.completed,
            "Patching claim status"
        );
        self.inner.patch_claim_status(claim).await
    }
}
