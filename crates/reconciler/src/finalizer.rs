//! Two-sided finalizer protocol between a claim and its backing store.
//!
//! While a claim is active, the backing store carries a claim-specific token
//! (`<finalizer>-<claim>`) and the claim carries the reconciler's own token.
//! On deletion the backing store token is removed and persisted first; only
//! then is the claim's own token dropped so the claim can go away.

use std::sync::Arc;

use dbclaim_core::{BackingStore, DatabaseClaim};
use tracing::info;

use crate::error::Result;
use crate::resolver::Resolution;
use crate::store::ObjectStore;

/// What the attachment protocol changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attachment {
    pub backing_store_attached: bool,
    pub claim_attached: bool,
}

/// Adds and removes finalizer tokens and persists each change.
#[derive(Clone)]
pub struct FinalizerCoordinator {
    store: Arc<dyn ObjectStore>,
    finalizer: String,
}

impl FinalizerCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, finalizer: impl Into<String>) -> Self {
        Self {
            store,
            finalizer: finalizer.into(),
        }
    }

    /// Token identifying `claim` on its backing store.
    pub fn backing_store_token(&self, claim: &DatabaseClaim) -> String {
        format!("{}-{}", self.finalizer, claim.metadata.name)
    }

    /// Add `token` to the backing store and persist it. Returns `true` if the
    /// set changed.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn attach_backing_store(&self, backing: &mut BackingStore, token: &str) -> Result<bool> {
        if !backing.metadata_mut().add_finalizer(token) {
            return Ok(false);
        }
        *backing = self.store.update_backing_store(backing).await?;
        Ok(true)
    }

    /// Remove `token` from the backing store and persist it. Returns `true`
    /// if the set changed.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn detach_backing_store(&self, backing: &mut BackingStore, token: &str) -> Result<bool> {
        if !backing.metadata_mut().remove_finalizer(token) {
            return Ok(false);
        }
        *backing = self.store.update_backing_store(backing).await?;
        Ok(true)
    }

    /// Add the reconciler's token to the claim and persist it.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn attach_claim(&self, claim: &mut DatabaseClaim) -> Result<bool> {
        if !claim.metadata.add_finalizer(&self.finalizer) {
            return Ok(false);
        }
        self.persist_claim_metadata(claim).await?;
        Ok(true)
    }

    /// Remove the reconciler's token from the claim and persist it.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn detach_claim(&self, claim: &mut DatabaseClaim) -> Result<bool> {
        if !claim.metadata.remove_finalizer(&self.finalizer) {
            return Ok(false);
        }
        self.persist_claim_metadata(claim).await?;
        Ok(true)
    }

    /// Attachment protocol for an active claim: backing store first, then the
    /// claim itself, each persisted before the next step.
    ///
    /// # Errors
    ///
    /// Returns the first store error; nothing after it is attempted.
    pub async fn attach(
        &self,
        claim: &mut DatabaseClaim,
        backing: &mut BackingStore,
    ) -> Result<Attachment> {
        let token = self.backing_store_token(claim);
        let backing_store_attached = self.attach_backing_store(backing, &token).await?;
        if backing_store_attached {
            info!(
                claim = %claim.metadata.key(),
                kind = %backing.kind(),
                backing_store = %backing.metadata().key(),
                "Finalizer added to backing store"
            );
        }

        let claim_attached = self.attach_claim(claim).await?;
        if claim_attached {
            info!(claim = %claim.metadata.key(), "Finalizer added to claim");
        }

        Ok(Attachment {
            backing_store_attached,
            claim_attached,
        })
    }

    /// Deletion protocol: release the backing store (when it still exists),
    /// then release the claim. Returns `true` if the claim's token was
    /// removed in this call.
    ///
    /// # Errors
    ///
    /// Returns the first store error. If releasing the backing store fails,
    /// the claim keeps its token.
    pub async fn finalize(&self, claim: &mut DatabaseClaim, resolution: Resolution) -> Result<bool> {
        if let Resolution::Found(mut backing) = resolution {
            let token = self.backing_store_token(claim);
            if self.detach_backing_store(&mut backing, &token).await? {
                info!(
                    claim = %claim.metadata.key(),
                    kind = %backing.kind(),
                    backing_store = %backing.metadata().key(),
                    "Finalizer removed from backing store"
                );
            }
        }

        let released = self.detach_claim(claim).await?;
        if released {
            info!(claim = %claim.metadata.key(), "Finalizer removed from claim");
        }
        Ok(released)
    }

    /// Write claim metadata, keeping the in-flight status untouched.
    async fn persist_claim_metadata(&self, claim: &mut DatabaseClaim) -> Result<()> {
        let stored = self.store.update_claim(claim).await?;
        claim.metadata = stored.metadata;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FINALIZER;
    use crate::error::Error;
    use crate::store::{InMemoryObjectStore, StoreOperation};
    use dbclaim_core::{DatabaseClaimSpec, Galera, GaleraSpec, GaleraStatus, ObjectKey, ObjectMeta};

    fn claim() -> DatabaseClaim {
        DatabaseClaim::new(
            ObjectMeta::new("ns", "keystone"),
            "openstack",
            DatabaseClaimSpec::new("keystone"),
        )
    }

    fn galera() -> Galera {
        Galera {
            metadata: ObjectMeta::new("ns", "openstack"),
            spec: GaleraSpec {
                secret: "osp-secret".to_string(),
                container_image: "mariadb:10.6".to_string(),
                replicas: 3,
            },
            status: GaleraStatus { bootstrapped: true },
        }
    }

    async fn setup() -> Result<(FinalizerCoordinator, Arc<InMemoryObjectStore>, DatabaseClaim, BackingStore)> {
        let store = InMemoryObjectStore::new_arc();
        store.insert_claim(claim()).await;
        store.insert_galera(galera()).await;

        let claim = store
            .claim(&ObjectKey::new("ns", "keystone"))
            .await
            .ok_or_else(|| Error::store("get", "claim missing"))?;
        let backing = store
            .galera(&ObjectKey::new("ns", "openstack"))
            .await
            .map(BackingStore::Clustered)
            .ok_or_else(|| Error::store("get", "galera missing"))?;

        let coordinator = FinalizerCoordinator::new(store.clone(), DEFAULT_FINALIZER);
        Ok((coordinator, store, claim, backing))
    }

    #[tokio::test]
    async fn test_attach_persists_both_tokens() -> Result<()> {
        let (coordinator, store, mut claim, mut backing) = setup().await?;

        let attachment = coordinator.attach(&mut claim, &mut backing).await?;

        assert!(attachment.backing_store_attached);
        assert!(attachment.claim_attached);

        let stored_claim = store.claim(&ObjectKey::new("ns", "keystone")).await;
        let stored_galera = store.galera(&ObjectKey::new("ns", "openstack")).await;
        assert!(stored_claim.is_some_and(|c| c.metadata.has_finalizer(DEFAULT_FINALIZER)));
        assert!(stored_galera.is_some_and(|g| {
            g.metadata
                .has_finalizer("dbclaim.io/databaseclaim-keystone")
        }));
        Ok(())
    }

    #[tokio::test]
    async fn test_attach_twice_is_noop() -> Result<()> {
        let (coordinator, _store, mut claim, mut backing) = setup().await?;

        coordinator.attach(&mut claim, &mut backing).await?;
        let second = coordinator.attach(&mut claim, &mut backing).await?;

        assert_eq!(second, Attachment::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_not_attached_when_backing_store_write_fails() -> Result<()> {
        let (coordinator, store, mut claim, mut backing) = setup().await?;
        store.fail_operation(StoreOperation::UpdateBackingStore).await;

        let result = coordinator.attach(&mut claim, &mut backing).await;

        assert!(result.is_err());
        let stored_claim = store.claim(&ObjectKey::new("ns", "keystone")).await;
        assert!(stored_claim.is_some_and(|c| c.metadata.finalizers.is_empty()));
        Ok(())
    }

    #[tokio::test]
    async fn test_finalize_releases_backing_store_before_claim() -> Result<()> {
        let (coordinator, store, mut claim, mut backing) = setup().await?;
        coordinator.attach(&mut claim, &mut backing).await?;
        store.request_claim_deletion(&ObjectKey::new("ns", "keystone")).await?;
        store.fail_operation(StoreOperation::UpdateBackingStore).await;

        let mut deleting = store
            .claim(&ObjectKey::new("ns", "keystone"))
            .await
            .ok_or_else(|| Error::store("get", "claim missing"))?;
        let result = coordinator
            .finalize(&mut deleting, Resolution::Found(backing.clone()))
            .await;

        assert!(result.is_err());
        assert!(store.claim(&ObjectKey::new("ns", "keystone")).await.is_some());

        store.clear_failures().await;
        let fresh = store
            .galera(&ObjectKey::new("ns", "openstack"))
            .await
            .map(BackingStore::Clustered)
            .ok_or_else(|| Error::store("get", "galera missing"))?;
        let released = coordinator
            .finalize(&mut deleting, Resolution::Found(fresh))
            .await?;

        assert!(released);
        assert!(store.claim(&ObjectKey::new("ns", "keystone")).await.is_none());
        let stored_galera = store.galera(&ObjectKey::new("ns", "openstack")).await;
        assert!(stored_galera.is_some_and(|g| g.metadata.finalizers.is_empty()));
        Ok(())
    }

    #[tokio::test]
    async fn test_finalize_without_backing_store() -> Result<()> {
        let (coordinator, store, mut claim, mut backing) = setup().await?;
        coordinator.attach(&mut claim, &mut backing).await?;
        store.request_claim_deletion(&ObjectKey::new("ns", "keystone")).await?;

        let mut deleting = store
            .claim(&ObjectKey::new("ns", "keystone"))
            .await
            .ok_or_else(|| Error::store("get", "claim missing"))?;
        let released = coordinator.finalize(&mut deleting, Resolution::NotFound).await?;

        assert!(released);
        assert!(store.claim(&ObjectKey::new("ns", "keystone")).await.is_none());
        Ok(())
    }
}
