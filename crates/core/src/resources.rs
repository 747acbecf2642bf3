//! Database claims and the backing stores that host them.
//!
//! A [`DatabaseClaim`] names its backing store through the [`DB_NAME_LABEL`]
//! label. The store is one of two kinds, modeled as the [`BackingStore`] sum
//! type so that every readiness check and field read matches exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::meta::ObjectMeta;

/// Label on a claim holding the name of its backing store.
pub const DB_NAME_LABEL: &str = "dbName";

/// Status hash key for the database creation job.
pub const DB_CREATE_HASH: &str = "DbCreate";

fn default_character_set() -> String {
    "utf8".to_string()
}

fn default_collation() -> String {
    "utf8_general_ci".to_string()
}

/// Desired state of a database inside a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseClaimSpec {
    /// Name of the database to create.
    pub name: String,
    /// Secret holding the database user's credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default = "default_character_set")]
    pub default_character_set: String,
    #[serde(default = "default_collation")]
    pub default_collation: String,
}

impl DatabaseClaimSpec {
    /// Create a spec for the named database with default charset/collation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: None,
            default_character_set: default_character_set(),
            default_collation: default_collation(),
        }
    }
}

/// Observed state of a claim, written only by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseClaimStatus {
    /// Last applied input hash per provisioning action.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hash: BTreeMap<String, String>,
    #[serde(default)]
    pub completed: bool,
}

impl DatabaseClaimStatus {
    /// Last recorded hash for an action.
    pub fn hash_for(&self, action: &str) -> Option<&str> {
        self.hash.get(action).map(String::as_str)
    }

    /// Record the hash an action was last applied with.
    pub fn record_hash(&mut self, action: impl Into<String>, hash: impl Into<String>) {
        self.hash.insert(action.into(), hash.into());
    }
}

/// The claim: a request for a database inside a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseClaim {
    pub metadata: ObjectMeta,
    pub spec: DatabaseClaimSpec,
    #[serde(default)]
    pub status: DatabaseClaimStatus,
}

impl DatabaseClaim {
    /// Create a claim for `spec` backed by the store named `backing_store`.
    pub fn new(mut metadata: ObjectMeta, backing_store: &str, spec: DatabaseClaimSpec) -> Self {
        metadata
            .labels
            .insert(DB_NAME_LABEL.to_string(), backing_store.to_string());
        Self {
            metadata,
            spec,
            status: DatabaseClaimStatus::default(),
        }
    }

    /// Name of the backing store this claim references, if set.
    pub fn backing_store_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .get(DB_NAME_LABEL)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}

/// Clustered store spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaleraSpec {
    pub secret: String,
    pub container_image: String,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
}

const fn default_replicas() -> u32 {
    3
}

/// Clustered store status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaleraStatus {
    #[serde(default)]
    pub bootstrapped: bool,
}

/// Clustered backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Galera {
    pub metadata: ObjectMeta,
    pub spec: GaleraSpec,
    #[serde(default)]
    pub status: GaleraStatus,
}

/// Standalone store spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MariaDbSpec {
    pub secret: String,
    pub container_image: String,
}

/// Standalone store status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MariaDbStatus {
    /// Non-empty once the server has been initialized.
    #[serde(default)]
    pub db_init_hash: String,
}

/// Standalone backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MariaDb {
    pub metadata: ObjectMeta,
    pub spec: MariaDbSpec,
    #[serde(default)]
    pub status: MariaDbStatus,
}

/// Which variant a backing store is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackingStoreKind {
    Clustered,
    Standalone,
}

impl fmt::Display for BackingStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clustered => write!(f, "Galera"),
            Self::Standalone => write!(f, "MariaDB"),
        }
    }
}

/// Connection details the provisioning job needs from a backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingStoreConnection {
    pub name: String,
    pub secret: String,
    pub container_image: String,
}

/// A resolved backing store: exactly one of the two variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackingStore {
    Clustered(Galera),
    Standalone(MariaDb),
}

impl BackingStore {
    /// The variant tag.
    pub const fn kind(&self) -> BackingStoreKind {
        match self {
            Self::Clustered(_) => BackingStoreKind::Clustered,
            Self::Standalone(_) => BackingStoreKind::Standalone,
        }
    }

    pub const fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Clustered(galera) => &galera.metadata,
            Self::Standalone(mariadb) => &mariadb.metadata,
        }
    }

    pub const fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Clustered(galera) => &mut galera.metadata,
            Self::Standalone(mariadb) => &mut mariadb.metadata,
        }
    }

    /// Clustered stores are ready once bootstrapped, standalone ones once
    /// their initialization hash is set.
    pub fn is_ready(&self) -> bool {
        match self {
            Self::Clustered(galera) => galera.status.bootstrapped,
            Self::Standalone(mariadb) => !mariadb.status.db_init_hash.is_empty(),
        }
    }

    pub fn connection(&self) -> BackingStoreConnection {
        match self {
            Self::Clustered(galera) => BackingStoreConnection {
                name: galera.metadata.name.clone(),
                secret: galera.spec.secret.clone(),
                container_image: galera.spec.container_image.clone(),
            },
            Self::Standalone(mariadb) => BackingStoreConnection {
                name: mariadb.metadata.name.clone(),
                secret: mariadb.spec.secret.clone(),
                container_image: mariadb.spec.container_image.clone(),
            },
        }
    }
}

/// Any resource that can appear in a manifest, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    DatabaseClaim(DatabaseClaim),
    Galera(Galera),
    #[serde(rename = "MariaDB")]
    MariaDb(MariaDb),
}

impl Resource {
    pub const fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::DatabaseClaim(claim) => &claim.metadata,
            Self::Galera(galera) => &galera.metadata,
            Self::MariaDb(mariadb) => &mariadb.metadata,
        }
    }

    /// Check the invariants a manifest must satisfy before it is stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] for empty names or images.
    pub fn validate(&self) -> Result<()> {
        let meta = self.metadata();
        if meta.name.is_empty() {
            return Err(Error::invalid_manifest("metadata.name is empty"));
        }
        if meta.namespace.is_empty() {
            return Err(Error::invalid_manifest(format!(
                "{}: metadata.namespace is empty",
                meta.name
            )));
        }

        match self {
            Self::DatabaseClaim(claim) if claim.spec.name.is_empty() => Err(
                Error::invalid_manifest(format!("{}: spec.name is empty", meta.key())),
            ),
            Self::Galera(galera) if galera.spec.container_image.is_empty() => Err(
                Error::invalid_manifest(format!("{}: spec.containerImage is empty", meta.key())),
            ),
            Self::MariaDb(mariadb) if mariadb.spec.container_image.is_empty() => Err(
                Error::invalid_manifest(format!("{}: spec.containerImage is empty", meta.key())),
            ),
            _ => Ok(()),
        }
    }
}
