//! Resource model for database claims.
//!
//! - [`DatabaseClaim`] - desired state: a database that should exist
//! - [`BackingStore`] - the clustered ([`Galera`]) or standalone ([`MariaDb`])
//!   server that hosts it
//! - [`ObjectMeta`] - identity, labels, finalizer set and deletion marker

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod error;
pub mod meta;
pub mod resources;

pub use error::{Error, Result};
pub use meta::{DEFAULT_NAMESPACE, ObjectKey, ObjectMeta};
pub use resources::{
    BackingStore, BackingStoreConnection, BackingStoreKind, DB_CREATE_HASH, DB_NAME_LABEL,
    DatabaseClaim, DatabaseClaimSpec, DatabaseClaimStatus, Galera, GaleraSpec, GaleraStatus,
    MariaDb, MariaDbSpec, MariaDbStatus, Resource,
};
