//! Multi-document YAML manifests.

use std::path::Path;

use anyhow::{Context, Result};
use dbclaim_core::{BackingStore, ObjectKey, Resource};
use dbclaim_reconciler::InMemoryObjectStore;
use serde::Deserialize;

/// Parse every document in `raw` as a [`Resource`] and validate it.
///
/// Empty documents (a trailing `---`) are skipped.
///
/// # Errors
///
/// Returns an error naming the document index for malformed or invalid
/// resources.
pub fn parse(raw: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(raw).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("Document {index} is not valid YAML"))?;
        if value.is_null() {
            continue;
        }

        let resource: Resource = serde_yaml::from_value(value)
            .with_context(|| format!("Document {index} is not a known resource"))?;
        resource
            .validate()
            .with_context(|| format!("Document {index} failed validation"))?;
        resources.push(resource);
    }

    Ok(resources)
}

/// Read and parse a manifest file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any document is invalid.
pub fn load(path: &Path) -> Result<Vec<Resource>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifests from {}", path.display()))?;
    parse(&raw).with_context(|| format!("Invalid manifests in {}", path.display()))
}

/// Insert `resources` into `store`, returning the keys of the claims in
/// manifest order.
pub async fn seed(store: &InMemoryObjectStore, resources: Vec<Resource>) -> Vec<ObjectKey> {
    let mut claims = Vec::new();

    for resource in resources {
        match resource {
            Resource::DatabaseClaim(claim) => {
                claims.push(claim.metadata.key());
                store.insert_claim(claim).await;
            }
            Resource::Galera(galera) => store.insert_galera(galera).await,
            Resource::MariaDb(mariadb) => store.insert_mariadb(mariadb).await,
        }
    }

    claims
}

/// Everything currently in `store`, backing stores first.
pub async fn snapshot(store: &InMemoryObjectStore) -> Vec<Resource> {
    let backing = store
        .backing_stores()
        .await
        .into_iter()
        .map(|backing| match backing {
            BackingStore::Clustered(galera) => Resource::Galera(galera),
            BackingStore::Standalone(mariadb) => Resource::MariaDb(mariadb),
        });
    let claims = store.claims().await.into_iter().map(Resource::DatabaseClaim);

    backing.chain(claims).collect()
}

/// Render resources as a multi-document YAML stream.
///
/// # Errors
///
/// Returns an error if a resource cannot be serialized.
pub fn render(resources: &[Resource]) -> Result<String> {
    let documents = resources
        .iter()
        .map(|resource| serde_yaml::to_string(resource).context("Failed to render resource"))
        .collect::<Result<Vec<_>>>()?;

    Ok(documents.join("---\n"))
}

/// Render resources as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns an error if a resource cannot be serialized.
pub fn render_json(resources: &[Resource]) -> Result<String> {
    serde_json::to_string_pretty(resources).context("Failed to render resources as JSON")
}
