//! SHA-256 hashing of provisioning job inputs.
//!
//! A job's input is hashed over its canonical bincode encoding. The hash is
//! what the claim status records, so it must be deterministic across
//! processes for identical inputs.

use bincode::config;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Hash raw bytes with SHA-256.
#[inline]
pub fn hash_input(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash a serializable value and render it as lowercase hex.
///
/// # Errors
///
/// Returns [`Error::Hash`] if bincode serialization fails.
pub fn hash_payload<T: Serialize>(value: &T) -> Result<String> {
    let bytes = bincode::serde::encode_to_vec(value, config::standard())
        .map_err(|e| Error::hash(e.to_string()))?;
    Ok(hex::encode(hash_input(&bytes)))
}
