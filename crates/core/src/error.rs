//! Core error types for the resource model.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

/// Result type alias for resource model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for resource model operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid object key '{input}': {reason}")]
    InvalidKey { input: String, reason: String },

    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },
}

impl Error {
    /// Create an invalid key error.
    pub fn invalid_key(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid manifest error.
    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_display() {
        let err = Error::invalid_key("a/b/c", "too many segments");
        assert!(err.to_string().contains("a/b/c"));
        assert!(err.to_string().contains("too many segments"));
    }

    #[test]
    fn test_invalid_manifest_display() {
        let err = Error::invalid_manifest("spec.name is empty");
        assert_eq!(err.to_string(), "invalid manifest: spec.name is empty");
    }
}
