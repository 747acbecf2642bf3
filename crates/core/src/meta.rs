//! Object identity and metadata shared by every resource kind.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Namespace used when a key or manifest omits one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespaced identity of an object in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a new object key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `namespace/name`, or a bare `name` in the default namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] when a segment is empty or the input has
    /// more than one separator.
    pub fn parse(input: &str) -> Result<Self> {
        let (namespace, name) = input.split_once('/').unwrap_or((DEFAULT_NAMESPACE, input));

        if name.contains('/') {
            return Err(Error::invalid_key(input, "expected at most one '/'"));
        }
        if namespace.is_empty() {
            return Err(Error::invalid_key(input, "namespace is empty"));
        }
        if name.is_empty() {
            return Err(Error::invalid_key(input, "name is empty"));
        }

        Ok(Self::new(namespace, name))
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Metadata carried by every stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Ordered set of finalizer tokens.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Deletion marker; present once deletion has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Bumped by the store on every metadata/spec write.
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    /// Create metadata for a new object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
            finalizers: Vec::new(),
            deletion_timestamp: None,
            resource_version: 0,
        }
    }

    /// The key identifying this object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Whether deletion has been requested.
    pub const fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Whether the token is present in the finalizer set.
    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers.iter().any(|f| f == token)
    }

    /// Add a finalizer token. Returns `true` if the set changed.
    pub fn add_finalizer(&mut self, token: &str) -> bool {
        if self.has_finalizer(token) {
            return false;
        }
        self.finalizers.push(token.to_string());
        true
    }

    /// Remove a finalizer token. Returns `true` if the set changed.
    pub fn remove_finalizer(&mut self, token: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != token);
        self.finalizers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_namespaced_key() {
        let key = ObjectKey::parse("openstack/keystone");
        assert_eq!(key, Ok(ObjectKey::new("openstack", "keystone")));
    }

    #[test]
    fn test_parse_bare_name_uses_default_namespace() {
        let key = ObjectKey::parse("keystone");
        assert_eq!(key, Ok(ObjectKey::new(DEFAULT_NAMESPACE, "keystone")));
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(ObjectKey::parse("/keystone").is_err());
        assert!(ObjectKey::parse("openstack/").is_err());
        assert!(ObjectKey::parse("").is_err());
        assert!(ObjectKey::parse("a/b/c").is_err());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ObjectKey::new("ns", "db").to_string(), "ns/db");
    }

    #[test]
    fn test_add_finalizer_is_idempotent() {
        let mut meta = ObjectMeta::new("ns", "db");
        assert!(meta.add_finalizer("a"));
        assert!(!meta.add_finalizer("a"));
        assert_eq!(meta.finalizers, vec!["a".to_string()]);
    }

    #[test]
    fn test_remove_absent_finalizer_is_noop() {
        let mut meta = ObjectMeta::new("ns", "db");
        meta.add_finalizer("a");
        assert!(!meta.remove_finalizer("b"));
        assert!(meta.remove_finalizer("a"));
        assert!(meta.finalizers.is_empty());
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut meta = ObjectMeta::new("ns", "db");
        meta.add_finalizer("z");
        meta.add_finalizer("a");
        assert_eq!(meta.finalizers, vec!["z".to_string(), "a".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_finalizer_ops_keep_set_semantics(
            ops in proptest::collection::vec((any::<bool>(), "[a-c]"), 0..32)
        ) {
            let mut meta = ObjectMeta::new("ns", "db");
            let mut model = std::collections::BTreeSet::new();

            for (add, token) in ops {
                let changed = if add {
                    meta.add_finalizer(&token)
                } else {
                    meta.remove_finalizer(&token)
                };
                let model_changed = if add {
                    model.insert(token.clone())
                } else {
                    model.remove(&token)
                };
                prop_assert_eq!(changed, model_changed);
            }

            let mut actual = meta.finalizers.clone();
            actual.sort();
            let expected: Vec<String> = model.into_iter().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
