//! Request fingerprints.
//!
//! A fingerprint identifies the desired state independently of key order and
//! null placeholders, so two request files that mean the same thing hash the
//! same. The CLI prints it next to plans to make runs easy to correlate.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::normalize::strip_nulls;

use super::spec::Request;

/// Hasher for computing request fingerprints.
#[derive(Debug, Default)]
pub struct RequestHasher;

impl RequestHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a request.
    ///
    /// Kind, identity, intent and desired state contribute; the dry-run flag
    /// and defaults do not.
    #[must_use]
    pub fn hash_request(&self, request: &Request) -> String {
        let mut hasher = Sha256::new();

        hasher.update(request.kind.as_bytes());
        for segment in request.identity.segments() {
            hasher.update([0u8]);
            hasher.update(segment.as_bytes());
        }
        hasher.update(request.intent.to_string().as_bytes());
        hasher.update(if request.force_update { [1u8] } else { [0u8] });
        hasher.update(self.canonical_json(&Value::Object(request.desired.clone())).as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Renders `value` with sorted keys and nulls removed.
    #[must_use]
    pub fn canonical_json(&self, value: &Value) -> String {
        sort_keys(&strip_nulls(value)).to_string()
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
