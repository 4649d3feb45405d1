// SPDX-License-Identifier: MIT OR Apache-2.0
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of an [`AuditEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// Fine-grained diagnostic detail.
    Trace,
    /// Developer-facing diagnostic.
    Debug,
    /// Normal operational event.
    Info,
    /// Unexpected but recoverable condition.
    Warn,
    /// Failure requiring attention.
    Error,
    /// Security-relevant event (denials, logins, key rotation).
    Security,
}

/// Fields supplied by the caller of [`crate::AuditChain::record`]; the chain
/// fills in `id`, `timestamp`, `previous_hash`, `hash`, `signature`, and
/// `signing_key_id` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    /// Short machine-readable event name (e.g. `"login_succeeded"`).
    pub event: String,
    /// Severity.
    pub level: AuditLevel,
    /// Human-readable description.
    pub message: String,
    /// Acting user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Related task, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Caller-supplied correlation id for tracing a request across entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Arbitrary structured metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl NewAuditEntry {
    /// Build a new entry with the required fields; metadata and identifiers
    /// default to empty/unset.
    #[must_use]
    pub fn new(event: impl Into<String>, level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            level,
            message: message.into(),
            user_id: None,
            task_id: None,
            correlation_id: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach the acting user id.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the related task id.
    #[must_use]
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Attach a single metadata key/value pair.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }
}

/// A committed entry in the [`crate::AuditChain`].
///
/// `hash` and `signature` cover every field here except themselves and
/// `signing_key_id`; recomputing them from the other fields must reproduce
/// the stored values exactly, which is what [`crate::AuditChain::verify`]
/// checks for every entry in the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// UUID v7 identifier, time-sortable.
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Event name.
    pub event: String,
    /// Severity.
    pub level: AuditLevel,
    /// Human-readable description.
    pub message: String,
    /// Acting user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Related task, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Correlation id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Arbitrary structured metadata (keys are sorted by `BTreeMap` for a
    /// deterministic canonical form).
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Hash of the previous entry, or [`crate::GENESIS_HASH`] for the first
    /// entry in the chain.
    pub previous_hash: String,
    /// SHA-256 hash (hex) of this entry's hashed fields.
    pub hash: String,
    /// HMAC-SHA256 signature (hex) over `hash || ":" || previous_hash`.
    pub signature: String,
    /// Identifier of the signing key used to produce `signature`.
    pub signing_key_id: String,
}

/// The subset of fields covered by the entry hash, serialized canonically
/// (field order fixed, map keys sorted via `BTreeMap`'s `Serialize` impl).
#[derive(Serialize)]
struct Hashable<'a> {
    id: &'a str,
    timestamp: u64,
    event: &'a str,
    level: AuditLevel,
    message: &'a str,
    user_id: &'a Option<String>,
    task_id: &'a Option<String>,
    correlation_id: &'a Option<String>,
    metadata: &'a BTreeMap<String, serde_json::Value>,
    previous_hash: &'a str,
}

impl AuditEntry {
    /// Recompute this entry's hash from its hashed fields.
    ///
    /// Returns `None` if canonicalization fails (unrepresentable metadata
    /// values), which should never happen for `serde_json::Value` content.
    #[must_use]
    pub fn recompute_hash(&self) -> Option<String> {
        let hashable = Hashable {
            id: &self.id,
            timestamp: self.timestamp,
            event: &self.event,
            level: self.level,
            message: &self.message,
            user_id: &self.user_id,
            task_id: &self.task_id,
            correlation_id: &self.correlation_id,
            metadata: &self.metadata,
            previous_hash: &self.previous_hash,
        };
        let canonical = serde_json::to_vec(&hashable).ok()?;
        Some(aegis_crypto::sha256_hex(&canonical))
    }

    /// The bytes an entry's signature is computed over:
    /// `hash || ":" || previous_hash`.
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        format!("{}:{}", self.hash, self.previous_hash).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recompute_hash_is_deterministic() {
        let entry = AuditEntry {
            id: "01234567-89ab-7cde-8000-000000000000".into(),
            timestamp: 1_700_000_000_000,
            event: "login_succeeded".into(),
            level: AuditLevel::Security,
            message: "admin logged in".into(),
            user_id: Some("admin".into()),
            task_id: None,
            correlation_id: None,
            metadata: BTreeMap::new(),
            previous_hash: crate::GENESIS_HASH.to_string(),
            hash: String::new(),
            signature: String::new(),
            signing_key_id: "key_1".into(),
        };
        let h1 = entry.recompute_hash().unwrap();
        let h2 = entry.recompute_hash().unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn hash_changes_with_metadata() {
        let mut entry = AuditEntry {
            id: "id".into(),
            timestamp: 1,
            event: "e".into(),
            level: AuditLevel::Info,
            message: "m".into(),
            user_id: None,
            task_id: None,
            correlation_id: None,
            metadata: BTreeMap::new(),
            previous_hash: crate::GENESIS_HASH.to_string(),
            hash: String::new(),
            signature: String::new(),
            signing_key_id: "key_1".into(),
        };
        let base = entry.recompute_hash().unwrap();
        entry
            .metadata
            .insert("ip".into(), serde_json::json!("10.0.0.1"));
        let with_meta = entry.recompute_hash().unwrap();
        assert_ne!(base, with_meta);
    }

    #[test]
    fn metadata_key_order_does_not_affect_hash() {
        let mut meta_a = BTreeMap::new();
        meta_a.insert("a".to_string(), serde_json::json!(1));
        meta_a.insert("b".to_string(), serde_json::json!(2));

        let mut meta_b = BTreeMap::new();
        meta_b.insert("b".to_string(), serde_json::json!(2));
        meta_b.insert("a".to_string(), serde_json::json!(1));

        let make = |metadata| AuditEntry {
            id: "id".into(),
            timestamp: 1,
            event: "e".into(),
            level: AuditLevel::Info,
            message: "m".into(),
            user_id: None,
            task_id: None,
            correlation_id: None,
            metadata,
            previous_hash: crate::GENESIS_HASH.to_string(),
            hash: String::new(),
            signature: String::new(),
            signing_key_id: "key_1".into(),
        };

        assert_eq!(
            make(meta_a).recompute_hash(),
            make(meta_b).recompute_hash()
        );
    }
}
