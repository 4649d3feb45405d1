// SPDX-License-Identifier: MIT OR Apache-2.0
use std::collections::BTreeMap;

/// A signing key known to the audit chain.
///
/// Retired keys are retained (never physically removed) so entries signed
/// before a rotation remain verifiable, unless [`KeyRegistry::forget`] is
/// called explicitly.
#[derive(Debug, Clone)]
pub struct SigningKey {
    /// Opaque identifier, referenced by [`crate::AuditEntry::signing_key_id`].
    pub id: String,
    secret: Vec<u8>,
    /// Milliseconds since epoch this key was retired, if it has been.
    pub retired_at: Option<u64>,
}

impl SigningKey {
    /// Create a new, active signing key.
    #[must_use]
    pub fn new(id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            retired_at: None,
        }
    }

    /// The raw key bytes.
    #[must_use]
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

/// In-memory registry of signing keys, indexed by id.
///
/// There is always exactly one "current" key — the one new entries are
/// signed with — plus zero or more retired keys kept around so that old
/// entries still verify.
#[derive(Debug, Default)]
pub(crate) struct KeyRegistry {
    keys: BTreeMap<String, SigningKey>,
    current_id: Option<String>,
    next_ordinal: u64,
}

impl KeyRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Install the very first key. Panics if a current key already exists —
    /// callers should use [`Self::rotate`] after the first key is set.
    pub(crate) fn bootstrap(&mut self, secret: Vec<u8>) -> String {
        debug_assert!(self.current_id.is_none(), "bootstrap called twice");
        let id = self.next_id();
        self.keys.insert(id.clone(), SigningKey::new(id.clone(), secret));
        self.current_id = Some(id.clone());
        id
    }

    fn next_id(&mut self) -> String {
        self.next_ordinal += 1;
        format!("key_{}", self.next_ordinal)
    }

    /// Retire the current key and install `secret` as the new current key.
    /// Returns `(old_key_id, new_key_id)`.
    pub(crate) fn rotate(&mut self, secret: Vec<u8>, retired_at_ms: u64) -> (String, String) {
        let old_id = self
            .current_id
            .clone()
            .expect("key registry must be bootstrapped before rotation");
        if let Some(old) = self.keys.get_mut(&old_id) {
            old.retired_at = Some(retired_at_ms);
        }
        let new_id = self.next_id();
        self.keys
            .insert(new_id.clone(), SigningKey::new(new_id.clone(), secret));
        self.current_id = Some(new_id.clone());
        (old_id, new_id)
    }

    pub(crate) fn current(&self) -> &SigningKey {
        self.keys
            .get(self.current_id.as_ref().expect("bootstrapped"))
            .expect("current key always present")
    }

    pub(crate) fn get(&self, id: &str) -> Option<&SigningKey> {
        self.keys.get(id)
    }

    /// Permanently forget every retired key, keeping only the current one.
    /// After this, older entries signed under a forgotten key can no longer
    /// be verified — callers must be sure nothing still needs them.
    pub(crate) fn forget_retired(&mut self) {
        let current = self.current_id.clone();
        self.keys
            .retain(|id, _| Some(id.clone()) == current);
    }
}
