// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::entry::{AuditEntry, AuditLevel, NewAuditEntry};
use crate::keys::KeyRegistry;
use crate::storage::{AuditChainStorage, StorageError};
use aegis_error::{AegisError, ErrorCode};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Outcome of [`AuditChain::verify`].
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// `true` iff every entry passed hash, link, and signature checks.
    pub valid: bool,
    /// Total number of entries examined.
    pub entries_checked: usize,
    /// Human-readable description of each failure found, in chain order.
    pub errors: Vec<String>,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as u64
}

/// Append-only, hash-linked, HMAC-signed audit chain.
///
/// Construction requires an initial signing key; [`AuditChain::record`]
/// serializes concurrent callers so the sequence of `previous_hash` values
/// forms a single strand.
pub struct AuditChain {
    storage: Arc<dyn AuditChainStorage>,
    keys: Mutex<KeyRegistry>,
    last_hash: Mutex<String>,
}

impl AuditChain {
    /// Create a new chain backed by `storage`, signing new entries with
    /// `initial_key`.
    ///
    /// Use [`Self::initialize`] afterwards to load and verify any entries
    /// already present in `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn AuditChainStorage>, initial_key: Vec<u8>) -> Self {
        let mut keys = KeyRegistry::new();
        keys.bootstrap(initial_key);
        Self {
            storage,
            keys: Mutex::new(keys),
            last_hash: Mutex::new(crate::GENESIS_HASH.to_string()),
        }
    }

    /// Load any prior entries from storage and verify the whole chain.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ChainBroken`] if the persisted chain fails
    /// verification against the currently known key set.
    pub async fn initialize(&self) -> Result<(), AegisError> {
        let entries = self
            .storage
            .load_all()
            .await
            .map_err(storage_err)?;
        if let Some(last) = entries.last() {
            *self.last_hash.lock().await = last.hash.clone();
        }
        if entries.is_empty() {
            return Ok(());
        }
        let report = self.verify_entries(&entries).await;
        if !report.valid {
            return Err(AegisError::new(
                ErrorCode::ChainBroken,
                "persisted audit chain failed verification on startup",
            )
            .with_context("errors", report.errors));
        }
        Ok(())
    }

    /// Append a new entry, computing its hash and signature with the
    /// current signing key.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Internal`] if the storage backend rejects the
    /// append; the in-memory pointer is left unchanged in that case.
    pub async fn record(&self, new_entry: NewAuditEntry) -> Result<AuditEntry, AegisError> {
        // Serializes concurrent callers: the mutex guard is held across the
        // read-modify-write of `last_hash` so two records can never observe
        // (and link to) the same previous hash.
        let mut last_hash = self.last_hash.lock().await;
        let keys = self.keys.lock().await;
        let entry = self.build_entry(new_entry, last_hash.clone(), &keys);
        drop(keys);

        self.storage
            .append(entry.clone())
            .await
            .map_err(storage_err)?;
        *last_hash = entry.hash.clone();
        debug!(event = %entry.event, id = %entry.id, "audit entry recorded");
        Ok(entry)
    }

    fn build_entry(
        &self,
        new_entry: NewAuditEntry,
        previous_hash: String,
        keys: &KeyRegistry,
    ) -> AuditEntry {
        let key = keys.current();
        let mut entry = AuditEntry {
            id: aegis_crypto::uuid_v7(),
            timestamp: now_ms(),
            event: new_entry.event,
            level: new_entry.level,
            message: new_entry.message,
            user_id: new_entry.user_id,
            task_id: new_entry.task_id,
            correlation_id: new_entry.correlation_id,
            metadata: new_entry.metadata,
            previous_hash,
            hash: String::new(),
            signature: String::new(),
            signing_key_id: key.id.clone(),
        };
        entry.hash = entry
            .recompute_hash()
            .expect("entry fields always serialize");
        entry.signature = aegis_crypto::hmac_sha256_hex(key.secret(), &entry.signing_payload());
        entry
    }

    /// Rotate the signing key: records an `audit_key_rotated` entry signed
    /// with the outgoing key, then installs `new_key` as current. The old
    /// key is retained (not discarded) so prior entries still verify.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from recording the rotation entry.
    pub async fn update_signing_key(&self, new_key: Vec<u8>) -> Result<(), AegisError> {
        let rotated = NewAuditEntry::new(
            "audit_key_rotated",
            AuditLevel::Security,
            "audit signing key rotated",
        );
        self.record(rotated).await?;

        let mut keys = self.keys.lock().await;
        let (old_id, new_id) = keys.rotate(new_key, now_ms());
        drop(keys);
        debug!(old_key = %old_id, new_key = %new_id, "audit signing key rotated");
        Ok(())
    }

    /// Permanently discard every retired signing key. Entries signed under
    /// those keys can no longer be verified after this call.
    pub async fn clear_previous_keys(&self) {
        self.keys.lock().await.forget_retired();
    }

    /// Verify the entire persisted chain.
    ///
    /// # Errors
    ///
    /// Propagates a storage error if entries cannot be loaded; a failed
    /// verification itself is reported in the returned [`VerifyReport`]
    /// rather than as an `Err`.
    pub async fn verify(&self) -> Result<VerifyReport, AegisError> {
        let entries = self
            .storage
            .load_all()
            .await
            .map_err(storage_err)?;
        Ok(self.verify_entries(&entries).await)
    }

    async fn verify_entries(&self, entries: &[AuditEntry]) -> VerifyReport {
        let keys = self.keys.lock().await;
        let mut errors = Vec::new();
        let mut previous = crate::GENESIS_HASH.to_string();

        for (i, entry) in entries.iter().enumerate() {
            if entry.previous_hash != previous {
                errors.push(format!("entry {i} ({}): broken link", entry.id));
            }
            match entry.recompute_hash() {
                Some(h) if h == entry.hash => {}
                _ => errors.push(format!("entry {i} ({}): hash mismatch", entry.id)),
            }
            match keys.get(&entry.signing_key_id) {
                Some(key) => {
                    if !aegis_crypto::verify_hmac_sha256(
                        key.secret(),
                        &entry.signing_payload(),
                        &decode_hex(&entry.signature),
                    ) {
                        errors.push(format!("entry {i} ({}): signature mismatch", entry.id));
                    }
                }
                None => {
                    errors.push(format!(
                        "entry {i} ({}): unknown signing key {}",
                        entry.id, entry.signing_key_id
                    ));
                }
            }
            previous = entry.hash.clone();
        }

        if !errors.is_empty() {
            warn!(count = errors.len(), "audit chain verification found errors");
        }

        VerifyReport {
            valid: errors.is_empty(),
            entries_checked: entries.len(),
            errors,
        }
    }
}

fn decode_hex(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap_or_default()
}

fn storage_err(e: StorageError) -> AegisError {
    AegisError::new(ErrorCode::Internal, "audit storage operation failed").with_source(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryAuditStorage;

    fn chain() -> AuditChain {
        AuditChain::new(
            Arc::new(InMemoryAuditStorage::new()),
            b"initial-signing-key-thats-long".to_vec(),
        )
    }

    #[tokio::test]
    async fn single_entry_verifies() {
        let chain = chain();
        chain
            .record(NewAuditEntry::new(
                "task_created",
                AuditLevel::Info,
                "task submitted",
            ))
            .await
            .unwrap();
        let report = chain.verify().await.unwrap();
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.entries_checked, 1);
    }

    #[tokio::test]
    async fn chain_links_consecutive_entries() {
        let chain = chain();
        let e1 = chain
            .record(NewAuditEntry::new("a", AuditLevel::Info, "first"))
            .await
            .unwrap();
        let e2 = chain
            .record(NewAuditEntry::new("b", AuditLevel::Info, "second"))
            .await
            .unwrap();
        assert_eq!(e2.previous_hash, e1.hash);
        assert_eq!(e1.previous_hash, crate::GENESIS_HASH);
    }

    #[tokio::test]
    async fn rotation_preserves_verifiability() {
        let chain = chain();
        for i in 0..3 {
            chain
                .record(NewAuditEntry::new(
                    format!("event_{i}"),
                    AuditLevel::Info,
                    "pre-rotation",
                ))
                .await
                .unwrap();
        }
        chain
            .update_signing_key(b"second-signing-key-thats-long".to_vec())
            .await
            .unwrap();
        for i in 0..2 {
            chain
                .record(NewAuditEntry::new(
                    format!("post_{i}"),
                    AuditLevel::Info,
                    "post-rotation",
                ))
                .await
                .unwrap();
        }
        chain
            .update_signing_key(b"third-signing-key-thats-long!!".to_vec())
            .await
            .unwrap();
        chain
            .record(NewAuditEntry::new("last", AuditLevel::Info, "final"))
            .await
            .unwrap();

        let report = chain.verify().await.unwrap();
        assert!(report.valid, "{:?}", report.errors);
        // 3 pre + 1 rotation + 2 post + 1 rotation + 1 last = 8
        assert_eq!(report.entries_checked, 8);
    }

    #[tokio::test]
    async fn tampered_entry_fails_verification() {
        let storage = Arc::new(InMemoryAuditStorage::new());
        let chain = AuditChain::new(storage.clone(), b"initial-signing-key-thats-long".to_vec());
        chain
            .record(NewAuditEntry::new("a", AuditLevel::Info, "first"))
            .await
            .unwrap();

        let mut entries = storage.load_all().await.unwrap();
        entries[0].message = "tampered".to_string();
        let storage2 = Arc::new(InMemoryAuditStorage::new());
        for e in entries {
            storage2.append(e).await.unwrap();
        }
        let chain2 = AuditChain::new(storage2, b"initial-signing-key-thats-long".to_vec());
        let report = chain2.verify().await.unwrap();
        assert!(!report.valid);
        assert!(!report.errors.is_empty());
    }

    #[tokio::test]
    async fn initialize_rejects_broken_persisted_chain() {
        let storage = Arc::new(InMemoryAuditStorage::new());
        let chain = AuditChain::new(storage.clone(), b"initial-signing-key-thats-long".to_vec());
        chain
            .record(NewAuditEntry::new("a", AuditLevel::Info, "first"))
            .await
            .unwrap();
        let mut entries = storage.load_all().await.unwrap();
        entries[0].hash = "0".repeat(64);
        let storage2 = Arc::new(InMemoryAuditStorage::new());
        for e in entries {
            storage2.append(e).await.unwrap();
        }
        let chain2 = AuditChain::new(storage2, b"initial-signing-key-thats-long".to_vec());
        let err = chain2.initialize().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ChainBroken);
    }

    #[tokio::test]
    async fn clear_previous_keys_breaks_old_signatures() {
        let chain = chain();
        chain
            .record(NewAuditEntry::new("a", AuditLevel::Info, "first"))
            .await
            .unwrap();
        chain
            .update_signing_key(b"second-signing-key-thats-long".to_vec())
            .await
            .unwrap();
        chain.clear_previous_keys().await;
        let report = chain.verify().await.unwrap();
        assert!(!report.valid);
    }
}
