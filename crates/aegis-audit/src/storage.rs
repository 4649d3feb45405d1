// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::entry::AuditEntry;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::Mutex;

/// Storage backend for a [`crate::AuditChain`].
///
/// Every implementation must preserve insertion order: `load_all` returns
/// entries in the order they were appended.
#[async_trait]
pub trait AuditChainStorage: Send + Sync {
    /// Append a single entry. Implementations should treat this as an
    /// atomic operation with respect to `load_all`.
    async fn append(&self, entry: AuditEntry) -> Result<(), StorageError>;

    /// Load every entry in insertion order.
    async fn load_all(&self) -> Result<Vec<AuditEntry>, StorageError>;
}

/// Error from an [`AuditChainStorage`] operation.
#[derive(Debug)]
pub struct StorageError(pub String);

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audit storage error: {}", self.0)
    }
}

impl std::error::Error for StorageError {}

/// Default storage backend: an in-process `Vec` guarded by a mutex.
///
/// This is what every test in the workspace exercises; a durable backend
/// (file-append-log or database) can implement the same trait without the
/// rest of [`crate::AuditChain`] changing.
#[derive(Debug, Default)]
pub struct InMemoryAuditStorage {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditChainStorage for InMemoryAuditStorage {
    async fn append(&self, entry: AuditEntry) -> Result<(), StorageError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<AuditEntry>, StorageError> {
        Ok(self.entries.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditLevel;
    use std::collections::BTreeMap;

    fn sample(id: &str) -> AuditEntry {
        AuditEntry {
            id: id.to_string(),
            timestamp: 1,
            event: "e".into(),
            level: AuditLevel::Info,
            message: "m".into(),
            user_id: None,
            task_id: None,
            correlation_id: None,
            metadata: BTreeMap::new(),
            previous_hash: crate::GENESIS_HASH.to_string(),
            hash: "h".into(),
            signature: "s".into(),
            signing_key_id: "key_1".into(),
        }
    }

    #[tokio::test]
    async fn append_then_load_preserves_order() {
        let store = InMemoryAuditStorage::new();
        store.append(sample("1")).await.unwrap();
        store.append(sample("2")).await.unwrap();
        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "1");
        assert_eq!(all[1].id, "2");
    }
}
