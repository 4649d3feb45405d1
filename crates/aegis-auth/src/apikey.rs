// SPDX-License-Identifier: MIT OR Apache-2.0
use aegis_error::{AegisError, ErrorCode};
use std::collections::HashMap;
use tokio::sync::Mutex;

const API_KEY_PREFIX: &str = "sck_";

/// A created API key, returned exactly once: the raw key is never persisted.
#[derive(Debug, Clone)]
pub struct ApiKeyIssued {
    /// Stored record id.
    pub id: String,
    /// The raw secret; show this to the caller once and never again.
    pub key: String,
}

/// Metadata for a previously created API key, safe to list: never carries
/// the raw secret.
#[derive(Debug, Clone)]
pub struct ApiKeyInfo {
    /// Stored record id.
    pub id: String,
    /// Display name given at creation.
    pub name: String,
    /// User id the key authenticates as.
    pub user_id: String,
    /// Role the key authenticates as.
    pub role: String,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Expiry time, unix seconds, if any.
    pub expires_at: Option<i64>,
    /// Revocation time, unix seconds, if tombstoned.
    pub revoked_at: Option<i64>,
}

#[derive(Debug, Clone)]
struct ApiKeyRecord {
    id: String,
    name: String,
    user_id: String,
    role: String,
    created_at: i64,
    expires_at: Option<i64>,
    revoked_at: Option<i64>,
}

/// API key store, keyed internally by `sha256(raw_key)` so the raw secret is
/// never retained.
pub struct ApiKeyStore {
    by_hash: Mutex<HashMap<String, ApiKeyRecord>>,
}

impl Default for ApiKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiKeyStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_hash: Mutex::new(HashMap::new()),
        }
    }

    /// Mint and persist a new API key. The raw key is returned once; only
    /// its hash is retained.
    pub async fn create(
        &self,
        name: impl Into<String>,
        role: impl Into<String>,
        user_id: impl Into<String>,
        expires_in_days: Option<i64>,
        now: i64,
    ) -> ApiKeyIssued {
        let raw = format!("{API_KEY_PREFIX}{}", aegis_crypto::random_hex(32));
        let id = aegis_crypto::uuid_v7();
        let record = ApiKeyRecord {
            id: id.clone(),
            name: name.into(),
            user_id: user_id.into(),
            role: role.into(),
            created_at: now,
            expires_at: expires_in_days.map(|days| now + days * 86_400),
            revoked_at: None,
        };
        self.by_hash
            .lock()
            .await
            .insert(aegis_crypto::sha256_hex(raw.as_bytes()), record);
        ApiKeyIssued { id, key: raw }
    }

    /// Validate a raw API key presented by a caller.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ApiKeyInvalid`] if unknown, missing, or expired;
    /// [`ErrorCode::ApiKeyRevoked`] if tombstoned.
    pub async fn validate(&self, raw: &str, now: i64) -> Result<(String, String), AegisError> {
        let hash = aegis_crypto::sha256_hex(raw.as_bytes());
        let records = self.by_hash.lock().await;
        let record = records
            .get(&hash)
            .ok_or_else(|| AegisError::new(ErrorCode::ApiKeyInvalid, "unknown API key"))?;

        if record.revoked_at.is_some() {
            return Err(AegisError::new(ErrorCode::ApiKeyRevoked, "API key has been revoked")
                .with_context("api_key_id", record.id.clone()));
        }
        if let Some(expires_at) = record.expires_at {
            if now >= expires_at {
                return Err(AegisError::new(ErrorCode::ApiKeyInvalid, "API key has expired")
                    .with_context("api_key_id", record.id.clone()));
            }
        }
        Ok((record.user_id.clone(), record.role.clone()))
    }

    /// Tombstone an API key by its record id; the record is kept, not
    /// deleted, so audit history remains complete.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::NotFound`] if no record matches `id`.
    pub async fn revoke(&self, id: &str, now: i64) -> Result<(), AegisError> {
        let mut records = self.by_hash.lock().await;
        let record = records
            .values_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AegisError::new(ErrorCode::NotFound, "no such API key"))?;
        record.revoked_at = Some(now);
        Ok(())
    }

    /// List metadata for every API key ever created, including revoked ones.
    pub async fn list(&self) -> Vec<ApiKeyInfo> {
        self.by_hash
            .lock()
            .await
            .values()
            .map(|r| ApiKeyInfo {
                id: r.id.clone(),
                name: r.name.clone(),
                user_id: r.user_id.clone(),
                role: r.role.clone(),
                created_at: r.created_at,
                expires_at: r.expires_at,
                revoked_at: r.revoked_at,
            })
            .collect()
    }
}
