// SPDX-License-Identifier: MIT OR Apache-2.0
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Revoked-token registry, keyed by JWT id (`jti`).
///
/// A background janitor periodically removes entries whose token has already
/// expired naturally, so the map doesn't grow unbounded.
pub struct TokenBlacklist {
    entries: Mutex<HashMap<String, i64>>,
}

impl Default for TokenBlacklist {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBlacklist {
    /// Construct an empty blacklist.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Revoke `jti`, valid until `exp` (unix seconds).
    pub async fn revoke(&self, jti: impl Into<String>, exp: i64) {
        self.entries.lock().await.insert(jti.into(), exp);
    }

    /// `true` if `jti` has been revoked.
    pub async fn contains(&self, jti: &str) -> bool {
        self.entries.lock().await.contains_key(jti)
    }

    /// Remove entries whose `exp` has already passed `now` (unix seconds).
    pub async fn sweep(&self, now: i64) {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, exp| *exp > now);
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, "blacklist swept expired entries");
        }
    }

    /// Number of currently tracked entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// `true` if no entries are tracked.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Spawn a background task sweeping expired entries every `interval`.
    pub fn spawn_janitor(
        self: std::sync::Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep(chrono::Utc::now().timestamp()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoke_then_contains() {
        let bl = TokenBlacklist::new();
        bl.revoke("jti-1", 9_999_999_999).await;
        assert!(bl.contains("jti-1").await);
        assert!(!bl.contains("jti-2").await);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let bl = TokenBlacklist::new();
        bl.revoke("expired", 100).await;
        bl.revoke("still-valid", 9_999_999_999).await;
        bl.sweep(200).await;
        assert!(!bl.contains("expired").await);
        assert!(bl.contains("still-valid").await);
        assert_eq!(bl.len().await, 1);
    }
}
