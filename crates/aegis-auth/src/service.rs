// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::apikey::{ApiKeyIssued, ApiKeyStore};
use crate::blacklist::TokenBlacklist;
use crate::jwt::{Claims, TokenSecrets};
use crate::user::{AuthMethod, AuthUser};
use aegis_audit::{AuditChain, AuditLevel, NewAuditEntry};
use aegis_error::{AegisError, ErrorCode};
use aegis_ratelimit::RateLimiter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const REMEMBER_ME_REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Result of a successful [`AuthService::login`] or [`AuthService::refresh`].
#[derive(Debug, Clone)]
pub struct LoginResult {
    /// Signed JWT access token.
    pub access_token: String,
    /// Opaque high-entropy refresh token; only its hash is persisted.
    pub refresh_token: String,
    /// Access token lifetime, in seconds.
    pub expires_in: i64,
}

/// Result of a successful [`AuthService::refresh`] — no new refresh token is
/// minted, only the access token is rotated.
#[derive(Debug, Clone)]
pub struct RefreshResult {
    /// Newly signed JWT access token.
    pub access_token: String,
    /// Access token lifetime, in seconds.
    pub expires_in: i64,
}

struct RefreshTokenRecord {
    user_id: String,
    expires_at: i64,
}

/// The single admin identity's authentication state: password, JWT issuance
/// with dual-key grace, refresh tokens, API keys, and the revocation
/// blacklist.
///
/// There is exactly one password-holding principal (`"admin"`) per the
/// spec's scope; multi-user identity is carried entirely by RBAC role
/// assignments layered on top, not by this service.
pub struct AuthService {
    admin_password_hash: RwLock<String>,
    generation: AtomicU64,
    secrets: TokenSecrets,
    blacklist: Arc<TokenBlacklist>,
    api_keys: ApiKeyStore,
    refresh_tokens: Mutex<HashMap<String, RefreshTokenRecord>>,
    rate_limiter: Arc<RateLimiter>,
    audit: Arc<AuditChain>,
    access_ttl_secs: i64,
}

impl AuthService {
    /// Construct the service with the admin password hash (`sha256(password)`,
    /// hex) and initial token-signing secret.
    #[must_use]
    pub fn new(
        admin_password_hash: String,
        token_secret: String,
        rate_limiter: Arc<RateLimiter>,
        audit: Arc<AuditChain>,
    ) -> Self {
        Self {
            admin_password_hash: RwLock::new(admin_password_hash),
            generation: AtomicU64::new(0),
            secrets: TokenSecrets::new(token_secret),
            blacklist: Arc::new(TokenBlacklist::new()),
            api_keys: ApiKeyStore::new(),
            refresh_tokens: Mutex::new(HashMap::new()),
            rate_limiter,
            audit,
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
        }
    }

    /// Shared handle to the revocation blacklist, for spawning its janitor.
    #[must_use]
    pub fn blacklist(&self) -> Arc<TokenBlacklist> {
        Arc::clone(&self.blacklist)
    }

    /// Authenticate with the admin password.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::RateLimited`] if `auth_attempts` is exhausted for
    /// `ip`, or [`ErrorCode::InvalidCredentials`] on a password mismatch.
    pub async fn login(
        &self,
        password: &str,
        ip: &str,
        remember_me: bool,
        now: i64,
    ) -> Result<LoginResult, AegisError> {
        let check = self.rate_limiter.check("auth_attempts", ip)?;
        if !check.allowed {
            return Err(AegisError::new(ErrorCode::RateLimited, "too many login attempts")
                .with_context("retry_after_secs", check.retry_after_secs));
        }

        let candidate_hash = aegis_crypto::sha256_hex(password.as_bytes());
        let current_hash = self.admin_password_hash.read().await.clone();
        if !aegis_crypto::secure_compare(candidate_hash.as_bytes(), current_hash.as_bytes()) {
            self.audit
                .record(NewAuditEntry::new(
                    "login_failed",
                    AuditLevel::Security,
                    "admin login failed",
                )
                .with_metadata("ip", ip))
                .await
                .ok();
            return Err(AegisError::new(ErrorCode::InvalidCredentials, "invalid password"));
        }

        let claims = Claims {
            sub: "admin".to_string(),
            role: "admin".to_string(),
            jti: aegis_crypto::uuid_v7(),
            iat: now,
            exp: now + self.access_ttl_secs,
            gen: self.generation.load(Relaxed),
        };
        let access_token = self.secrets.encode(&claims).await?;

        let refresh_ttl = if remember_me {
            REMEMBER_ME_REFRESH_TTL_SECS
        } else {
            DEFAULT_REFRESH_TTL_SECS
        };
        let refresh_token = format!("rtk_{}", aegis_crypto::random_hex(32));
        self.refresh_tokens.lock().await.insert(
            aegis_crypto::sha256_hex(refresh_token.as_bytes()),
            RefreshTokenRecord {
                user_id: "admin".to_string(),
                expires_at: now + refresh_ttl,
            },
        );

        self.audit
            .record(NewAuditEntry::new(
                "login_succeeded",
                AuditLevel::Security,
                "admin logged in",
            )
            .with_user("admin")
            .with_metadata("ip", ip))
            .await
            .ok();

        Ok(LoginResult {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_secs,
        })
    }

    /// Rotate the access token from a valid, unexpired refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::TokenInvalid`] if the refresh token is unknown or
    /// expired.
    pub async fn refresh(&self, refresh_token: &str, now: i64) -> Result<RefreshResult, AegisError> {
        let hash = aegis_crypto::sha256_hex(refresh_token.as_bytes());
        let refresh_tokens = self.refresh_tokens.lock().await;
        let record = refresh_tokens
            .get(&hash)
            .ok_or_else(|| AegisError::new(ErrorCode::TokenInvalid, "unknown refresh token"))?;
        if record.expires_at <= now {
            return Err(AegisError::new(ErrorCode::TokenInvalid, "refresh token has expired"));
        }
        let claims = Claims {
            sub: record.user_id.clone(),
            role: "admin".to_string(),
            jti: aegis_crypto::uuid_v7(),
            iat: now,
            exp: now + self.access_ttl_secs,
            gen: self.generation.load(Relaxed),
        };
        drop(refresh_tokens);
        let access_token = self.secrets.encode(&claims).await?;
        Ok(RefreshResult {
            access_token,
            expires_in: self.access_ttl_secs,
        })
    }

    /// Validate a bearer access token, returning the resolved [`AuthUser`].
    ///
    /// # Errors
    ///
    /// Propagates [`ErrorCode::TokenExpired`]/[`ErrorCode::TokenInvalid`] from
    /// decoding; also returns [`ErrorCode::TokenExpired`] if the token's
    /// `jti` has been blacklisted or its generation predates the most recent
    /// password reset.
    pub async fn validate_token(&self, token: &str, now: i64) -> Result<AuthUser, AegisError> {
        let claims = self.secrets.decode(token).await?;
        if claims.exp < now {
            return Err(AegisError::new(ErrorCode::TokenExpired, "token has expired"));
        }
        if claims.gen != self.generation.load(Relaxed) {
            return Err(AegisError::new(
                ErrorCode::TokenExpired,
                "token was issued before the last password reset",
            ));
        }
        if self.blacklist.contains(&claims.jti).await {
            return Err(AegisError::new(ErrorCode::TokenExpired, "token has been revoked"));
        }
        Ok(AuthUser {
            auth_method: AuthMethod::Bearer,
            user_id: claims.sub,
            role: claims.role,
            jti: Some(claims.jti),
            exp: Some(claims.exp),
        })
    }

    /// Blacklist `jti` so it can no longer validate, even before `exp`.
    pub async fn logout(&self, jti: &str, user_id: &str, exp: i64) {
        self.blacklist.revoke(jti, exp).await;
        info!(jti, user_id, "token revoked at logout");
    }

    /// Verify `current_password`, install `new_password_hash`, and bump the
    /// generation counter so every previously issued JWT is rejected
    /// regardless of blacklist membership.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidCredentials`] if `current_password` does
    /// not match the stored hash.
    pub async fn reset_password(
        &self,
        current_password: &str,
        new_password_hash: String,
    ) -> Result<(), AegisError> {
        let candidate_hash = aegis_crypto::sha256_hex(current_password.as_bytes());
        let mut stored = self.admin_password_hash.write().await;
        if !aegis_crypto::secure_compare(candidate_hash.as_bytes(), stored.as_bytes()) {
            return Err(AegisError::new(ErrorCode::InvalidCredentials, "current password is incorrect"));
        }
        *stored = new_password_hash;
        drop(stored);
        self.generation.fetch_add(1, Relaxed);
        self.audit
            .record(NewAuditEntry::new(
                "password_reset",
                AuditLevel::Security,
                "admin password reset; all sessions invalidated",
            )
            .with_user("admin"))
            .await
            .ok();
        Ok(())
    }

    /// Rotate the token-signing secret; tokens signed under the outgoing
    /// secret keep validating for the grace window (see [`TokenSecrets`]).
    pub async fn update_token_secret(&self, new_secret: String) -> Result<(), AegisError> {
        self.secrets.rotate(new_secret).await;
        self.audit
            .record(NewAuditEntry::new(
                "token_secret_rotated",
                AuditLevel::Security,
                "JWT signing secret rotated",
            ))
            .await
            .ok();
        Ok(())
    }

    /// End the post-rotation grace window immediately.
    pub async fn clear_previous_secret(&self) {
        self.secrets.clear_previous().await;
    }

    /// Mint a new API key.
    pub async fn create_api_key(
        &self,
        name: impl Into<String>,
        role: impl Into<String>,
        user_id: impl Into<String>,
        expires_in_days: Option<i64>,
        now: i64,
    ) -> ApiKeyIssued {
        let name = name.into();
        let issued = self
            .api_keys
            .create(name.clone(), role, user_id, expires_in_days, now)
            .await;
        self.audit
            .record(
                NewAuditEntry::new("api_key_created", AuditLevel::Info, "API key created")
                    .with_metadata("api_key_id", issued.id.clone())
                    .with_metadata("name", name),
            )
            .await
            .ok();
        issued
    }

    /// Validate a raw API key presented by a caller.
    ///
    /// # Errors
    ///
    /// Propagates [`ErrorCode::ApiKeyInvalid`]/[`ErrorCode::ApiKeyRevoked`]
    /// from the underlying store.
    pub async fn validate_api_key(&self, raw: &str, now: i64) -> Result<AuthUser, AegisError> {
        let (user_id, role) = self.api_keys.validate(raw, now).await?;
        Ok(AuthUser {
            auth_method: AuthMethod::ApiKey,
            user_id,
            role,
            jti: None,
            exp: None,
        })
    }

    /// Tombstone an API key.
    ///
    /// # Errors
    ///
    /// Propagates [`ErrorCode::NotFound`] from the underlying store.
    pub async fn revoke_api_key(&self, id: &str, now: i64) -> Result<(), AegisError> {
        self.api_keys.revoke(id, now).await?;
        self.audit
            .record(
                NewAuditEntry::new("api_key_revoked", AuditLevel::Info, "API key revoked")
                    .with_metadata("api_key_id", id),
            )
            .await
            .ok();
        Ok(())
    }

    /// List metadata for every API key ever created.
    pub async fn list_api_keys(&self) -> Vec<crate::apikey::ApiKeyInfo> {
        self.api_keys.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_audit::{AuditChain, InMemoryAuditStorage};
    use aegis_ratelimit::RateLimiter;
    use std::sync::Arc;

    fn service() -> AuthService {
        let audit = Arc::new(AuditChain::new(
            Arc::new(InMemoryAuditStorage::new()),
            b"test-audit-signing-key-long-enough".to_vec(),
        ));
        let rl = Arc::new(RateLimiter::default());
        AuthService::new(
            aegis_crypto::sha256_hex(b"correct horse battery staple"),
            "a-very-long-test-secret-value!!".to_string(),
            rl,
            audit,
        )
    }

    #[tokio::test]
    async fn login_succeeds_with_correct_password() {
        let svc = service();
        let result = svc
            .login("correct horse battery staple", "1.2.3.4", false, 1000)
            .await
            .unwrap();
        assert!(!result.access_token.is_empty());
        assert!(result.refresh_token.starts_with("rtk_"));
    }

    #[tokio::test]
    async fn login_fails_with_wrong_password() {
        let svc = service();
        let err = svc.login("wrong", "1.2.3.4", false, 1000).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCredentials);
    }

    #[tokio::test]
    async fn issued_token_validates() {
        let svc = service();
        let result = svc
            .login("correct horse battery staple", "1.2.3.4", false, 1000)
            .await
            .unwrap();
        let user = svc.validate_token(&result.access_token, 1100).await.unwrap();
        assert_eq!(user.user_id, "admin");
        assert_eq!(user.role, "admin");
    }

    #[tokio::test]
    async fn dual_key_grace_then_rejection() {
        let svc = service();
        let result = svc
            .login("correct horse battery staple", "1.2.3.4", false, 1000)
            .await
            .unwrap();
        svc.update_token_secret("new-32-byte-secret!!!!!!!!!!!!!!".to_string())
            .await
            .unwrap();
        let user = svc.validate_token(&result.access_token, 1100).await.unwrap();
        assert_eq!(user.user_id, "admin");

        svc.clear_previous_secret().await;
        let err = svc.validate_token(&result.access_token, 1200).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenInvalid);
    }

    #[tokio::test]
    async fn logout_blacklists_jti() {
        let svc = service();
        let result = svc
            .login("correct horse battery staple", "1.2.3.4", false, 1000)
            .await
            .unwrap();
        let user = svc.validate_token(&result.access_token, 1100).await.unwrap();
        svc.logout(&user.jti.clone().unwrap(), &user.user_id, user.exp.unwrap())
            .await;
        let err = svc.validate_token(&result.access_token, 1200).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);
    }

    #[tokio::test]
    async fn reset_password_invalidates_existing_tokens() {
        let svc = service();
        let result = svc
            .login("correct horse battery staple", "1.2.3.4", false, 1000)
            .await
            .unwrap();
        svc.reset_password(
            "correct horse battery staple",
            aegis_crypto::sha256_hex(b"new password"),
        )
        .await
        .unwrap();
        let err = svc.validate_token(&result.access_token, 1100).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);

        // And a fresh login with the new password succeeds.
        let new_login = svc.login("new password", "1.2.3.4", false, 1200).await.unwrap();
        assert!(svc.validate_token(&new_login.access_token, 1300).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_rotates_access_token() {
        let svc = service();
        let login = svc
            .login("correct horse battery staple", "1.2.3.4", false, 1000)
            .await
            .unwrap();
        let refreshed = svc.refresh(&login.refresh_token, 1100).await.unwrap();
        assert!(!refreshed.access_token.is_empty());
        assert_ne!(refreshed.access_token, login.access_token);
    }

    #[tokio::test]
    async fn refresh_rejects_unknown_token() {
        let svc = service();
        let err = svc.refresh("rtk_nonexistent", 1000).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenInvalid);
    }

    #[tokio::test]
    async fn login_rate_limited_after_repeated_failures() {
        let rl = Arc::new(RateLimiter::with_rules(vec![aegis_ratelimit::RateLimitRule::new(
            "auth_attempts",
            std::time::Duration::from_secs(900),
            2,
            aegis_ratelimit::KeyType::Ip,
            aegis_ratelimit::OnExceed::Reject,
        )]));
        let audit = Arc::new(AuditChain::new(
            Arc::new(InMemoryAuditStorage::new()),
            b"test-audit-signing-key-long-enough".to_vec(),
        ));
        let svc = AuthService::new(
            aegis_crypto::sha256_hex(b"secret"),
            "a-very-long-test-secret-value!!".to_string(),
            rl,
            audit,
        );
        svc.login("wrong", "9.9.9.9", false, 1000).await.ok();
        svc.login("wrong", "9.9.9.9", false, 1000).await.ok();
        let err = svc.login("secret", "9.9.9.9", false, 1000).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimited);
    }

    #[tokio::test]
    async fn api_key_lifecycle() {
        let svc = service();
        let issued = svc
            .create_api_key("ci-bot", "operator", "user_1", None, 1000)
            .await;
        let user = svc.validate_api_key(&issued.key, 1100).await.unwrap();
        assert_eq!(user.role, "operator");
        svc.revoke_api_key(&issued.id, 1200).await.unwrap();
        let err = svc.validate_api_key(&issued.key, 1300).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiKeyRevoked);
    }
}
