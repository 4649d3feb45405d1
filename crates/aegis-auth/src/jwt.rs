// SPDX-License-Identifier: MIT OR Apache-2.0
use aegis_error::{AegisError, ErrorCode};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;

const SECRET_GRACE: Duration = Duration::from_secs(60 * 60);

fn is_expired(err: &jsonwebtoken::errors::Error) -> bool {
    matches!(err.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature)
}

/// Claims encoded into the access-token JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    /// Resolved role id.
    pub role: String,
    /// Token id, used for blacklisting.
    pub jti: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Password generation this token was minted under; a reset bumps this
    /// and invalidates every token minted before the bump.
    pub gen: u64,
}

struct SecretState {
    current: String,
    previous: Option<(String, tokio::time::Instant)>,
}

/// Holds the current and (briefly) previous HS256 signing secret, supporting
/// zero-downtime rotation: tokens signed under the previous secret keep
/// validating for [`SECRET_GRACE`] after a rotation.
pub struct TokenSecrets {
    state: RwLock<SecretState>,
}

impl TokenSecrets {
    /// Start with a single active secret.
    #[must_use]
    pub fn new(secret: String) -> Self {
        Self {
            state: RwLock::new(SecretState {
                current: secret,
                previous: None,
            }),
        }
    }

    /// Move the current secret to "previous" (valid for a grace window) and
    /// install `new_secret` as current.
    pub async fn rotate(&self, new_secret: String) {
        let mut state = self.state.write().await;
        let old = std::mem::replace(&mut state.current, new_secret);
        state.previous = Some((old, tokio::time::Instant::now()));
    }

    /// End the grace window immediately; only the current secret validates.
    pub async fn clear_previous(&self) {
        self.state.write().await.previous = None;
    }

    pub(crate) async fn encode(&self, claims: &Claims) -> Result<String, AegisError> {
        let state = self.state.read().await;
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(state.current.as_bytes()),
        )
        .map_err(|e| AegisError::new(ErrorCode::Internal, "failed to encode JWT").with_source(e))
    }

    pub(crate) async fn decode(&self, token: &str) -> Result<Claims, AegisError> {
        let state = self.state.read().await;
        let validation = Validation::new(jsonwebtoken::Algorithm::HS256);

        let current_err = match decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.current.as_bytes()),
            &validation,
        ) {
            Ok(data) => return Ok(data.claims),
            Err(e) => e,
        };
        if is_expired(&current_err) {
            return Err(AegisError::new(ErrorCode::TokenExpired, "token has expired"));
        }

        if let Some((previous, rotated_at)) = &state.previous {
            if rotated_at.elapsed() < SECRET_GRACE {
                match decode::<Claims>(
                    token,
                    &DecodingKey::from_secret(previous.as_bytes()),
                    &validation,
                ) {
                    Ok(data) => return Ok(data.claims),
                    Err(e) if is_expired(&e) => {
                        return Err(AegisError::new(ErrorCode::TokenExpired, "token has expired"));
                    }
                    Err(_) => {}
                }
            }
        }

        Err(AegisError::new(ErrorCode::TokenInvalid, "token signature is invalid"))
    }
}
