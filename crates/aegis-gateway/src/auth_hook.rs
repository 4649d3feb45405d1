// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layered authentication middleware: mTLS peer certificate, then bearer
//! JWT, then API key — first success wins, per the gateway's auth stage.

use crate::routes::PUBLIC_ROUTES;
use crate::state::AppState;
use aegis_auth::{AuthMethod, AuthUser};
use aegis_error::{AegisError, ErrorCode};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Header a TLS-terminating proxy is expected to set with the verified
/// client certificate's Common Name, once mTLS has been validated upstream
/// of this process (the gateway itself does not terminate TLS).
const CLIENT_CERT_CN_HEADER: &str = "x-client-cert-cn";

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn resolve_certificate(state: &AppState, headers: &HeaderMap) -> Option<AuthUser> {
    let cn = headers.get(CLIENT_CERT_CN_HEADER)?.to_str().ok()?.to_string();
    let role = state
        .rbac
        .list_user_assignments()
        .into_iter()
        .find(|a| a.user_id == cn && a.is_active())
        .map(|a| a.role_id)
        .unwrap_or_else(|| "role_operator".to_string());
    Some(AuthUser {
        auth_method: AuthMethod::Certificate,
        user_id: cn,
        role,
        jti: None,
        exp: None,
    })
}

async fn resolve_bearer(state: &AppState, headers: &HeaderMap) -> Option<Result<AuthUser, AegisError>> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    Some(state.auth.validate_token(token, now()).await)
}

async fn resolve_api_key(state: &AppState, headers: &HeaderMap) -> Option<Result<AuthUser, AegisError>> {
    let raw = headers.get("x-api-key")?.to_str().ok()?;
    Some(state.auth.validate_api_key(raw, now()).await)
}

/// Resolve the caller's identity for routes that require authentication.
/// Public routes are passed through untouched with no `AuthUser` extension.
pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if PUBLIC_ROUTES.iter().any(|p| *p == path) {
        return next.run(req).await;
    }

    let headers = req.headers().clone();

    if let Some(user) = resolve_certificate(&state, &headers).await {
        req.extensions_mut().insert(user);
        return next.run(req).await;
    }

    if let Some(result) = resolve_bearer(&state, &headers).await {
        return match result {
            Ok(user) => {
                req.extensions_mut().insert(user);
                next.run(req).await
            }
            Err(err) => crate::error::ApiError(err).into_response(),
        };
    }

    if let Some(result) = resolve_api_key(&state, &headers).await {
        return match result {
            Ok(user) => {
                req.extensions_mut().insert(user);
                next.run(req).await
            }
            Err(err) => crate::error::ApiError(err).into_response(),
        };
    }

    crate::error::ApiError(AegisError::new(
        ErrorCode::Unauthenticated,
        "missing authentication credentials",
    ))
    .into_response()
}
