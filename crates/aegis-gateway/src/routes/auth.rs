// SPDX-License-Identifier: MIT OR Apache-2.0
//! `/api/v1/auth/*` — login, token lifecycle, API keys, roles, and
//! assignments. Everything here runs after the gateway's auth/RBAC hooks
//! except `login` and `refresh`, which are public per
//! [`crate::routes::PUBLIC_ROUTES`].

use crate::error::ApiError;
use crate::state::AppState;
use aegis_auth::AuthUser;
use aegis_error::{AegisError, ErrorCode};
use aegis_rbac::{Permission, Role, UserAssignment};
use axum::extract::{ConnectInfo, Extension, Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    password: String,
    #[serde(default)]
    remember_me: bool,
}

/// `POST /api/v1/auth/login` — public.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .auth
        .login(&req.password, &addr.ip().to_string(), req.remember_me, now())
        .await?;
    Ok(Json(json!({
        "accessToken": result.access_token,
        "refreshToken": result.refresh_token,
        "expiresIn": result.expires_in,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

/// `POST /api/v1/auth/refresh` — public; the refresh token itself is the
/// credential.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state.auth.refresh(&req.refresh_token, now()).await?;
    Ok(Json(json!({
        "accessToken": result.access_token,
        "expiresIn": result.expires_in,
    })))
}

/// `POST /api/v1/auth/logout` — token-only.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let (jti, exp) = match (user.jti, user.exp) {
        (Some(jti), Some(exp)) => (jti, exp),
        _ => {
            return Err(ApiError(AegisError::new(
                ErrorCode::Unauthenticated,
                "logout requires a bearer token",
            )))
        }
    };
    state.auth.logout(&jti, &user.user_id, exp).await;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(rename = "currentPassword")]
    current_password: String,
    #[serde(rename = "newPassword")]
    new_password: String,
}

/// `POST /api/v1/auth/reset-password` — token-only; invalidates every
/// previously issued session.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .auth
        .reset_password(
            &req.current_password,
            aegis_crypto::sha256_hex(req.new_password.as_bytes()),
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// `POST /api/v1/auth/verify` — gated on `auth:read`; echoes the resolved
/// claims back to the caller.
pub async fn verify(Extension(user): Extension<AuthUser>) -> Json<Value> {
    Json(json!({
        "userId": user.user_id,
        "role": user.role,
        "authMethod": user.auth_method,
        "jti": user.jti,
        "exp": user.exp,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    name: String,
    role: String,
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "expiresInDays", default)]
    expires_in_days: Option<i64>,
}

/// `GET /api/v1/auth/api-keys` — gated on `auth:read`.
pub async fn list_api_keys(State(state): State<Arc<AppState>>) -> Json<Value> {
    let keys = state.auth.list_api_keys().await;
    Json(json!(keys
        .into_iter()
        .map(|k| json!({
            "id": k.id,
            "name": k.name,
            "userId": k.user_id,
            "role": k.role,
            "createdAt": k.created_at,
            "expiresAt": k.expires_at,
            "revokedAt": k.revoked_at,
        }))
        .collect::<Vec<_>>()))
}

/// `POST /api/v1/auth/api-keys` — gated on `auth:write`; the raw key is
/// returned once and never again.
pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Json<Value> {
    let issued = state
        .auth
        .create_api_key(req.name, req.role, req.user_id, req.expires_in_days, now())
        .await;
    Json(json!({ "id": issued.id, "key": issued.key }))
}

/// `DELETE /api/v1/auth/api-keys/{id}` — gated on `auth:write`.
pub async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.auth.revoke_api_key(&id, now()).await?;
    Ok(Json(json!({ "ok": true })))
}

/// `GET /api/v1/auth/roles` — gated on `auth:read`.
pub async fn list_roles(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.rbac.list_roles()))
}

#[derive(Debug, Deserialize)]
pub struct DefineRoleRequest {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default, rename = "inheritFrom")]
    inherit_from: Vec<String>,
}

/// `POST /api/v1/auth/roles` — gated on `auth:write`; built-in roles cannot
/// be redefined.
pub async fn define_role(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DefineRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    let role = Role {
        id: req.id,
        name: req.name,
        description: req.description,
        permissions: req.permissions,
        inherit_from: req.inherit_from,
        immutable: false,
    };
    state.rbac.define_role(role)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "roleId")]
    role_id: String,
}

/// `POST /api/v1/auth/assignments` — gated on `auth:write`; at most one
/// active assignment per user.
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    if state.rbac.get_role(&req.role_id).is_none() {
        return Err(ApiError(AegisError::new(ErrorCode::NotFound, "no such role")));
    }
    state
        .rbac
        .assign_user_role(&req.user_id, &req.role_id, &caller.user_id, now_ms());
    Ok(Json(json!({ "ok": true })))
}

/// `DELETE /api/v1/auth/assignments/{user_id}` — gated on `auth:write`.
pub async fn revoke_assignment(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<Value> {
    state.rbac.revoke_user_role(&user_id, now_ms());
    Json(json!({ "ok": true }))
}

/// `GET /api/v1/auth/assignments` — gated on `auth:read`.
pub async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<UserAssignment>> {
    Json(state.rbac.list_user_assignments())
}
