// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route-level authorization: looks up the route template + method in
//! [`ROUTE_PERMISSIONS`] and calls into [`aegis_rbac::Rbac`]. Unmapped
//! routes default to admin-only, a corrected/retained behavior recorded in
//! the grounding ledger.

use crate::routes::{PUBLIC_ROUTES, TOKEN_ONLY_ROUTES};
use crate::state::AppState;
use aegis_audit::{AuditLevel, NewAuditEntry};
use aegis_auth::AuthUser;
use aegis_error::{AegisError, ErrorCode};
use aegis_rbac::{CheckRequest, Decision};
use axum::extract::{MatchedPath, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// A single `{resource, action}` grant required to reach a route.
#[derive(Debug, Clone, Copy)]
pub struct RoutePermission {
    /// Axum route template, e.g. `/api/v1/tasks/:id`.
    pub path: &'static str,
    /// HTTP method the permission applies to.
    pub method: &'static str,
    /// Resource checked via [`aegis_rbac::Rbac::check_permission`].
    pub resource: &'static str,
    /// Action checked via [`aegis_rbac::Rbac::check_permission`].
    pub action: &'static str,
}

/// The gateway's route → permission table. Unmapped `{path, method}` pairs
/// default to admin-only (§9 corrected-behavior-retained).
pub const ROUTE_PERMISSIONS: &[RoutePermission] = &[
    RoutePermission { path: "/api/v1/auth/verify", method: "POST", resource: "auth", action: "read" },
    RoutePermission { path: "/api/v1/auth/api-keys", method: "GET", resource: "auth", action: "read" },
    RoutePermission { path: "/api/v1/auth/api-keys", method: "POST", resource: "auth", action: "write" },
    RoutePermission { path: "/api/v1/auth/api-keys/{id}", method: "DELETE", resource: "auth", action: "write" },
    RoutePermission { path: "/api/v1/auth/roles", method: "GET", resource: "auth", action: "read" },
    RoutePermission { path: "/api/v1/auth/roles", method: "POST", resource: "auth", action: "write" },
    RoutePermission { path: "/api/v1/auth/assignments", method: "POST", resource: "auth", action: "write" },
    RoutePermission { path: "/api/v1/auth/assignments/{user_id}", method: "DELETE", resource: "auth", action: "write" },
    RoutePermission { path: "/api/v1/metrics", method: "GET", resource: "metrics", action: "read" },
    RoutePermission { path: "/api/v1/audit/verify", method: "POST", resource: "audit", action: "verify" },
    RoutePermission { path: "/api/v1/tasks", method: "POST", resource: "tasks", action: "create" },
    RoutePermission { path: "/api/v1/tasks/{id}", method: "GET", resource: "tasks", action: "read" },
    RoutePermission { path: "/api/v1/tasks/{id}/cancel", method: "POST", resource: "tasks", action: "cancel" },
];

fn lookup(path: &str, method: &Method) -> Option<&'static RoutePermission> {
    ROUTE_PERMISSIONS
        .iter()
        .find(|p| p.path == path && p.method.eq_ignore_ascii_case(method.as_str()))
}

/// Gate every non-public, non-token-only route behind RBAC, auditing every
/// denial as `permission_denied`.
pub async fn rbac_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let matched_path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();

    if PUBLIC_ROUTES.iter().any(|p| *p == matched_path) || TOKEN_ONLY_ROUTES.iter().any(|p| *p == matched_path) {
        return next.run(req).await;
    }

    let Some(user) = req.extensions().get::<AuthUser>().cloned() else {
        return crate::error::ApiError(AegisError::new(
            ErrorCode::Unauthenticated,
            "missing authentication credentials",
        ))
        .into_response();
    };

    let decision = match lookup(&matched_path, &method) {
        Some(perm) => state.rbac.check_permission(
            &user.role,
            &CheckRequest { resource: perm.resource, action: perm.action, context: None },
        ),
        None => {
            let granted = user.role == "role_admin" || user.role == "admin";
            Decision {
                granted,
                reason: if granted {
                    "unmapped route defaults to admin-only".to_string()
                } else {
                    "unmapped route is admin-only".to_string()
                },
                matched_resource: None,
            }
        }
    };

    if !decision.granted {
        state
            .audit
            .record(
                NewAuditEntry::new("permission_denied", AuditLevel::Warn, decision.reason.clone())
                    .with_user(user.user_id.clone())
                    .with_metadata("role", user.role.clone())
                    .with_metadata("path", matched_path.clone())
                    .with_metadata("method", method.as_str()),
            )
            .await
            .ok();
        return crate::error::ApiError(AegisError::new(ErrorCode::Forbidden, decision.reason)).into_response();
    }

    next.run(req).await
}
