// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route handlers and the public/token-only route tables the auth and RBAC
//! hooks consult.

pub mod audit;
pub mod auth;
pub mod health;
pub mod metrics;
pub mod tasks;

/// Routes reachable with no credential at all.
///
/// `/api/v1/auth/refresh` is public at the gateway's auth-hook layer:
/// the opaque refresh token presented in its body is itself the
/// credential, validated inside the handler — requiring a *bearer* token
/// too would deadlock a caller refreshing specifically because their
/// access token just expired.
pub const PUBLIC_ROUTES: &[&str] = &[
    "/health",
    "/api/v1/auth/login",
    "/api/v1/auth/refresh",
    "/ws/metrics",
];

/// Routes that require a valid bearer token but skip the RBAC hook — the
/// caller is only proving who they are, not asking for a scoped grant.
pub const TOKEN_ONLY_ROUTES: &[&str] = &["/api/v1/auth/logout", "/api/v1/auth/reset-password"];
