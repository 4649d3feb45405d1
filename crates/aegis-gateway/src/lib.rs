// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP/WebSocket gateway: local-network guard, layered authentication,
//! route-level RBAC, and a `/ws/metrics` broadcast socket, wired the way
//! the teacher daemon wires its Axum router, middleware triad, and CLI
//! bootstrap.

#![deny(unsafe_code)]

pub mod auth_hook;
mod error;
pub mod middleware;
pub mod rbac_hook;
pub mod routes;
pub mod state;
pub mod ws;

pub use state::AppState;

use axum::routing::{delete, get, post};
use axum::{middleware as axum_middleware, Router};
use std::sync::Arc;

/// Build the gateway's Axum router: middleware triad (request id, request
/// logging, CORS, local-network guard) ahead of the auth and RBAC hooks,
/// ahead of every route handler.
#[must_use]
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = middleware::cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/v1/auth/login", post(routes::auth::login))
        .route("/api/v1/auth/refresh", post(routes::auth::refresh))
        .route("/api/v1/auth/logout", post(routes::auth::logout))
        .route("/api/v1/auth/reset-password", post(routes::auth::reset_password))
        .route("/api/v1/auth/verify", post(routes::auth::verify))
        .route(
            "/api/v1/auth/api-keys",
            get(routes::auth::list_api_keys).post(routes::auth::create_api_key),
        )
        .route("/api/v1/auth/api-keys/{id}", delete(routes::auth::revoke_api_key))
        .route(
            "/api/v1/auth/roles",
            get(routes::auth::list_roles).post(routes::auth::define_role),
        )
        .route(
            "/api/v1/auth/assignments",
            get(routes::auth::list_assignments).post(routes::auth::assign_role),
        )
        .route("/api/v1/auth/assignments/{user_id}", delete(routes::auth::revoke_assignment))
        .route("/api/v1/metrics", get(routes::metrics::get_metrics))
        .route("/api/v1/audit/verify", post(routes::audit::verify_audit))
        .route("/api/v1/tasks", post(routes::tasks::submit_task))
        .route("/api/v1/tasks/{id}", get(routes::tasks::get_task))
        .route("/api/v1/tasks/{id}/cancel", post(routes::tasks::cancel_task))
        .route("/ws/metrics", get(ws::metrics_ws))
        .layer(axum_middleware::from_fn_with_state(Arc::clone(&state), rbac_hook::rbac_middleware))
        .layer(axum_middleware::from_fn_with_state(Arc::clone(&state), auth_hook::auth_middleware))
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::local_network_guard))
        .layer(axum_middleware::from_fn(middleware::request_logger))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_audit::InMemoryAuditStorage;
    use aegis_auth::AuthService;
    use aegis_executor::{Executor, ExecutorConfig};
    use aegis_ratelimit::RateLimiter;
    use aegis_rbac::Rbac;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::net::SocketAddr;
    use tower::util::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let rbac = Arc::new(Rbac::new());
        let rate_limiter = Arc::new(RateLimiter::default());
        let audit = Arc::new(aegis_audit::AuditChain::new(
            Arc::new(InMemoryAuditStorage::new()),
            b"gateway-test-signing-key-long!!".to_vec(),
        ));
        let auth = Arc::new(AuthService::new(
            aegis_crypto::sha256_hex(b"admin-password"),
            "gateway-test-token-secret-32-by".to_string(),
            Arc::clone(&rate_limiter),
            Arc::clone(&audit),
        ));
        let executor = Executor::new(ExecutorConfig::default(), Arc::clone(&rbac), Arc::clone(&rate_limiter), Arc::clone(&audit));
        Arc::new(AppState::new(rbac, auth, rate_limiter, audit, executor, vec![]))
    }

    #[tokio::test]
    async fn health_is_public_and_ok() {
        let app = build_app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .extension(axum::extract::ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unauthenticated_request_to_protected_route_is_rejected() {
        let app = build_app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/metrics")
                    .extension(axum::extract::ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_local_peer_is_rejected_before_auth() {
        let app = build_app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .extension(axum::extract::ConnectInfo(SocketAddr::from(([8, 8, 8, 8], 0))))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
