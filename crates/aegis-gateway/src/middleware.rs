// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request-lifecycle middleware: request ids, structured logging, the
//! local-network guard, and CORS — the same triad the teacher daemon wires
//! ahead of every route, adapted from its `request_id_middleware`,
//! `RequestLogger`, and `CorsConfig`.

use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request extension carrying this request's id, set by
/// [`request_id_middleware`] and read back by [`RequestLogger`]-equivalent
/// logging and any handler that wants to echo it.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub uuid::Uuid);

/// Stamp every request with a fresh id and echo it on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(uuid::Uuid::now_v7());
    req.extensions_mut().insert(id);
    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Log method, path, status, and duration for every request at `info`,
/// mirroring the teacher's `RequestLogger` middleware.
pub async fn request_logger(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let res = next.run(req).await;
    tracing::info!(
        target: "aegis.gateway",
        http.method = %method,
        http.path = %path,
        http.status = res.status().as_u16(),
        http.duration_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );
    res
}

fn is_local_network(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4 == Ipv4Addr::LOCALHOST
                || v4.octets()[0] == 10
                || (v4.octets()[0] == 172 && (16..=31).contains(&v4.octets()[1]))
                || (v4.octets()[0] == 192 && v4.octets()[1] == 168)
        }
        IpAddr::V6(v6) => v6 == Ipv6Addr::LOCALHOST,
    }
}

/// Reject any peer whose address is not in the local/private network
/// ranges the gateway is meant to serve.
pub async fn local_network_guard(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if !is_local_network(addr.ip()) {
        return (
            StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({ "error": "peer is outside the permitted network range" })),
        )
            .into_response();
    }
    next.run(req).await
}

/// Builds the [`CorsLayer`] for the configured allowed origins, following
/// the teacher's `CorsConfig::to_cors_layer`.
#[must_use]
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::list(Vec::<HeaderValue>::new())
    } else {
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-api-key"),
        ]))
}
