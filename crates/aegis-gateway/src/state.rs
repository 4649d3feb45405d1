// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared application state threaded through every handler and middleware
//! stage via [`axum::extract::State`], following the teacher daemon's
//! `AppState { runtime: Arc<Runtime>, .. }` convention of one `Arc`-wrapped
//! struct rather than ambient globals.

use aegis_audit::AuditChain;
use aegis_auth::AuthService;
use aegis_executor::Executor;
use aegis_ratelimit::RateLimiter;
use aegis_rbac::Rbac;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// A single outbound frame on the `/ws/metrics` broadcast channel.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsFrame {
    /// Channel this frame belongs to (currently always `"metrics"`).
    pub channel: String,
    /// Snapshot payload.
    pub payload: serde_json::Value,
    /// Per-channel monotonic sequence number; see [`AppState::next_sequence`].
    pub sequence: u64,
}

/// Everything a gateway handler or middleware stage needs, shared behind a
/// single `Arc` exactly like the teacher's `AppState`.
pub struct AppState {
    /// Fine-grained authorization engine.
    pub rbac: Arc<Rbac>,
    /// Authentication, session, and API-key service.
    pub auth: Arc<AuthService>,
    /// Sliding-window abuse limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Tamper-evident audit log.
    pub audit: Arc<AuditChain>,
    /// Bounded-concurrency task scheduler.
    pub executor: Arc<Executor>,
    /// Broadcast sender feeding every connected `/ws/metrics` client.
    pub metrics_tx: broadcast::Sender<MetricsFrame>,
    /// Per-channel monotonic sequence counters for WebSocket broadcasts.
    metrics_sequence: AtomicU64,
    /// Process start time, for `/health`'s `uptime` field.
    pub started_at: Instant,
    /// CORS origins allowed by the gateway's preflight layer.
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Construct gateway state around already-bootstrapped substrate
    /// components.
    #[must_use]
    pub fn new(
        rbac: Arc<Rbac>,
        auth: Arc<AuthService>,
        rate_limiter: Arc<RateLimiter>,
        audit: Arc<AuditChain>,
        executor: Arc<Executor>,
        cors_origins: Vec<String>,
    ) -> Self {
        let (metrics_tx, _) = broadcast::channel(256);
        Self {
            rbac,
            auth,
            rate_limiter,
            audit,
            executor,
            metrics_tx,
            metrics_sequence: AtomicU64::new(0),
            started_at: Instant::now(),
            cors_origins,
        }
    }

    /// Next sequence number for the metrics channel. Strictly monotonic,
    /// unlike a timestamp-derived sequence, which is the corrected behavior
    /// this substrate implements for WebSocket broadcasts.
    pub fn next_sequence(&self) -> u64 {
        self.metrics_sequence.fetch_add(1, Relaxed) + 1
    }

    /// Seconds since the gateway started serving.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
