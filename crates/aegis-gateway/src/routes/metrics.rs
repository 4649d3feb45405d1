// SPDX-License-Identifier: MIT OR Apache-2.0
//! `GET /api/v1/metrics` — operational snapshot, gated on `metrics:read`.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the executor/rate-limiter snapshot shared by the `GET` route and
/// the `/ws/metrics` ticker broadcast, so both report identical shapes.
pub async fn snapshot(state: &AppState) -> Value {
    let executor_stats = state.executor.stats().await;
    let limiter_stats = state.rate_limiter.stats();
    json!({
        "executor": {
            "active": executor_stats.active,
            "queued": executor_stats.queued,
            "maxConcurrent": executor_stats.max_concurrent,
        },
        "security": {
            "rateLimiterHits": limiter_stats.total_hits,
            "rateLimiterChecks": limiter_stats.total_checks,
        },
    })
}

/// Report executor, rate-limiter, and audit-chain counters.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(snapshot(&state).await)
}
