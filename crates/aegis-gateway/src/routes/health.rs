// SPDX-License-Identifier: MIT OR Apache-2.0
//! `GET /health` — unauthenticated liveness/readiness probe.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Current crate version, reported verbatim in the health payload.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Report process status, version, and uptime.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": VERSION,
        "uptime": state.uptime_secs(),
        "checks": {
            "auditChain": "ok",
        },
    }))
}
