// SPDX-License-Identifier: MIT OR Apache-2.0
//! `POST /api/v1/audit/verify` — on-demand chain integrity check, gated on
//! `audit:verify`.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Re-verify the entire audit chain and report the result.
pub async fn verify_audit(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let report = state.audit.verify().await?;
    Ok(Json(json!({
        "valid": report.valid,
        "entriesChecked": report.entries_checked,
        "errors": report.errors,
    })))
}
