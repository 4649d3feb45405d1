// SPDX-License-Identifier: MIT OR Apache-2.0
//! `/api/v1/tasks*` — submit, inspect, and cancel work through the bounded
//! task executor.

use crate::error::ApiError;
use crate::state::AppState;
use aegis_auth::AuthUser;
use aegis_error::{AegisError, ErrorCode};
use aegis_executor::{NewTask, SubmitContext, Task};
use axum::extract::{ConnectInfo, Extension, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;

fn submit_context(user: &AuthUser, addr: &SocketAddr, headers: &HeaderMap) -> SubmitContext {
    SubmitContext {
        user_id: user.user_id.clone(),
        role: user.role.clone(),
        ip_address: Some(addr.ip().to_string()),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// `POST /api/v1/tasks` — gated on `tasks:create`.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(new_task): Json<NewTask>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .executor
        .submit(new_task, submit_context(&user, &addr, &headers))
        .await?;
    Ok(Json(task))
}

/// `GET /api/v1/tasks/{id}` — gated on `tasks:read`.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    state
        .executor
        .get_task(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError(AegisError::new(ErrorCode::NotFound, "no such task")))
}

/// `POST /api/v1/tasks/{id}/cancel` — gated on `tasks:cancel`.
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = submit_context(&user, &addr, &headers);
    state.executor.cancel(&id, &ctx).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
