// SPDX-License-Identifier: MIT OR Apache-2.0
//! Translates [`AegisError`] into the gateway's JSON error envelope.

use aegis_error::AegisError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Wraps an [`AegisError`] so it can be returned directly from an Axum
/// handler; every failure response is `{"error": message}` with the status
/// [`AegisError::http_status`] maps to.
pub struct ApiError(pub AegisError);

impl From<AegisError> for ApiError {
    fn from(err: AegisError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({ "error": self.0.message });
        if self.0.code == aegis_error::ErrorCode::RateLimited {
            if let Some(retry_after) = self.0.context.get("retry_after_secs") {
                body["retryAfter"] = retry_after.clone();
            }
        }
        (status, Json(body)).into_response()
    }
}
