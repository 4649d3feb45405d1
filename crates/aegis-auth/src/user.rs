// SPDX-License-Identifier: MIT OR Apache-2.0
use serde::{Deserialize, Serialize};

/// How an [`AuthUser`] was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Authenticated via a `Bearer` JWT.
    Bearer,
    /// Authenticated via an `X-Api-Key` header.
    ApiKey,
    /// Authenticated via an mTLS peer certificate.
    Certificate,
}

/// The identity resolved for an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Authentication method used.
    pub auth_method: AuthMethod,
    /// Resolved user id.
    pub user_id: String,
    /// Resolved role id.
    pub role: String,
    /// Token id, present only for [`AuthMethod::Bearer`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Token expiry (unix seconds), present only for [`AuthMethod::Bearer`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}
