// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authentication: JWT issuance with dual-key rotation grace, API key
//! lifecycle, session revocation, and password reset with generation-based
//! session invalidation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apikey;
mod blacklist;
mod jwt;
mod service;
mod user;

pub use apikey::{ApiKeyInfo, ApiKeyIssued, ApiKeyStore};
pub use blacklist::TokenBlacklist;
pub use jwt::{Claims, TokenSecrets};
pub use service::{AuthService, LoginResult, RefreshResult};
pub use user::{AuthMethod, AuthUser};
