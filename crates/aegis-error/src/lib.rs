// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the Aegis runtime.
//!
//! Every error the runtime surfaces carries an [`ErrorCode`] (a machine-readable,
//! stable string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by [`AegisError::new`]
//! to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request input failed validation.
    Validation,
    /// Caller could not be authenticated.
    Authentication,
    /// Caller was authenticated but not authorized.
    Authorization,
    /// A rate limit was exceeded.
    RateLimit,
    /// Requested resource does not exist.
    NotFound,
    /// State conflict (duplicate id, double revoke, etc).
    Conflict,
    /// Audit chain integrity failure.
    Audit,
    /// Configuration is invalid or missing.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::RateLimit => "rate_limit",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Audit => "audit",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request body or parameters failed validation.
    ValidationFailed,
    /// No credential was presented, or it was malformed.
    Unauthenticated,
    /// Credential was well-formed but wrong (bad password, bad API key).
    InvalidCredentials,
    /// Bearer token has expired or was revoked.
    TokenExpired,
    /// Bearer token failed signature verification.
    TokenInvalid,
    /// API key does not exist or its hash does not match any record.
    ApiKeyInvalid,
    /// API key exists but has been revoked.
    ApiKeyRevoked,
    /// Caller is authenticated but lacks the required permission.
    Forbidden,
    /// Sliding-window rate limit exceeded.
    RateLimited,
    /// Requested entity does not exist.
    NotFound,
    /// No handler is registered for the requested task type.
    NoHandler,
    /// Conflicting state change (duplicate id, already revoked, etc).
    Conflict,
    /// Audit chain failed verification (broken hash link or bad signature).
    ChainBroken,
    /// Configuration is invalid or a required setting is missing.
    ConfigInvalid,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationFailed => ErrorCategory::Validation,

            Self::Unauthenticated
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::ApiKeyInvalid
            | Self::ApiKeyRevoked => ErrorCategory::Authentication,

            Self::Forbidden => ErrorCategory::Authorization,

            Self::RateLimited => ErrorCategory::RateLimit,

            Self::NotFound | Self::NoHandler => ErrorCategory::NotFound,

            Self::Conflict => ErrorCategory::Conflict,

            Self::ChainBroken => ErrorCategory::Audit,

            Self::ConfigInvalid => ErrorCategory::Config,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"VALIDATION_FAILED"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::ApiKeyInvalid => "API_KEY_INVALID",
            Self::ApiKeyRevoked => "API_KEY_REVOKED",
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotFound => "NOT_FOUND",
            Self::NoHandler => "NO_HANDLER",
            Self::Conflict => "CONFLICT",
            Self::ChainBroken => "CHAIN_BROKEN",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP status code this error maps to at the gateway edge.
    ///
    /// Kept here rather than in the gateway crate so every caller sees the
    /// same status for a given code, whether or not it goes through HTTP.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationFailed => 400,
            Self::Unauthenticated
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::ApiKeyInvalid
            | Self::ApiKeyRevoked => 401,
            Self::Forbidden => 403,
            Self::NotFound | Self::NoHandler => 404,
            Self::Conflict => 409,
            Self::RateLimited => 429,
            Self::ChainBroken | Self::ConfigInvalid | Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AegisError
// ---------------------------------------------------------------------------

/// Unified runtime error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Examples
///
/// ```
/// use aegis_error::{AegisError, ErrorCode};
///
/// let err = AegisError::new(ErrorCode::RateLimited, "too many login attempts")
///     .with_context("rule", "auth_attempts")
///     .with_context("retry_after_secs", 900);
/// ```
pub struct AegisError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl AegisError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Shorthand for `self.code.http_status()`.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Debug for AegisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("AegisError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for AegisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AegisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of an [`AegisError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AegisErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&AegisError> for AegisErrorDto {
    fn from(err: &AegisError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<AegisErrorDto> for AegisError {
    fn from(dto: AegisErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
