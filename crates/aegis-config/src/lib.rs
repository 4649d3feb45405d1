// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-driven settings for the Aegis runtime.
//!
//! This crate provides [`Settings`] — the top-level runtime configuration —
//! loaded from environment variables and validated eagerly so that
//! misconfiguration fails at process start rather than surfacing later as a
//! confusing runtime error. Parsing arbitrary config file formats is a
//! separate, out-of-scope concern; this crate only reads `std::env`.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::env::VarError;

/// Errors that can occur while loading or validating [`Settings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {name}")]
    Missing {
        /// Name of the missing variable.
        name: String,
    },

    /// An environment variable was present but not valid UTF-8.
    #[error("environment variable {name} is not valid UTF-8")]
    NotUnicode {
        /// Name of the offending variable.
        name: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("settings validation failed: {reasons:?}")]
    Invalid {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory-level issues that do not prevent startup but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// An optional variable was not set; a default was used.
    UsingDefault {
        /// Name of the variable.
        field: String,
        /// The default value substituted.
        default: String,
    },
    /// A security-sensitive value looks weak (too short, too common).
    WeakSecret {
        /// Name of the variable.
        field: String,
        /// Human-readable explanation.
        hint: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::UsingDefault { field, default } => {
                write!(f, "'{field}' not set, using default '{default}'")
            }
            ConfigWarning::WeakSecret { field, hint } => {
                write!(f, "'{field}' looks weak: {hint}")
            }
        }
    }
}

/// Minimum byte length required for signing secrets.
pub const MIN_SECRET_BYTES: usize = 32;

/// Top-level runtime configuration for the Aegis gateway.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HMAC signing secret for issuing/validating JWTs.
    pub token_secret: String,
    /// SHA-256 hash of the admin password (hex-encoded).
    pub admin_password_hash: String,
    /// HMAC signing key for the audit chain.
    pub audit_signing_key: String,
    /// Host the gateway binds to. Defaults to `127.0.0.1`.
    pub bind_host: String,
    /// Port the gateway binds to. Defaults to `8080`.
    pub bind_port: u16,
    /// Optional Redis URL backing the rate limiter.
    pub redis_url: Option<String>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
}

fn read_var(name: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(name) {
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { name: name.into() }),
    }
}

impl Settings {
    /// Load settings from the process environment, collecting warnings for
    /// anything defaulted or that looks weak.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if a required variable is absent, or
    /// [`ConfigError::Invalid`] if present values fail validation (e.g. a
    /// secret shorter than [`MIN_SECRET_BYTES`]).
    pub fn load() -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let mut warnings = Vec::new();

        let token_secret = read_var("AEGIS_TOKEN_SECRET")?.ok_or_else(|| ConfigError::Missing {
            name: "AEGIS_TOKEN_SECRET".into(),
        })?;
        let admin_password_hash =
            read_var("AEGIS_ADMIN_PASSWORD_HASH")?.ok_or_else(|| ConfigError::Missing {
                name: "AEGIS_ADMIN_PASSWORD_HASH".into(),
            })?;
        let audit_signing_key =
            read_var("AEGIS_AUDIT_SIGNING_KEY")?.ok_or_else(|| ConfigError::Missing {
                name: "AEGIS_AUDIT_SIGNING_KEY".into(),
            })?;

        let bind_host = match read_var("AEGIS_BIND_HOST")? {
            Some(v) => v,
            None => {
                warnings.push(ConfigWarning::UsingDefault {
                    field: "AEGIS_BIND_HOST".into(),
                    default: "127.0.0.1".into(),
                });
                "127.0.0.1".into()
            }
        };

        let bind_port = match read_var("AEGIS_BIND_PORT")? {
            Some(v) => v.parse::<u16>().map_err(|_| ConfigError::Invalid {
                reasons: vec![format!("AEGIS_BIND_PORT is not a valid port: {v}")],
            })?,
            None => {
                warnings.push(ConfigWarning::UsingDefault {
                    field: "AEGIS_BIND_PORT".into(),
                    default: "8080".into(),
                });
                8080
            }
        };

        let redis_url = read_var("AEGIS_REDIS_URL")?;

        let cors_origins = read_var("AEGIS_CORS_ORIGINS")?
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let settings = Self {
            token_secret,
            admin_password_hash,
            audit_signing_key,
            bind_host,
            bind_port,
            redis_url,
            cors_origins,
        };

        let mut reasons = Vec::new();
        settings.validate(&mut reasons, &mut warnings);
        if !reasons.is_empty() {
            return Err(ConfigError::Invalid { reasons });
        }

        Ok((settings, warnings))
    }

    fn validate(&self, reasons: &mut Vec<String>, warnings: &mut Vec<ConfigWarning>) {
        if self.token_secret.len() < MIN_SECRET_BYTES {
            reasons.push(format!(
                "AEGIS_TOKEN_SECRET must be at least {MIN_SECRET_BYTES} bytes"
            ));
        }
        if self.audit_signing_key.len() < MIN_SECRET_BYTES {
            reasons.push(format!(
                "AEGIS_AUDIT_SIGNING_KEY must be at least {MIN_SECRET_BYTES} bytes"
            ));
        }
        if self.admin_password_hash.len() != 64
            || !self
                .admin_password_hash
                .chars()
                .all(|c| c.is_ascii_hexdigit())
        {
            reasons.push("AEGIS_ADMIN_PASSWORD_HASH must be a 64-character hex SHA-256 digest".into());
        }
        if !matches!(self.bind_host.as_str(), "127.0.0.1" | "::1" | "localhost") {
            warnings.push(ConfigWarning::WeakSecret {
                field: "AEGIS_BIND_HOST".into(),
                hint: "gateway is intended for local-network operation only".into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for k in [
            "AEGIS_TOKEN_SECRET",
            "AEGIS_ADMIN_PASSWORD_HASH",
            "AEGIS_AUDIT_SIGNING_KEY",
            "AEGIS_BIND_HOST",
            "AEGIS_BIND_PORT",
            "AEGIS_REDIS_URL",
            "AEGIS_CORS_ORIGINS",
        ] {
            unsafe { std::env::remove_var(k) };
        }
    }

    fn set_minimal_valid_env() {
        unsafe {
            std::env::set_var("AEGIS_TOKEN_SECRET", "a".repeat(32));
            std::env::set_var("AEGIS_ADMIN_PASSWORD_HASH", "a".repeat(64));
            std::env::set_var("AEGIS_AUDIT_SIGNING_KEY", "b".repeat(32));
        }
    }

    #[test]
    #[serial]
    fn missing_required_var_is_reported() {
        clear_env();
        let err = Settings::load().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name } if name == "AEGIS_TOKEN_SECRET"));
    }

    #[test]
    #[serial]
    fn defaults_are_applied_with_warning() {
        clear_env();
        set_minimal_valid_env();
        let (settings, warnings) = Settings::load().unwrap();
        assert_eq!(settings.bind_host, "127.0.0.1");
        assert_eq!(settings.bind_port, 8080);
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::UsingDefault { field, .. } if field == "AEGIS_BIND_HOST"
        )));
    }

    #[test]
    #[serial]
    fn short_secret_is_rejected() {
        clear_env();
        set_minimal_valid_env();
        unsafe { std::env::set_var("AEGIS_TOKEN_SECRET", "too-short") };
        let err = Settings::load().unwrap_err();
        match err {
            ConfigError::Invalid { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("AEGIS_TOKEN_SECRET")));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
        clear_env();
    }

    #[test]
    #[serial]
    fn malformed_password_hash_is_rejected() {
        clear_env();
        set_minimal_valid_env();
        unsafe { std::env::set_var("AEGIS_ADMIN_PASSWORD_HASH", "not-hex") };
        let err = Settings::load().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        clear_env();
    }

    #[test]
    #[serial]
    fn cors_origins_split_and_trimmed() {
        clear_env();
        set_minimal_valid_env();
        unsafe {
            std::env::set_var(
                "AEGIS_CORS_ORIGINS",
                "https://a.example, https://b.example,",
            )
        };
        let (settings, _) = Settings::load().unwrap();
        assert_eq!(
            settings.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        clear_env();
    }
}
