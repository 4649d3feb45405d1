// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sliding-window-by-bucket rate limiter.
//!
//! Each `(rule, key_type, key)` triple owns an independent window. Checking
//! a window resets it once its age exceeds the rule's configured duration,
//! matching the reset-on-expiry (rather than true rolling) sliding window
//! described for this runtime.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use aegis_error::{AegisError, ErrorCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Which identity space a rule's key is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Keyed by client IP address.
    Ip,
    /// Keyed by authenticated user id.
    User,
    /// Keyed by API key id.
    ApiKey,
    /// One shared window for every caller.
    Global,
}

impl KeyType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::User => "user",
            Self::ApiKey => "api_key",
            Self::Global => "global",
        }
    }
}

/// What happens once a rule's window is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExceed {
    /// Deny the request.
    Reject,
    /// Allow the request but flag it for throttled/delayed processing.
    Delay,
    /// Allow the request; only log the violation.
    LogOnly,
}

/// A single sliding-window rule.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    /// Unique rule name, used as part of the window key.
    pub name: String,
    /// Window duration.
    pub window: Duration,
    /// Maximum requests allowed per window.
    pub max_requests: u32,
    /// Identity space the key is drawn from.
    pub key_type: KeyType,
    /// Behavior once the window is exhausted.
    pub on_exceed: OnExceed,
}

impl RateLimitRule {
    /// Construct a rule directly.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        window: Duration,
        max_requests: u32,
        key_type: KeyType,
        on_exceed: OnExceed,
    ) -> Self {
        Self {
            name: name.into(),
            window,
            max_requests,
            key_type,
            on_exceed,
        }
    }
}

/// Outcome of a single [`RateLimiter::check`] call.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests remaining in the current window (0 if denied and not
    /// `log_only`).
    pub remaining: u32,
    /// When the current window resets.
    pub reset_at: Instant,
    /// Seconds the caller should wait before retrying, if denied.
    pub retry_after_secs: Option<u64>,
}

struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// Snapshot statistics for a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    /// Number of windows currently tracked.
    pub active_windows: usize,
    /// Names of every configured rule.
    pub rules: Vec<String>,
    /// Total requests rejected (or flagged, for `log_only`) since start.
    pub total_hits: u64,
    /// Total checks performed since start.
    pub total_checks: u64,
}

/// The default windowed rules every gateway ships with.
#[must_use]
pub fn default_rules() -> Vec<RateLimitRule> {
    vec![
        RateLimitRule::new(
            "api_requests",
            Duration::from_secs(60),
            100,
            KeyType::User,
            OnExceed::Reject,
        ),
        RateLimitRule::new(
            "auth_attempts",
            Duration::from_secs(900),
            5,
            KeyType::Ip,
            OnExceed::Reject,
        ),
        RateLimitRule::new(
            "task_creation",
            Duration::from_secs(60),
            20,
            KeyType::User,
            OnExceed::Reject,
        ),
        RateLimitRule::new(
            "expensive_operations",
            Duration::from_secs(3600),
            10,
            KeyType::User,
            OnExceed::Reject,
        ),
    ]
}

/// Sliding-window rate limiter over multiple named rules and key spaces.
pub struct RateLimiter {
    rules: HashMap<String, RateLimitRule>,
    windows: Mutex<HashMap<(String, String, String), WindowEntry>>,
    total_hits: AtomicU64,
    total_checks: AtomicU64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_rules(default_rules())
    }
}

impl RateLimiter {
    /// Construct a limiter seeded with the given rules.
    #[must_use]
    pub fn with_rules(rules: Vec<RateLimitRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.name.clone(), r)).collect(),
            windows: Mutex::new(HashMap::new()),
            total_hits: AtomicU64::new(0),
            total_checks: AtomicU64::new(0),
        }
    }

    /// Register or replace a rule.
    pub fn add_rule(&mut self, rule: RateLimitRule) {
        self.rules.insert(rule.name.clone(), rule);
    }

    /// Check and, if allowed, consume one slot of `rule_name`'s window for
    /// `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::NotFound`] if `rule_name` is not registered.
    pub fn check(&self, rule_name: &str, key: &str) -> Result<CheckResult, AegisError> {
        let rule = self.rules.get(rule_name).ok_or_else(|| {
            AegisError::new(ErrorCode::NotFound, "rate limit rule not registered")
                .with_context("rule", rule_name)
        })?;

        self.total_checks.fetch_add(1, Relaxed);
        let now = Instant::now();
        let window_key = (rule.name.clone(), rule.key_type.as_str().to_string(), key.to_string());
        let mut windows = self.windows.lock().expect("ratelimit lock poisoned");

        let entry = windows.entry(window_key).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= rule.window {
            entry.count = 0;
            entry.window_start = now;
        }

        let reset_at = entry.window_start + rule.window;

        if entry.count < rule.max_requests {
            entry.count += 1;
            return Ok(CheckResult {
                allowed: true,
                remaining: rule.max_requests - entry.count,
                reset_at,
                retry_after_secs: None,
            });
        }

        self.total_hits.fetch_add(1, Relaxed);
        warn!(rule = rule_name, key, "rate limit exceeded");

        match rule.on_exceed {
            OnExceed::LogOnly => {
                entry.count += 1;
                Ok(CheckResult {
                    allowed: true,
                    remaining: 0,
                    reset_at,
                    retry_after_secs: None,
                })
            }
            OnExceed::Reject | OnExceed::Delay => {
                let retry_after = reset_at.saturating_duration_since(now).as_secs().max(1);
                Ok(CheckResult {
                    allowed: rule.on_exceed == OnExceed::Delay,
                    remaining: 0,
                    reset_at,
                    retry_after_secs: Some(retry_after),
                })
            }
        }
    }

    /// Check every rule in `checks` (`(rule_name, key)` pairs); returns the
    /// first blocking result encountered, or the most restrictive (lowest
    /// `remaining`) allowing result if every rule allows.
    ///
    /// # Errors
    ///
    /// Propagates [`ErrorCode::NotFound`] from an unregistered rule name.
    pub fn check_multiple(&self, checks: &[(&str, &str)]) -> Result<CheckResult, AegisError> {
        let mut most_restrictive: Option<CheckResult> = None;
        for (rule_name, key) in checks {
            let result = self.check(rule_name, key)?;
            if !result.allowed {
                return Ok(result);
            }
            match &most_restrictive {
                Some(current) if current.remaining <= result.remaining => {}
                _ => most_restrictive = Some(result),
            }
        }
        most_restrictive.ok_or_else(|| {
            AegisError::new(ErrorCode::ValidationFailed, "no rate limit checks supplied")
        })
    }

    /// Remove windows that have fully expired. Intended to run periodically
    /// from a background sweeper so the window map doesn't grow unbounded.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("ratelimit lock poisoned");
        let before = windows.len();
        windows.retain(|(rule_name, _, _), entry| {
            let window = self
                .rules
                .get(rule_name)
                .map(|r| r.window)
                .unwrap_or_default();
            now.duration_since(entry.window_start) < window
        });
        let removed = before - windows.len();
        if removed > 0 {
            info!(removed, "rate limiter swept expired windows");
        }
    }

    /// Snapshot current statistics.
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            active_windows: self.windows.lock().expect("ratelimit lock poisoned").len(),
            rules: self.rules.keys().cloned().collect(),
            total_hits: self.total_hits.load(Relaxed),
            total_checks: self.total_checks.load(Relaxed),
        }
    }

    /// Spawn a background task that sweeps expired windows every `interval`.
    /// The task runs until the returned handle is dropped/aborted or the
    /// runtime shuts down.
    pub fn spawn_sweeper(
        self: std::sync::Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::with_rules(vec![RateLimitRule::new(
            "auth_attempts",
            Duration::from_secs(900),
            5,
            KeyType::Ip,
            OnExceed::Reject,
        )])
    }

    #[tokio::test(start_paused = true)]
    async fn allows_up_to_max_then_rejects() {
        let rl = limiter();
        for _ in 0..5 {
            let r = rl.check("auth_attempts", "1.2.3.4").unwrap();
            assert!(r.allowed);
        }
        let sixth = rl.check("auth_attempts", "1.2.3.4").unwrap();
        assert!(!sixth.allowed);
        assert!(sixth.retry_after_secs.unwrap() <= 900);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_expiry() {
        let rl = limiter();
        for _ in 0..5 {
            rl.check("auth_attempts", "1.2.3.4").unwrap();
        }
        assert!(!rl.check("auth_attempts", "1.2.3.4").unwrap().allowed);

        tokio::time::advance(Duration::from_secs(901)).await;

        let allowed_again = rl.check("auth_attempts", "1.2.3.4").unwrap();
        assert!(allowed_again.allowed);

        let stats = rl.stats();
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.total_checks, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_have_independent_windows() {
        let rl = limiter();
        for _ in 0..5 {
            rl.check("auth_attempts", "1.2.3.4").unwrap();
        }
        assert!(!rl.check("auth_attempts", "1.2.3.4").unwrap().allowed);
        assert!(rl.check("auth_attempts", "9.9.9.9").unwrap().allowed);
    }

    #[test]
    fn unknown_rule_returns_not_found() {
        let rl = limiter();
        let err = rl.check("nope", "k").unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn log_only_rules_never_block() {
        let rl = RateLimiter::with_rules(vec![RateLimitRule::new(
            "noisy",
            Duration::from_secs(60),
            2,
            KeyType::Global,
            OnExceed::LogOnly,
        )]);
        for _ in 0..10 {
            let r = rl.check("noisy", "shared").unwrap();
            assert!(r.allowed);
        }
        assert_eq!(rl.stats().total_hits, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_windows() {
        let rl = limiter();
        rl.check("auth_attempts", "1.2.3.4").unwrap();
        assert_eq!(rl.stats().active_windows, 1);
        tokio::time::advance(Duration::from_secs(901)).await;
        rl.sweep();
        assert_eq!(rl.stats().active_windows, 0);
    }

    #[test]
    fn default_rules_cover_expected_names() {
        let rl = RateLimiter::default();
        let mut names = rl.stats().rules;
        names.sort();
        assert_eq!(
            names,
            vec!["api_requests", "auth_attempts", "expensive_operations", "task_creation"]
        );
    }

    #[test]
    fn check_multiple_returns_most_restrictive_allowing_result() {
        let rl = RateLimiter::with_rules(vec![
            RateLimitRule::new("loose", Duration::from_secs(60), 100, KeyType::User, OnExceed::Reject),
            RateLimitRule::new("tight", Duration::from_secs(60), 2, KeyType::User, OnExceed::Reject),
        ]);
        // Exhaust one slot of "tight" so its remaining (1) is lower than
        // "loose"'s remaining (99), even though "tight" is checked first.
        rl.check("tight", "user-1").unwrap();

        let result = rl.check_multiple(&[("loose", "user-1"), ("tight", "user-1")]).unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[test]
    fn check_multiple_ignores_order_of_restrictive_rule() {
        let rl = RateLimiter::with_rules(vec![
            RateLimitRule::new("tight", Duration::from_secs(60), 2, KeyType::User, OnExceed::Reject),
            RateLimitRule::new("loose", Duration::from_secs(60), 100, KeyType::User, OnExceed::Reject),
        ]);
        rl.check("tight", "user-2").unwrap();

        // Checked in the opposite order from the previous test — the
        // restrictive rule's result must still win regardless of position.
        let result = rl.check_multiple(&[("tight", "user-2"), ("loose", "user-2")]).unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
    }
}
