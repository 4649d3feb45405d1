// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cooperative cancellation for in-flight tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A cloneable, cheaply-shareable token used to signal cancellation.
///
/// All clones share the same underlying state: cancelling one immediately
/// makes every clone observe `is_cancelled() == true`.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token that is **not** cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` if [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// A future that resolves once the token is cancelled; resolves
    /// immediately if it already is.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            self.inner.notify.notified().await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a task run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// An operator called [`crate::Executor::cancel`].
    UserRequested,
    /// The task's `timeout_ms` deadline elapsed.
    Timeout,
    /// The executor is shutting down and abandoned in-flight work.
    ExecutorShutdown,
}

/// Wraps a [`CancellationToken`] together with the first reason given for
/// cancelling it, so a caller can both cancel the run and later inspect why.
#[derive(Clone)]
pub struct CancellableRun {
    token: CancellationToken,
    reason: Arc<std::sync::Mutex<Option<CancellationReason>>>,
}

impl CancellableRun {
    /// Wrap `token`, starting with no recorded reason.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Cancel the run. Only the first reason across repeated calls is kept.
    pub fn cancel(&self, reason: CancellationReason) {
        let mut guard = self.reason.lock().expect("reason lock poisoned");
        if guard.is_none() {
            *guard = Some(reason);
        }
        drop(guard);
        self.token.cancel();
    }

    /// The recorded cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<CancellationReason> {
        *self.reason.lock().expect("reason lock poisoned")
    }

    /// `true` if this run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The underlying token, for racing against in `tokio::select!`.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
