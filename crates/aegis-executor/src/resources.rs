// SPDX-License-Identifier: MIT OR Apache-2.0
//! Best-effort per-task resource accounting.
//!
//! A [`TaskHandler`](crate::TaskHandler) reports usage into a
//! [`ResourceTracker`] as it runs; the executor snapshots it into the task's
//! [`TaskResources`] once the task reaches a terminal state. Nothing here
//! enforces a cap — deadlines are handled separately by the executor's
//! timeout race — this is accounting, not a budget gate.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering::Relaxed};

/// Resource usage recorded for a single task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResources {
    /// Tokens consumed (prompt + completion combined), if applicable.
    pub tokens_used: u64,
    /// Cost in integer micro-dollars (1 USD = 1_000_000).
    pub cost_micro: u64,
    /// Number of handler-defined turns/iterations performed.
    pub turns_used: u32,
}

/// Thread-safe accumulator a handler records usage into while it runs.
#[derive(Default)]
pub struct ResourceTracker {
    tokens_used: AtomicU64,
    cost_micro: AtomicU64,
    turns_used: AtomicU32,
}

impl ResourceTracker {
    /// Construct a tracker with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` additional tokens consumed.
    pub fn record_tokens(&self, count: u64) {
        self.tokens_used.fetch_add(count, Relaxed);
    }

    /// Record an additional cost increment in USD.
    pub fn record_cost(&self, amount_usd: f64) {
        let micros = (amount_usd * 1_000_000.0) as u64;
        self.cost_micro.fetch_add(micros, Relaxed);
    }

    /// Record one handler turn/iteration.
    pub fn record_turn(&self) {
        self.turns_used.fetch_add(1, Relaxed);
    }

    /// Snapshot current usage.
    #[must_use]
    pub fn snapshot(&self) -> TaskResources {
        TaskResources {
            tokens_used: self.tokens_used.load(Relaxed),
            cost_micro: self.cost_micro.load(Relaxed),
            turns_used: self.turns_used.load(Relaxed),
        }
    }
}
