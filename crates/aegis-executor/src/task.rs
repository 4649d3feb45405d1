// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::resources::TaskResources;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted and queued, not yet handed to a handler.
    Pending,
    /// A handler is currently executing it.
    Running,
    /// The handler returned successfully.
    Completed,
    /// The handler returned an error.
    Failed,
    /// `timeout_ms` elapsed before the handler finished.
    Timeout,
    /// Cancelled, either by an operator or executor shutdown.
    Cancelled,
}

impl TaskStatus {
    /// `true` once a task can never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled)
    }
}

/// Caller identity and scoping carried alongside a task for its whole
/// lifecycle, independent of the submitting connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Acting user id.
    pub user_id: String,
    /// Resolved role at submission time.
    pub role: String,
    /// Originating IP, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Originating user agent, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// `"resource:action"` strings for every permission the submit-time
    /// gate evaluated (and granted) against this task's handler.
    #[serde(default)]
    pub permissions_used: Vec<String>,
}

/// A structured error surfaced on task failure, timeout, or cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    /// Short machine-readable code (e.g. `"TIMEOUT"`, `"CANCELLED"`).
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Whether retrying the same task is expected to help.
    #[serde(default)]
    pub recoverable: bool,
}

impl TaskError {
    /// Construct a non-recoverable error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recoverable: false,
        }
    }

    /// Mark this error as recoverable (retrying may succeed).
    #[must_use]
    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }
}

/// Outcome recorded once a task reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// `true` iff the handler completed without error, timeout, or cancel.
    pub success: bool,
    /// Handler output, present only on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Failure detail, present whenever `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

/// A caller's request to run a task, before the executor assigns identity
/// and bookkeeping fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    /// Registered handler key this task runs under.
    pub task_type: String,
    /// Short display name.
    #[serde(default)]
    pub name: String,
    /// Longer human-readable description.
    #[serde(default)]
    pub description: String,
    /// Handler-specific input payload.
    #[serde(default)]
    pub input: serde_json::Value,
    /// Deadline in milliseconds; falls back to the executor's configured
    /// default when unset.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Caller-supplied correlation id; a fresh one is minted when unset.
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Id of a task that logically spawned this one, for building a trace.
    #[serde(default)]
    pub parent_task_id: Option<String>,
}

/// A submitted unit of work, tracked through its full lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// UUID v7 identifier, time-sortable.
    pub id: String,
    /// Correlation id shared by related audit entries and child tasks.
    pub correlation_id: String,
    /// Id of the task that spawned this one, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    /// Registered handler key.
    pub task_type: String,
    /// Short display name.
    pub name: String,
    /// Longer human-readable description.
    pub description: String,
    /// SHA-256 hex of the canonicalized input payload, kept instead of the
    /// raw input so task records stay small and never leak handler secrets.
    pub input_hash: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Submission time, ms since epoch.
    pub created_at: i64,
    /// When a handler began executing it, ms since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// When it reached a terminal state, ms since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// `completed_at - started_at`, once both are known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Deadline enforced against `started_at`.
    pub timeout_ms: u64,
    /// Caller identity this task runs under.
    pub security_context: SecurityContext,
    /// Terminal outcome, present once `status.is_terminal()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Resource usage snapshot, present once `status.is_terminal()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<TaskResources>,
}

impl aegis_queue::Identified for Task {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_terminal_statuses_report_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn task_error_builder_marks_recoverable() {
        let err = TaskError::new("UPSTREAM_TIMEOUT", "backend did not respond").recoverable();
        assert!(err.recoverable);
        assert_eq!(err.code, "UPSTREAM_TIMEOUT");
    }
}
