// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::cancel::CancellationToken;
use crate::resources::ResourceTracker;
use crate::task::{Task, TaskError};
use async_trait::async_trait;
use std::sync::Arc;

/// Per-run state handed to a [`TaskHandler`]: identity, resource accounting,
/// and the cooperative cancellation signal it must race against.
pub struct ExecutionContext {
    /// Acting user id (from [`crate::Task::security_context`]).
    pub user_id: String,
    /// Correlation id shared with this task's audit entries.
    pub correlation_id: String,
    /// Resource accounting the handler may report usage into.
    pub resources: Arc<ResourceTracker>,
    /// Signalled when the task is cancelled or its deadline elapses; a
    /// well-behaved handler should poll or select on this rather than run
    /// unboundedly, though the executor enforces the deadline regardless.
    pub cancellation: CancellationToken,
}

/// A single resource/action grant a caller must hold before the executor
/// will submit to, or cancel, a task run under a given [`TaskHandler`].
///
/// Checked with the same semantics as [`aegis_rbac::Permission`] resource
/// matching (literal, `"*"`, or `prefix*`); unlike a granted `Permission`,
/// each entry names exactly one action, since the executor checks it
/// against a single fixed operation rather than resolving it against a
/// caller-supplied one.
#[derive(Debug, Clone)]
pub struct RequiredPermission {
    /// Resource checked via [`aegis_rbac::Rbac::require_permission`].
    pub resource: String,
    /// Action checked alongside `resource`.
    pub action: String,
}

impl RequiredPermission {
    /// Construct a required `{resource, action}` grant.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self { resource: resource.into(), action: action.into() }
    }
}

/// Executes one `task_type`'s work.
///
/// Implementations are looked up by [`crate::Task::task_type`] in the
/// executor's handler registry; only one handler may be registered per type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task to completion (or until cancelled).
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] describing why the task failed; the executor
    /// records it verbatim on the task's terminal [`crate::TaskResult`].
    async fn execute(&self, task: &Task, ctx: &ExecutionContext) -> Result<serde_json::Value, TaskError>;

    /// Permissions the submitting caller must hold, checked in declaration
    /// order with first-denial-wins, before the executor enqueues a task of
    /// this handler's type. [`crate::Executor::cancel`] re-checks the same
    /// resources against the `"cancel"` action.
    fn required_permissions(&self) -> Vec<RequiredPermission>;
}
