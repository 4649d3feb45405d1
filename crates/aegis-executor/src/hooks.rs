// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle hooks for executor extensibility.
//!
//! Register an [`ExecutorHook`] implementation to observe task lifecycle
//! transitions without modifying the executor's pump loop.

use crate::task::Task;

/// Extension point called at well-defined moments in a task's lifecycle.
///
/// All methods have default no-op implementations so a hook only needs to
/// override the callbacks it cares about.
pub trait ExecutorHook: Send + Sync {
    /// Called once a task has been accepted, assigned an id, and enqueued.
    fn on_task_created(&self, _task: &Task) {}

    /// Called when a handler begins executing the task.
    fn on_task_started(&self, _task: &Task) {}

    /// Called once the task reaches any terminal state.
    fn on_task_finished(&self, _task: &Task) {}

    /// Human-readable name used in logging/diagnostics.
    fn name(&self) -> &str;
}

/// Ordered collection of [`ExecutorHook`]s, fired in registration order.
pub struct HookRegistry {
    hooks: Vec<Box<dyn ExecutorHook>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook. Hooks fire in the order they are registered.
    pub fn register(&mut self, hook: Box<dyn ExecutorHook>) {
        self.hooks.push(hook);
    }

    /// Fire [`ExecutorHook::on_task_created`] on every registered hook.
    pub fn fire_task_created(&self, task: &Task) {
        for h in &self.hooks {
            h.on_task_created(task);
        }
    }

    /// Fire [`ExecutorHook::on_task_started`] on every registered hook.
    pub fn fire_task_started(&self, task: &Task) {
        for h in &self.hooks {
            h.on_task_started(task);
        }
    }

    /// Fire [`ExecutorHook::on_task_finished`] on every registered hook.
    pub fn fire_task_finished(&self, task: &Task) {
        for h in &self.hooks {
            h.on_task_finished(task);
        }
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Names of all registered hooks, in registration order.
    #[must_use]
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs lifecycle transitions via `tracing`.
pub struct LoggingHook;

impl ExecutorHook for LoggingHook {
    fn on_task_created(&self, task: &Task) {
        tracing::info!(target: "aegis.executor", task_id = %task.id, task_type = %task.task_type, "task created");
    }

    fn on_task_started(&self, task: &Task) {
        tracing::debug!(target: "aegis.executor", task_id = %task.id, "task started");
    }

    fn on_task_finished(&self, task: &Task) {
        tracing::info!(
            target: "aegis.executor",
            task_id = %task.id,
            status = ?task.status,
            duration_ms = task.duration_ms,
            "task finished"
        );
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SecurityContext, TaskStatus};
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
    use std::sync::Arc;

    fn sample_task() -> Task {
        Task {
            id: "task_1".into(),
            correlation_id: "corr_1".into(),
            parent_task_id: None,
            task_type: "demo".into(),
            name: "demo".into(),
            description: String::new(),
            input_hash: "h".into(),
            status: TaskStatus::Pending,
            created_at: 0,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            timeout_ms: 1000,
            security_context: SecurityContext {
                user_id: "user_1".into(),
                role: "role_operator".into(),
                ip_address: None,
                user_agent: None,
            },
            result: None,
            resources: None,
        }
    }

    struct CountingHook {
        created: Arc<AtomicUsize>,
    }

    impl ExecutorHook for CountingHook {
        fn on_task_created(&self, _task: &Task) {
            self.created.fetch_add(1, Relaxed);
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn hooks_fire_in_registration_order_and_count() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();
        registry.register(Box::new(LoggingHook));
        registry.register(Box::new(CountingHook { created: Arc::clone(&counter) }));
        assert_eq!(registry.hook_count(), 2);
        assert_eq!(registry.hook_names(), vec!["logging", "counting"]);

        registry.fire_task_created(&sample_task());
        assert_eq!(counter.load(Relaxed), 1);
    }
}
