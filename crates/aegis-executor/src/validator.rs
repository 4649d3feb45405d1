// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::task::NewTask;

/// Inspects a [`NewTask`] before it is queued, ahead of the rate limit and
/// RBAC gates. Swappable per [`crate::Executor::set_validator`] so callers
/// can layer domain-specific checks (schema validation, size limits) onto
/// the one mandatory structural check below.
pub trait InputValidator: Send + Sync {
    /// Return `Err(reason)` to reject the task with `ValidationFailed`.
    fn validate(&self, task: &NewTask) -> Result<(), String>;
}

/// Rejects only a blank `task_type`. The floor every [`InputValidator`]
/// should enforce even when layering stricter domain checks on top.
pub struct DefaultInputValidator;

impl InputValidator for DefaultInputValidator {
    fn validate(&self, task: &NewTask) -> Result<(), String> {
        if task.task_type.trim().is_empty() {
            return Err("task_type must not be empty".to_string());
        }
        Ok(())
    }
}
