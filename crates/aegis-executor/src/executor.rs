// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::cancel::{CancellableRun, CancellationReason, CancellationToken};
use crate::handler::{ExecutionContext, TaskHandler};
use crate::hooks::HookRegistry;
use crate::resources::ResourceTracker;
use crate::task::{NewTask, SecurityContext, Task, TaskError, TaskResult, TaskStatus};
use crate::validator::{DefaultInputValidator, InputValidator};
use aegis_audit::{AuditChain, AuditLevel, NewAuditEntry};
use aegis_error::{AegisError, ErrorCode};
use aegis_queue::TaskQueue;
use aegis_rbac::{CheckRequest, Rbac};
use aegis_ratelimit::RateLimiter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering::Relaxed};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, Semaphore};
use tracing::{debug, warn};

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as i64
}

/// Identity the caller of [`Executor::submit`]/[`Executor::cancel`] acts
/// under; the RBAC gate and audit trail are both keyed off of it.
#[derive(Debug, Clone)]
pub struct SubmitContext {
    /// Acting user id.
    pub user_id: String,
    /// Resolved role.
    pub role: String,
    /// Originating IP, if known.
    pub ip_address: Option<String>,
    /// Originating user agent, if known.
    pub user_agent: Option<String>,
}

/// Tunables for an [`Executor`] instance.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of tasks running concurrently.
    pub max_concurrent: usize,
    /// Maximum number of tasks waiting in the pending queue.
    pub max_queue_size: usize,
    /// Deadline applied to a task whose submission left `timeout_ms` unset.
    pub default_timeout_ms: u64,
    /// Upper bound every resolved `timeout_ms` is clamped to, regardless of
    /// what the caller or `default_timeout_ms` requested.
    pub max_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_queue_size: 1000,
            default_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
        }
    }
}

/// Point-in-time counters for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorStats {
    /// Tasks currently executing.
    pub active: usize,
    /// Tasks waiting for a free execution slot.
    pub queued: usize,
    /// Configured concurrency bound.
    pub max_concurrent: usize,
}

/// Bounded-concurrency task executor.
///
/// Accepted tasks are queued FIFO and handed to their registered
/// [`TaskHandler`] as execution slots (bounded by
/// [`ExecutorConfig::max_concurrent`]) become free. Each run races the
/// handler future against a deadline timer and external cancellation via
/// `tokio::select!`, the same idiom used for streaming backend runs
/// elsewhere in this codebase.
pub struct Executor {
    config: ExecutorConfig,
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    tasks: Mutex<HashMap<String, Task>>,
    queue: Mutex<TaskQueue<Task>>,
    queue_notify: Notify,
    active: Mutex<HashMap<String, Arc<CancellableRun>>>,
    semaphore: Arc<Semaphore>,
    hooks: RwLock<HookRegistry>,
    validator: RwLock<Arc<dyn InputValidator>>,
    rbac: Arc<Rbac>,
    rate_limiter: Arc<RateLimiter>,
    audit: Arc<AuditChain>,
    shutdown: CancellationToken,
    active_count: AtomicI64,
}

impl Executor {
    /// Construct an executor with no handlers registered yet.
    #[must_use]
    pub fn new(
        config: ExecutorConfig,
        rbac: Arc<Rbac>,
        rate_limiter: Arc<RateLimiter>,
        audit: Arc<AuditChain>,
    ) -> Arc<Self> {
        let max_queue_size = config.max_queue_size;
        let max_concurrent = config.max_concurrent;
        Arc::new(Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            queue: Mutex::new(TaskQueue::new(max_queue_size)),
            queue_notify: Notify::new(),
            active: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            hooks: RwLock::new(HookRegistry::new()),
            validator: RwLock::new(Arc::new(DefaultInputValidator)),
            rbac,
            rate_limiter,
            audit,
            shutdown: CancellationToken::new(),
            active_count: AtomicI64::new(0),
        })
    }

    /// Register a handler for `task_type`, replacing any existing one.
    pub async fn register_handler(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().await.insert(task_type.into(), handler);
    }

    /// Register a hook, fired at every lifecycle transition.
    pub async fn register_hook(&self, hook: Box<dyn crate::hooks::ExecutorHook>) {
        self.hooks.write().await.register(hook);
    }

    /// Replace the [`InputValidator`] consulted at the top of [`Self::submit`].
    pub async fn set_validator(&self, validator: Arc<dyn InputValidator>) {
        *self.validator.write().await = validator;
    }

    /// Current queue/concurrency snapshot.
    pub async fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            active: self.active_count.load(Relaxed).max(0) as usize,
            queued: self.queue.lock().await.len(),
            max_concurrent: self.config.max_concurrent,
        }
    }

    /// Look up a task by id, regardless of its status.
    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().await.get(task_id).cloned()
    }

    /// List every task known to the executor, in no particular order.
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.tasks.lock().await.values().cloned().collect()
    }

    /// Validate, rate-limit, permission-check, and enqueue a new task.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ValidationFailed`] for a malformed request,
    /// [`ErrorCode::RateLimited`] if `task_creation` is exhausted for
    /// `ctx.user_id`, [`ErrorCode::NoHandler`] if no handler is registered
    /// for `new_task.task_type`, [`ErrorCode::Forbidden`] if `ctx.role`
    /// lacks any permission the handler declares via
    /// [`crate::TaskHandler::required_permissions`], or
    /// [`ErrorCode::Conflict`] if the pending queue is full.
    pub async fn submit(&self, new_task: NewTask, ctx: SubmitContext) -> Result<Task, AegisError> {
        let validator = Arc::clone(&*self.validator.read().await);
        if let Err(reason) = validator.validate(&new_task) {
            self.reject(&new_task, &ctx, &reason).await;
            return Err(AegisError::new(ErrorCode::ValidationFailed, reason));
        }

        let check = self.rate_limiter.check("task_creation", &ctx.user_id)?;
        if !check.allowed {
            self.audit
                .record(
                    NewAuditEntry::new("task_rate_limited", AuditLevel::Warn, "task creation rate limit exceeded")
                        .with_user(ctx.user_id.clone())
                        .with_metadata("task_type", new_task.task_type.clone()),
                )
                .await
                .ok();
            return Err(AegisError::new(ErrorCode::RateLimited, "task creation rate limit exceeded")
                .with_context("retry_after_secs", check.retry_after_secs));
        }

        let handler = self.handlers.read().await.get(&new_task.task_type).cloned();
        let Some(handler) = handler else {
            self.reject(&new_task, &ctx, "no handler registered for task type").await;
            return Err(AegisError::new(ErrorCode::NoHandler, "no handler registered for task type")
                .with_context("task_type", new_task.task_type.clone()));
        };

        let required = handler.required_permissions();
        let mut permissions_used = Vec::with_capacity(required.len());
        for perm in &required {
            if let Err(err) = self.rbac.require_permission(
                &ctx.role,
                &CheckRequest {
                    resource: &perm.resource,
                    action: &perm.action,
                    context: None,
                },
            ) {
                self.reject(&new_task, &ctx, &err.message).await;
                return Err(err);
            }
            permissions_used.push(format!("{}:{}", perm.resource, perm.action));
        }

        let now = now_ms();
        let input_canonical = serde_json::to_vec(&new_task.input).unwrap_or_default();
        let task = Task {
            id: aegis_crypto::uuid_v7(),
            correlation_id: new_task.correlation_id.clone().unwrap_or_else(aegis_crypto::uuid_v7),
            parent_task_id: new_task.parent_task_id.clone(),
            task_type: new_task.task_type.clone(),
            name: new_task.name.clone(),
            description: new_task.description.clone(),
            input_hash: aegis_crypto::sha256_hex(&input_canonical),
            status: TaskStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            timeout_ms: new_task
                .timeout_ms
                .unwrap_or(self.config.default_timeout_ms)
                .min(self.config.max_timeout_ms),
            security_context: SecurityContext {
                user_id: ctx.user_id.clone(),
                role: ctx.role.clone(),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
                permissions_used,
            },
            result: None,
            resources: None,
        };

        {
            let mut queue = self.queue.lock().await;
            queue.enqueue(task.clone()).map_err(|e| {
                AegisError::new(ErrorCode::Conflict, "task queue is full").with_context("detail", e.to_string())
            })?;
        }
        self.tasks.lock().await.insert(task.id.clone(), task.clone());

        self.audit
            .record(
                NewAuditEntry::new("task_created", AuditLevel::Info, "task submitted")
                    .with_user(task.security_context.user_id.clone())
                    .with_task(task.id.clone())
                    .with_metadata("task_type", task.task_type.clone())
                    .with_metadata("correlation_id", task.correlation_id.clone()),
            )
            .await
            .ok();
        self.hooks.read().await.fire_task_created(&task);
        self.queue_notify.notify_one();

        Ok(task)
    }

    async fn reject(&self, new_task: &NewTask, ctx: &SubmitContext, reason: &str) {
        self.audit
            .record(
                NewAuditEntry::new("task_rejected", AuditLevel::Warn, reason.to_string())
                    .with_user(ctx.user_id.clone())
                    .with_metadata("task_type", new_task.task_type.clone()),
            )
            .await
            .ok();
    }

    /// Cancel a pending or running task.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::NotFound`] if no such task exists,
    /// [`ErrorCode::Forbidden`] if `ctx.role` lacks `cancel` on any resource
    /// the task's handler declared via
    /// [`crate::TaskHandler::required_permissions`] (or on
    /// `tasks:{task_type}` if the handler is no longer registered), or
    /// [`ErrorCode::Conflict`] if the task already reached a terminal state.
    pub async fn cancel(&self, task_id: &str, ctx: &SubmitContext) -> Result<(), AegisError> {
        let task = self
            .tasks
            .lock()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| AegisError::new(ErrorCode::NotFound, "no such task"))?;

        let required = match self.handlers.read().await.get(&task.task_type).cloned() {
            Some(handler) => handler.required_permissions(),
            None => vec![crate::handler::RequiredPermission::new(
                format!("tasks:{}", task.task_type),
                "cancel",
            )],
        };
        for perm in &required {
            self.rbac.require_permission(
                &ctx.role,
                &CheckRequest {
                    resource: &perm.resource,
                    action: "cancel",
                    context: None,
                },
            )?;
        }

        if task.status.is_terminal() {
            return Err(AegisError::new(ErrorCode::Conflict, "task already reached a terminal state")
                .with_context("status", format!("{:?}", task.status)));
        }

        if let Some(run) = self.active.lock().await.get(task_id).cloned() {
            run.cancel(CancellationReason::UserRequested);
            return Ok(());
        }

        if self.queue.lock().await.remove(task_id).is_some() {
            let mut cancelled = task.clone();
            cancelled.status = TaskStatus::Cancelled;
            cancelled.completed_at = Some(now_ms());
            cancelled.result = Some(TaskResult {
                success: false,
                output: None,
                error: Some(TaskError::new("CANCELLED", "task was cancelled before it started")),
            });
            self.tasks.lock().await.insert(cancelled.id.clone(), cancelled.clone());
            self.audit
                .record(
                    NewAuditEntry::new("task_cancelled", AuditLevel::Info, "queued task cancelled")
                        .with_user(ctx.user_id.clone())
                        .with_task(cancelled.id.clone()),
                )
                .await
                .ok();
            self.hooks.read().await.fire_task_finished(&cancelled);
            return Ok(());
        }

        Err(AegisError::new(ErrorCode::Conflict, "task is no longer queued or active"))
    }

    /// Request a graceful shutdown: stop pulling new tasks off the queue and
    /// cancel every task currently running.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.queue_notify.notify_waiters();
        for run in self.active.lock().await.values() {
            run.cancel(CancellationReason::ExecutorShutdown);
        }
    }

    /// Spawn the background pump that dequeues pending tasks and runs them
    /// as execution slots free up. Returns the pump's join handle; dropping
    /// or aborting it does not cancel in-flight tasks — call
    /// [`Executor::shutdown`] first.
    pub fn spawn_pump(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if self.shutdown.is_cancelled() {
                    return;
                }
                let permit = tokio::select! {
                    res = Arc::clone(&self.semaphore).acquire_owned() => match res {
                        Ok(p) => p,
                        Err(_) => return,
                    },
                    () = self.shutdown.cancelled() => return,
                };

                let task = loop {
                    if let Some(t) = self.queue.lock().await.dequeue() {
                        break t;
                    }
                    tokio::select! {
                        () = self.queue_notify.notified() => {}
                        () = self.shutdown.cancelled() => {
                            drop(permit);
                            return;
                        }
                    }
                };

                let executor = Arc::clone(&self);
                tokio::spawn(async move {
                    executor.run_task(task, permit).await;
                });
            }
        })
    }

    async fn run_task(self: Arc<Self>, mut task: Task, permit: tokio::sync::OwnedSemaphorePermit) {
        let task_id = task.id.clone();
        self.active_count.fetch_add(1, Relaxed);

        let token = CancellationToken::new();
        let run = Arc::new(CancellableRun::new(token.clone()));
        self.active.lock().await.insert(task_id.clone(), Arc::clone(&run));

        task.status = TaskStatus::Running;
        task.started_at = Some(now_ms());
        self.tasks.lock().await.insert(task_id.clone(), task.clone());
        self.hooks.read().await.fire_task_started(&task);

        let handler = self.handlers.read().await.get(&task.task_type).cloned();
        let (status, result, resources_snapshot) = match handler {
            None => (
                TaskStatus::Failed,
                TaskResult {
                    success: false,
                    output: None,
                    error: Some(TaskError::new("NO_HANDLER", "handler was unregistered while the task was queued")),
                },
                None,
            ),
            Some(handler) => self.execute_with_deadline(&task, &handler, &run, &token).await,
        };

        self.finish_task(task, status, result, resources_snapshot).await;
        self.active.lock().await.remove(&task_id);
        self.active_count.fetch_sub(1, Relaxed);
        drop(permit);
        self.queue_notify.notify_one();
    }

    async fn execute_with_deadline(
        &self,
        task: &Task,
        handler: &Arc<dyn TaskHandler>,
        run: &Arc<CancellableRun>,
        token: &CancellationToken,
    ) -> (TaskStatus, TaskResult, Option<crate::resources::TaskResources>) {
        let resources = Arc::new(ResourceTracker::new());
        let ctx = ExecutionContext {
            user_id: task.security_context.user_id.clone(),
            correlation_id: task.correlation_id.clone(),
            resources: Arc::clone(&resources),
            cancellation: token.clone(),
        };

        let timeout_guard = {
            let run = Arc::clone(run);
            let dur = Duration::from_millis(task.timeout_ms.max(1));
            tokio::spawn(async move {
                tokio::time::sleep(dur).await;
                run.cancel(CancellationReason::Timeout);
            })
        };

        let outcome = tokio::select! {
            res = handler.execute(task, &ctx) => Some(res),
            () = token.cancelled() => None,
        };
        timeout_guard.abort();

        let snapshot = resources.snapshot();
        let (status, result) = match outcome {
            Some(Ok(output)) => (
                TaskStatus::Completed,
                TaskResult { success: true, output: Some(output), error: None },
            ),
            Some(Err(err)) => (TaskStatus::Failed, TaskResult { success: false, output: None, error: Some(err) }),
            None => match run.reason().unwrap_or(CancellationReason::UserRequested) {
                CancellationReason::Timeout => (
                    TaskStatus::Timeout,
                    TaskResult {
                        success: false,
                        output: None,
                        error: Some(TaskError::new("TIMEOUT", "task exceeded its deadline")),
                    },
                ),
                CancellationReason::UserRequested => (
                    TaskStatus::Cancelled,
                    TaskResult {
                        success: false,
                        output: None,
                        error: Some(TaskError::new("CANCELLED", "task was cancelled")),
                    },
                ),
                CancellationReason::ExecutorShutdown => (
                    TaskStatus::Cancelled,
                    TaskResult {
                        success: false,
                        output: None,
                        error: Some(TaskError::new("EXECUTOR_SHUTDOWN", "executor is shutting down")),
                    },
                ),
            },
        };

        (status, result, Some(snapshot))
    }

    async fn finish_task(
        &self,
        mut task: Task,
        status: TaskStatus,
        result: TaskResult,
        resources: Option<crate::resources::TaskResources>,
    ) {
        let now = now_ms();
        task.completed_at = Some(now);
        task.duration_ms = task.started_at.map(|s| (now - s).max(0) as u64);
        task.status = status;
        task.resources = resources;
        task.result = Some(result.clone());
        self.tasks.lock().await.insert(task.id.clone(), task.clone());

        let (event, level) = match status {
            TaskStatus::Completed => ("task_completed", AuditLevel::Info),
            TaskStatus::Cancelled => ("task_cancelled", AuditLevel::Info),
            TaskStatus::Failed | TaskStatus::Timeout => ("task_failed", AuditLevel::Warn),
            TaskStatus::Pending | TaskStatus::Running => {
                warn!(task_id = %task.id, "finish_task called on a non-terminal status");
                ("task_failed", AuditLevel::Warn)
            }
        };

        let mut entry = NewAuditEntry::new(event, level, format!("task {} reached {:?}", task.id, status))
            .with_user(task.security_context.user_id.clone())
            .with_task(task.id.clone());
        if let Some(err) = &result.error {
            entry = entry.with_metadata("error_code", err.code.clone());
        }
        self.audit.record(entry).await.ok();
        debug!(task_id = %task.id, status = ?status, "task finished");

        self.hooks.read().await.fire_task_finished(&task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ExecutorHook;
    use aegis_audit::InMemoryAuditStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
    use tokio::time::Duration as TokioDuration;

    fn ctx(role: &str) -> SubmitContext {
        SubmitContext {
            user_id: "user_1".into(),
            role: role.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    fn new_executor(config: ExecutorConfig) -> Arc<Executor> {
        let rbac = Arc::new(Rbac::new());
        let rate_limiter = Arc::new(RateLimiter::default());
        let audit = Arc::new(AuditChain::new(
            Arc::new(InMemoryAuditStorage::new()),
            b"test-executor-signing-key-long!".to_vec(),
        ));
        Executor::new(config, rbac, rate_limiter, audit)
    }

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn execute(&self, task: &Task, _ctx: &ExecutionContext) -> Result<serde_json::Value, TaskError> {
            Ok(serde_json::json!({ "echoed": task.name }))
        }

        fn required_permissions(&self) -> Vec<crate::handler::RequiredPermission> {
            vec![crate::handler::RequiredPermission::new("tasks", "create")]
        }
    }

    struct SleepyHandler {
        duration: Duration,
    }

    #[async_trait]
    impl TaskHandler for SleepyHandler {
        async fn execute(&self, _task: &Task, _ctx: &ExecutionContext) -> Result<serde_json::Value, TaskError> {
            tokio::time::sleep(self.duration).await;
            Ok(serde_json::json!({}))
        }

        fn required_permissions(&self) -> Vec<crate::handler::RequiredPermission> {
            vec![crate::handler::RequiredPermission::new("tasks", "create")]
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl TaskHandler for FailingHandler {
        async fn execute(&self, _task: &Task, _ctx: &ExecutionContext) -> Result<serde_json::Value, TaskError> {
            Err(TaskError::new("BAD_INPUT", "handler refused the input"))
        }

        fn required_permissions(&self) -> Vec<crate::handler::RequiredPermission> {
            vec![crate::handler::RequiredPermission::new("tasks", "create")]
        }
    }

    fn new_task(task_type: &str) -> NewTask {
        NewTask {
            task_type: task_type.into(),
            name: "demo".into(),
            timeout_ms: Some(5_000),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn submit_rejects_unknown_handler() {
        let executor = new_executor(ExecutorConfig::default());
        let err = executor.submit(new_task("ghost"), ctx("role_operator")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NoHandler);
    }

    #[tokio::test]
    async fn submit_rejects_unpermitted_role() {
        let executor = new_executor(ExecutorConfig::default());
        executor.register_handler("echo", Arc::new(EchoHandler)).await;
        let err = executor.submit(new_task("echo"), ctx("role_viewer")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn submitted_task_starts_pending_and_queued() {
        let executor = new_executor(ExecutorConfig::default());
        executor.register_handler("echo", Arc::new(EchoHandler)).await;
        let task = executor.submit(new_task("echo"), ctx("role_operator")).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(executor.stats().await.queued, 1);
    }

    #[tokio::test]
    async fn submitted_timeout_is_clamped_to_max_timeout_ms() {
        let executor = new_executor(ExecutorConfig {
            max_timeout_ms: 1_000,
            ..ExecutorConfig::default()
        });
        executor.register_handler("echo", Arc::new(EchoHandler)).await;
        let task = executor
            .submit(
                NewTask { timeout_ms: Some(60_000), ..new_task("echo") },
                ctx("role_operator"),
            )
            .await
            .unwrap();
        assert_eq!(task.timeout_ms, 1_000);
    }

    #[tokio::test]
    async fn pump_runs_submitted_task_to_completion() {
        let executor = new_executor(ExecutorConfig::default());
        executor.register_handler("echo", Arc::new(EchoHandler)).await;
        let pump = Arc::clone(&executor).spawn_pump();

        let task = executor.submit(new_task("echo"), ctx("role_operator")).await.unwrap();

        let mut seen = executor.get_task(&task.id).await.unwrap();
        for _ in 0..200 {
            if seen.status.is_terminal() {
                break;
            }
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
            seen = executor.get_task(&task.id).await.unwrap();
        }

        assert_eq!(seen.status, TaskStatus::Completed);
        assert!(seen.result.unwrap().success);
        executor.shutdown().await;
        pump.abort();
    }

    #[tokio::test]
    async fn task_timeout_yields_timeout_status_and_code() {
        let executor = new_executor(ExecutorConfig::default());
        executor.register_handler(
            "slow",
            Arc::new(SleepyHandler { duration: Duration::from_secs(5) }),
        ).await;
        let pump = Arc::clone(&executor).spawn_pump();

        let mut request = new_task("slow");
        request.timeout_ms = Some(100);
        let task = executor.submit(request, ctx("role_operator")).await.unwrap();

        let mut seen = executor.get_task(&task.id).await.unwrap();
        for _ in 0..200 {
            if seen.status.is_terminal() {
                break;
            }
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
            seen = executor.get_task(&task.id).await.unwrap();
        }

        assert_eq!(seen.status, TaskStatus::Timeout);
        let result = seen.result.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, "TIMEOUT");
        assert_eq!(executor.stats().await.active, 0);

        executor.shutdown().await;
        pump.abort();
    }

    #[tokio::test]
    async fn failing_handler_yields_failed_status() {
        let executor = new_executor(ExecutorConfig::default());
        executor.register_handler("bad", Arc::new(FailingHandler)).await;
        let pump = Arc::clone(&executor).spawn_pump();

        let task = executor.submit(new_task("bad"), ctx("role_operator")).await.unwrap();
        let mut seen = executor.get_task(&task.id).await.unwrap();
        for _ in 0..200 {
            if seen.status.is_terminal() {
                break;
            }
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
            seen = executor.get_task(&task.id).await.unwrap();
        }

        assert_eq!(seen.status, TaskStatus::Failed);
        assert_eq!(seen.result.unwrap().error.unwrap().code, "BAD_INPUT");

        executor.shutdown().await;
        pump.abort();
    }

    #[tokio::test]
    async fn cancel_queued_task_before_it_starts() {
        let executor = new_executor(ExecutorConfig { max_concurrent: 0, ..ExecutorConfig::default() });
        executor.register_handler("echo", Arc::new(EchoHandler)).await;
        let task = executor.submit(new_task("echo"), ctx("role_operator")).await.unwrap();

        executor.cancel(&task.id, &ctx("role_operator")).await.unwrap();
        let seen = executor.get_task(&task.id).await.unwrap();
        assert_eq!(seen.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_running_task_marks_cancelled() {
        let executor = new_executor(ExecutorConfig::default());
        executor.register_handler(
            "slow",
            Arc::new(SleepyHandler { duration: Duration::from_secs(5) }),
        ).await;
        let pump = Arc::clone(&executor).spawn_pump();

        let mut request = new_task("slow");
        request.timeout_ms = Some(10_000);
        let task = executor.submit(request, ctx("role_operator")).await.unwrap();

        let mut running = executor.get_task(&task.id).await.unwrap();
        for _ in 0..200 {
            if running.status == TaskStatus::Running {
                break;
            }
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
            running = executor.get_task(&task.id).await.unwrap();
        }
        assert_eq!(running.status, TaskStatus::Running);

        executor.cancel(&task.id, &ctx("role_operator")).await.unwrap();

        let mut seen = running;
        for _ in 0..200 {
            if seen.status.is_terminal() {
                break;
            }
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
            seen = executor.get_task(&task.id).await.unwrap();
        }
        assert_eq!(seen.status, TaskStatus::Cancelled);
        assert_eq!(seen.result.unwrap().error.unwrap().code, "CANCELLED");

        executor.shutdown().await;
        pump.abort();
    }

    #[tokio::test]
    async fn cancel_unknown_task_is_not_found() {
        let executor = new_executor(ExecutorConfig::default());
        let err = executor.cancel("does-not-exist", &ctx("role_operator")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn active_never_exceeds_max_concurrent() {
        let executor = new_executor(ExecutorConfig { max_concurrent: 2, ..ExecutorConfig::default() });
        let observed_max = Arc::new(AtomicUsize::new(0));

        struct WatchingHandler {
            observed_max: Arc<AtomicUsize>,
            current: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl TaskHandler for WatchingHandler {
            async fn execute(&self, _task: &Task, _ctx: &ExecutionContext) -> Result<serde_json::Value, TaskError> {
                let now = self.current.fetch_add(1, SeqCst) + 1;
                self.observed_max.fetch_max(now, SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.current.fetch_sub(1, SeqCst);
                Ok(serde_json::json!({}))
            }

            fn required_permissions(&self) -> Vec<crate::handler::RequiredPermission> {
                vec![crate::handler::RequiredPermission::new("tasks", "create")]
            }
        }

        let current = Arc::new(AtomicUsize::new(0));
        executor
            .register_handler(
                "watch",
                Arc::new(WatchingHandler { observed_max: Arc::clone(&observed_max), current }),
            )
            .await;
        let pump = Arc::clone(&executor).spawn_pump();

        for _ in 0..6 {
            executor.submit(new_task("watch"), ctx("role_operator")).await.unwrap();
        }

        for _ in 0..300 {
            let stats = executor.stats().await;
            if stats.active == 0 && stats.queued == 0 {
                break;
            }
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
        }

        assert!(observed_max.load(SeqCst) <= 2, "observed concurrency {}", observed_max.load(SeqCst));

        executor.shutdown().await;
        pump.abort();
    }

    struct CountingHook {
        finished: Arc<AtomicUsize>,
    }

    impl ExecutorHook for CountingHook {
        fn on_task_finished(&self, _task: &Task) {
            self.finished.fetch_add(1, SeqCst);
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn hooks_fire_on_task_completion() {
        let executor = new_executor(ExecutorConfig::default());
        executor.register_handler("echo", Arc::new(EchoHandler)).await;
        let finished = Arc::new(AtomicUsize::new(0));
        executor.register_hook(Box::new(CountingHook { finished: Arc::clone(&finished) })).await;
        let pump = Arc::clone(&executor).spawn_pump();

        let task = executor.submit(new_task("echo"), ctx("role_operator")).await.unwrap();
        for _ in 0..200 {
            if finished.load(SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
        }
        assert_eq!(finished.load(SeqCst), 1);
        let _ = executor.get_task(&task.id).await;

        executor.shutdown().await;
        pump.abort();
    }
}
