//! Token-gated tool execution.
//!
//! ```text
//! execute(token, options)
//!   │ 1. concurrency permit (try, never wait) ──▶ CapacityExceeded
//!   │ 2. verify token                         ──▶ InvalidToken / TokenReplayed
//!   │ 3. mark token used                      ──▶ TokenReplayed
//!   │ 4. resolve capability                   ──▶ ToolNotFound
//!   │ 5. validate parameters                  ──▶ ValidationFailed
//!   ▼
//! spawn handler ─┬─ handler resolves  ──▶ Success / HandlerFailed
//!                ├─ deadline elapses  ──▶ cancel fired, task aborted, TimedOut
//!                ├─ abort(call_id)    ──▶ task aborted, Aborted
//!                └─ caller drops call ──▶ task aborted, Aborted recorded
//! ```
//!
//! The token is consumed before the handler starts, so a crash mid-run
//! cannot be replayed with the same token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bulwark_audit::{AuditAction, AuditRecord, AuditSink, BusEvent, EventBus};
use bulwark_policy::{CapabilityToken, TokenRejection, TokenVerifier};
use bulwark_registry::{CancelSignal, HandlerError, ToolHandler, ToolRegistry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ExecutorConfig, Result};
use crate::result::{ActiveExecution, ExecutionOutcome, ExecutionResult};

/// Per-call options for [`ToolExecutor::execute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteOptions {
    /// Must equal the parameters the token was issued for.
    pub parameters: Value,
    pub session_id: Option<String>,
    /// Replaces the capability's own timeout.
    pub timeout_override: Option<Duration>,
}

impl ExecuteOptions {
    pub fn new(parameters: Value) -> Self {
        Self {
            parameters,
            ..Self::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }
}

struct Running {
    tool_id: String,
    session_id: Option<String>,
    started_at: DateTime<Utc>,
    cancel: CancelSignal,
}

type ActiveTable = Arc<Mutex<HashMap<String, Running>>>;

/// Removes the active-table entry on every exit path.
struct ActiveGuard {
    table: ActiveTable,
    call_id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.table.lock().remove(&self.call_id);
    }
}

#[derive(Clone)]
struct Attempt<'a> {
    call_id: String,
    token: &'a CapabilityToken,
    session_id: Option<String>,
    started_at: DateTime<Utc>,
    clock: Instant,
}

/// Records the end of a call whose caller stopped awaiting it.
///
/// Without this, dropping the `execute` future would skip the end event
/// and the audit record.
struct PendingCall<'a> {
    executor: &'a ToolExecutor,
    attempt: Option<Attempt<'a>>,
}

impl PendingCall<'_> {
    fn disarm(mut self) {
        self.attempt = None;
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            self.executor.finish(
                attempt,
                Finished::failed(ExecutionOutcome::Aborted, "caller dropped the call"),
            );
        }
    }
}

/// Spawned handler that dies with the call that started it.
///
/// Dropping fires the cancel signal and aborts the task, so a handler
/// never outlives its admission permit.
struct HandlerTask {
    task: JoinHandle<std::result::Result<Value, HandlerError>>,
    cancel: CancelSignal,
}

impl Drop for HandlerTask {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            self.cancel.cancel();
            self.task.abort();
        }
    }
}

struct Finished {
    outcome: ExecutionOutcome,
    output: Option<Value>,
    error: Option<String>,
}

impl Finished {
    fn ok(output: Value) -> Self {
        Self {
            outcome: ExecutionOutcome::Success,
            output: Some(output),
            error: None,
        }
    }

    fn failed(outcome: ExecutionOutcome, error: impl Into<String>) -> Self {
        Self {
            outcome,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Runs capabilities against single-use tokens.
pub struct ToolExecutor {
    config: ExecutorConfig,
    registry: Arc<ToolRegistry>,
    verifier: Arc<dyn TokenVerifier>,
    permits: Arc<Semaphore>,
    active: ActiveTable,
    audit: Arc<dyn AuditSink>,
    bus: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("config", &self.config)
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl ToolExecutor {
    pub fn new(
        config: ExecutorConfig,
        registry: Arc<ToolRegistry>,
        verifier: Arc<dyn TokenVerifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            registry,
            verifier,
            active: Arc::new(Mutex::new(HashMap::new())),
            audit,
            bus: None,
        })
    }

    /// Publishes `tool:start` / `tool:end` events to `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes the capability `token` authorizes.
    ///
    /// Never fails: every outcome, including rejections, is an
    /// [`ExecutionResult`] with a start event, an end event and an audit
    /// record.
    pub async fn execute(&self, token: &CapabilityToken, options: ExecuteOptions) -> ExecutionResult {
        let ExecuteOptions {
            parameters,
            session_id,
            timeout_override,
        } = options;

        let attempt = Attempt {
            call_id: Uuid::new_v4().to_string(),
            token,
            session_id,
            started_at: Utc::now(),
            clock: Instant::now(),
        };
        self.publish(BusEvent::ToolStart {
            call_id: attempt.call_id.clone(),
            tool_id: token.tool_id.clone(),
            agent_id: token.agent_id.clone(),
            session_id: attempt.session_id.clone(),
            at: attempt.started_at,
        });

        let pending = PendingCall {
            executor: self,
            attempt: Some(attempt.clone()),
        };
        let finished = self.admit_and_run(&attempt, parameters, timeout_override).await;
        pending.disarm();
        self.finish(attempt, finished)
    }

    async fn admit_and_run(
        &self,
        attempt: &Attempt<'_>,
        parameters: Value,
        timeout_override: Option<Duration>,
    ) -> Finished {
        let token = attempt.token;

        // Held until the handler finishes or is abandoned.
        let Ok(_permit) = self.permits.clone().try_acquire_owned() else {
            return Finished::failed(
                ExecutionOutcome::CapacityExceeded,
                format!("executor at capacity ({} concurrent)", self.config.max_concurrent),
            );
        };

        if let Err(rejection) = self.verifier.verify_token(token, &parameters) {
            let outcome = match rejection {
                TokenRejection::AlreadyUsed => ExecutionOutcome::TokenReplayed,
                _ => ExecutionOutcome::InvalidToken,
            };
            return Finished::failed(outcome, rejection.to_string());
        }

        if !self.verifier.mark_token_used(token) {
            return Finished::failed(
                ExecutionOutcome::TokenReplayed,
                TokenRejection::AlreadyUsed.to_string(),
            );
        }

        let Some((definition, handler)) = self.registry.resolve(&token.tool_id) else {
            return Finished::failed(
                ExecutionOutcome::ToolNotFound,
                format!("tool '{}' is not registered", token.tool_id),
            );
        };

        match self.registry.validate_parameters(&token.tool_id, &parameters) {
            Ok(report) if report.is_valid() => {}
            Ok(report) => {
                return Finished::failed(ExecutionOutcome::ValidationFailed, report.error_summary())
            }
            Err(e) => return Finished::failed(ExecutionOutcome::ToolNotFound, e.to_string()),
        }

        let deadline = timeout_override.unwrap_or_else(|| definition.timeout());
        let cancel = CancelSignal::new();
        let _guard = self.track(attempt, cancel.clone());

        debug!(
            call_id = %attempt.call_id,
            tool_id = %token.tool_id,
            deadline_ms = deadline.as_millis() as u64,
            "handler starting"
        );
        race(&token.tool_id, handler, parameters, cancel, deadline).await
    }

    fn track(&self, attempt: &Attempt<'_>, cancel: CancelSignal) -> ActiveGuard {
        self.active.lock().insert(
            attempt.call_id.clone(),
            Running {
                tool_id: attempt.token.tool_id.clone(),
                session_id: attempt.session_id.clone(),
                started_at: attempt.started_at,
                cancel,
            },
        );
        ActiveGuard {
            table: self.active.clone(),
            call_id: attempt.call_id.clone(),
        }
    }

    fn finish(&self, attempt: Attempt<'_>, finished: Finished) -> ExecutionResult {
        let token = attempt.token;
        let duration_ms = attempt.clock.elapsed().as_millis() as u64;
        let outcome = finished.outcome;

        self.publish(BusEvent::ToolEnd {
            call_id: attempt.call_id.clone(),
            tool_id: token.tool_id.clone(),
            success: outcome == ExecutionOutcome::Success,
            outcome: outcome.as_str().to_string(),
            duration_ms,
            at: Utc::now(),
        });

        let action = match outcome {
            ExecutionOutcome::Success | ExecutionOutcome::HandlerFailed => AuditAction::ToolExecuted,
            ExecutionOutcome::TimedOut | ExecutionOutcome::Aborted => AuditAction::ToolAborted,
            _ => AuditAction::ToolRejected,
        };
        match outcome {
            ExecutionOutcome::Success => info!(
                call_id = %attempt.call_id,
                tool_id = %token.tool_id,
                duration_ms,
                "tool executed"
            ),
            _ => warn!(
                call_id = %attempt.call_id,
                tool_id = %token.tool_id,
                outcome = %outcome,
                error = finished.error.as_deref().unwrap_or(""),
                duration_ms,
                "tool execution did not succeed"
            ),
        }
        self.audit.record(AuditRecord::new(
            action,
            token.agent_id.clone(),
            Some(token.trust_level),
            json!({
                "call_id": attempt.call_id,
                "tool_id": token.tool_id,
                "token_id": token.token_id,
                "session_id": attempt.session_id,
                "outcome": outcome,
                "duration_ms": duration_ms,
                "error": finished.error,
            }),
        ));

        ExecutionResult {
            call_id: attempt.call_id,
            tool_id: token.tool_id.clone(),
            agent_id: token.agent_id.clone(),
            session_id: attempt.session_id,
            outcome,
            output: finished.output,
            error: finished.error,
            started_at: attempt.started_at,
            duration_ms,
        }
    }

    fn publish(&self, event: BusEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }

    /// Raises the cancel signal of a running call.
    ///
    /// Returns `false` if the call is unknown, finished, or already
    /// signalled. The handler task is dropped by the executor, but a
    /// handler blocked outside an await point may keep running briefly.
    pub fn abort(&self, call_id: &str) -> bool {
        let cancel = self.active.lock().get(call_id).map(|r| r.cancel.clone());
        match cancel {
            Some(cancel) => {
                let fired = cancel.cancel();
                if fired {
                    info!(call_id = %call_id, "tool execution abort requested");
                }
                fired
            }
            None => false,
        }
    }

    /// Aborts every running call owned by `session_id`; returns how many
    /// were signalled.
    pub fn abort_session(&self, session_id: &str) -> usize {
        let signals: Vec<CancelSignal> = self
            .active
            .lock()
            .values()
            .filter(|r| r.session_id.as_deref() == Some(session_id))
            .map(|r| r.cancel.clone())
            .collect();
        signals.iter().filter(|c| c.cancel()).count()
    }

    /// Running calls, oldest first.
    pub fn active_executions(&self) -> Vec<ActiveExecution> {
        let mut rows: Vec<ActiveExecution> = self
            .active
            .lock()
            .iter()
            .map(|(call_id, r)| ActiveExecution {
                call_id: call_id.clone(),
                tool_id: r.tool_id.clone(),
                session_id: r.session_id.clone(),
                started_at: r.started_at,
            })
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        rows
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Admission slots currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Races the handler against the deadline and the cancel signal.
async fn race(
    tool_id: &str,
    handler: ToolHandler,
    parameters: Value,
    cancel: CancelSignal,
    deadline: Duration,
) -> Finished {
    let task_tool = tool_id.to_string();
    let task_cancel = cancel.clone();
    let mut running = HandlerTask {
        task: tokio::spawn(async move { handler.invoke(&task_tool, parameters, task_cancel).await }),
        cancel: cancel.clone(),
    };

    tokio::select! {
        joined = &mut running.task => match joined {
            Ok(Ok(output)) => Finished::ok(output),
            Ok(Err(HandlerError::Cancelled)) => {
                Finished::failed(ExecutionOutcome::Aborted, "handler stopped on cancellation")
            }
            Ok(Err(e)) => Finished::failed(ExecutionOutcome::HandlerFailed, e.to_string()),
            Err(e) if e.is_panic() => Finished::failed(ExecutionOutcome::HandlerFailed, "handler panicked"),
            Err(e) => Finished::failed(ExecutionOutcome::Aborted, e.to_string()),
        },
        () = tokio::time::sleep(deadline) => {
            drop(running);
            Finished::failed(
                ExecutionOutcome::TimedOut,
                format!("exceeded {} ms deadline", deadline.as_millis()),
            )
        }
        () = cancel.cancelled() => {
            drop(running);
            Finished::failed(ExecutionOutcome::Aborted, "aborted by caller")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_audit::{MemoryAuditSink, TrustLevel};
    use bulwark_registry::{handler_fn, CapabilityDefinition, ParamType, PermissionTier};
    use std::collections::HashSet;

    /// Verifier that checks parameter equality and remembers used ids.
    #[derive(Default)]
    struct StubVerifier {
        used: Mutex<HashSet<String>>,
    }

    impl TokenVerifier for StubVerifier {
        fn verify_token(
            &self,
            token: &CapabilityToken,
            parameters: &Value,
        ) -> std::result::Result<(), TokenRejection> {
            if self.used.lock().contains(&token.token_id) {
                return Err(TokenRejection::AlreadyUsed);
            }
            if token.parameters != *parameters {
                return Err(TokenRejection::ParameterMismatch);
            }
            Ok(())
        }

        fn mark_token_used(&self, token: &CapabilityToken) -> bool {
            self.used.lock().insert(token.token_id.clone())
        }
    }

    fn token(tool_id: &str, parameters: Value) -> CapabilityToken {
        let now = Utc::now();
        CapabilityToken {
            token_id: Uuid::new_v4().to_string(),
            tool_id: tool_id.into(),
            agent_id: "agent-1".into(),
            trust_level: TrustLevel::Standard,
            parameters,
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(60),
            signature: String::new(),
        }
    }

    fn executor(max_concurrent: usize) -> (Arc<ToolExecutor>, Arc<MemoryAuditSink>) {
        let (executor, audit) = build(max_concurrent);
        (Arc::new(executor), audit)
    }

    fn build(max_concurrent: usize) -> (ToolExecutor, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let registry = ToolRegistry::new(audit.clone());
        registry
            .register(
                CapabilityDefinition::new("echo", "Echo", PermissionTier::Read)
                    .with_parameter("text", ParamType::String, true),
                ToolHandler::read(handler_fn(|params: Value, _cancel: CancelSignal| async move {
                    Ok::<_, HandlerError>(params)
                })),
            )
            .unwrap();
        registry
            .register(
                CapabilityDefinition::new("hang", "Hang", PermissionTier::Read).with_timeout_ms(30),
                ToolHandler::read(handler_fn(|_params: Value, _cancel: CancelSignal| async move {
                    std::future::pending::<()>().await;
                    Ok::<_, HandlerError>(Value::Null)
                })),
            )
            .unwrap();
        registry
            .register(
                CapabilityDefinition::new("wait", "Wait for cancel", PermissionTier::Read)
                    .with_timeout_ms(60_000),
                ToolHandler::read(handler_fn(|_params: Value, cancel: CancelSignal| async move {
                    cancel.cancelled().await;
                    Err::<Value, _>(HandlerError::Cancelled)
                })),
            )
            .unwrap();
        registry
            .register(
                CapabilityDefinition::new("boom", "Panics", PermissionTier::Read),
                ToolHandler::read(handler_fn(|_params: Value, _cancel: CancelSignal| async move {
                    if true {
                        panic!("handler bug");
                    }
                    Ok::<_, HandlerError>(Value::Null)
                })),
            )
            .unwrap();

        let executor = ToolExecutor::new(
            ExecutorConfig::new().with_max_concurrent(max_concurrent),
            Arc::new(registry),
            Arc::new(StubVerifier::default()),
            audit.clone(),
        )
        .unwrap();
        (executor, audit)
    }

    async fn wait_for_active(executor: &ToolExecutor, n: usize) {
        for _ in 0..200 {
            if executor.active_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("active count never reached {n}");
    }

    #[tokio::test]
    async fn test_success_and_replay() {
        let (executor, audit) = executor(4);
        let params = json!({"text": "hi"});
        let t = token("echo", params.clone());

        let first = executor.execute(&t, ExecuteOptions::new(params.clone())).await;
        assert!(first.is_success());
        assert_eq!(first.output, Some(params.clone()));

        let second = executor.execute(&t, ExecuteOptions::new(params)).await;
        assert_eq!(second.outcome, ExecutionOutcome::TokenReplayed);
        assert_eq!(audit.count_action(AuditAction::ToolExecuted), 1);
        assert_eq!(audit.count_action(AuditAction::ToolRejected), 1);
    }

    #[tokio::test]
    async fn test_parameter_substitution_rejected() {
        let (executor, _) = executor(4);
        let t = token("echo", json!({"text": "a"}));
        let result = executor.execute(&t, ExecuteOptions::new(json!({"text": "b"}))).await;
        assert_eq!(result.outcome, ExecutionOutcome::InvalidToken);
        // Not consumed: the original parameters still work.
        let retry = executor.execute(&t, ExecuteOptions::new(json!({"text": "a"}))).await;
        assert!(retry.is_success());
    }

    #[tokio::test]
    async fn test_unknown_tool_and_invalid_parameters() {
        let (executor, _) = executor(4);
        let missing = token("nope", json!({}));
        let result = executor.execute(&missing, ExecuteOptions::new(json!({}))).await;
        assert_eq!(result.outcome, ExecutionOutcome::ToolNotFound);

        let bad = token("echo", json!({"text": 5}));
        let result = executor.execute(&bad, ExecuteOptions::new(json!({"text": 5}))).await;
        assert_eq!(result.outcome, ExecutionOutcome::ValidationFailed);
        assert!(result.error.unwrap().contains("text"));
    }

    #[tokio::test]
    async fn test_timeout_cleans_up() {
        let (executor, audit) = executor(4);
        let t = token("hang", json!({}));
        let started = Instant::now();
        let result = executor.execute(&t, ExecuteOptions::new(json!({}))).await;

        assert_eq!(result.outcome, ExecutionOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(executor.active_count(), 0);
        assert_eq!(executor.available_permits(), 4);
        assert_eq!(audit.count_action(AuditAction::ToolAborted), 1);
    }

    #[tokio::test]
    async fn test_timeout_override() {
        let (executor, _) = executor(4);
        let t = token("wait", json!({}));
        let result = executor
            .execute(&t, ExecuteOptions::new(json!({})).with_timeout(Duration::from_millis(20)))
            .await;
        assert_eq!(result.outcome, ExecutionOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let (executor, _) = executor(4);
        let t = token("boom", json!({}));
        let result = executor.execute(&t, ExecuteOptions::new(json!({}))).await;
        assert_eq!(result.outcome, ExecutionOutcome::HandlerFailed);
        assert_eq!(result.error.as_deref(), Some("handler panicked"));
        assert_eq!(executor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_and_abort() {
        let (executor, _) = executor(1);
        let running = {
            let executor = executor.clone();
            tokio::spawn(async move {
                let t = token("wait", json!({}));
                executor
                    .execute(&t, ExecuteOptions::new(json!({})).with_session_id("s-1"))
                    .await
            })
        };
        wait_for_active(&executor, 1).await;

        let active = executor.active_executions();
        assert_eq!(active[0].tool_id, "wait");
        assert_eq!(active[0].session_id.as_deref(), Some("s-1"));

        // Second caller is rejected without touching its token.
        let t = token("echo", json!({"text": "x"}));
        let rejected = executor.execute(&t, ExecuteOptions::new(json!({"text": "x"}))).await;
        assert_eq!(rejected.outcome, ExecutionOutcome::CapacityExceeded);

        assert!(executor.abort(&active[0].call_id));
        assert!(!executor.abort(&active[0].call_id));
        let result = running.await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Aborted);
        assert_eq!(executor.active_count(), 0);

        let accepted = executor.execute(&t, ExecuteOptions::new(json!({"text": "x"}))).await;
        assert!(accepted.is_success());
    }

    #[tokio::test]
    async fn test_dropped_call_takes_its_handler_with_it() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (executor, audit) = executor(1);
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        executor
            .registry
            .register(
                CapabilityDefinition::new("slow", "Slow", PermissionTier::Read).with_timeout_ms(5_000),
                ToolHandler::read(handler_fn(move |_params: Value, _cancel: CancelSignal| {
                    let counter = counter.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, HandlerError>(Value::Null)
                    }
                })),
            )
            .unwrap();

        for _ in 0..3 {
            let t = token("slow", json!({}));
            let call = executor.execute(&t, ExecuteOptions::new(json!({})));
            assert!(tokio::time::timeout(Duration::from_millis(30), call).await.is_err());
            assert_eq!(executor.active_count(), 0);
            assert_eq!(executor.available_permits(), 1);
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(audit.count_action(AuditAction::ToolAborted), 3);
    }

    #[tokio::test]
    async fn test_abort_session() {
        let (executor, _) = executor(4);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    let t = token("wait", json!({}));
                    executor
                        .execute(&t, ExecuteOptions::new(json!({})).with_session_id("s-9"))
                        .await
                })
            })
            .collect();
        wait_for_active(&executor, 2).await;

        assert_eq!(executor.abort_session("other"), 0);
        assert_eq!(executor.abort_session("s-9"), 2);
        for handle in handles {
            assert_eq!(handle.await.unwrap().outcome, ExecutionOutcome::Aborted);
        }
        assert!(!executor.abort("unknown"));
    }

    #[tokio::test]
    async fn test_events_published_for_every_outcome() {
        let (executor, _) = build(4);
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let executor = executor.with_event_bus(bus);

        let t = token("nope", json!({}));
        let result = executor.execute(&t, ExecuteOptions::new(json!({}))).await;

        let start = rx.recv().await.unwrap();
        assert_eq!(start.topic(), "tool:start");
        match rx.recv().await.unwrap() {
            BusEvent::ToolEnd { call_id, success, outcome, .. } => {
                assert_eq!(call_id, result.call_id);
                assert!(!success);
                assert_eq!(outcome, "tool_not_found");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
