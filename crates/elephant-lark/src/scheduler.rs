//! Per-conversation scheduler: enforces "at most one active agent task per
//! memory identity" and decides what to do with a newer inbound message
//! while a prior task for the same identity is still alive.

use std::sync::Arc;

use dashmap::DashMap;
use elephant_agent_contract::{AgentRuntime, AgentRuntimeError, EventListener, TaskContext, TaskResult, UserInput};
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

struct InFlightEntry {
    session_id: String,
    user_input_tx: mpsc::Sender<UserInput>,
}

/// What happened to an admitted inbound message.
pub enum SchedulerOutcome {
    /// Forwarded into a task already running for this memory identity.
    Forwarded,
    /// A task ran (fresh session or a reused awaiting-input session) and
    /// returned this result.
    Ran(TaskResult),
    /// `ensure_session` or `execute_task` failed.
    Failed(AgentRuntimeError),
}

/// Lazily-populated `memory_identity -> mutex` map plus the in-flight
/// task table, per the admission algorithm. Both maps are process-wide and
/// grow with the number of distinct conversations seen.
pub struct Scheduler {
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
    in_flight: DashMap<String, InFlightEntry>,
    session_prefix: String,
}

impl Scheduler {
    pub fn new(session_prefix: impl Into<String>) -> Self {
        Self {
            locks: DashMap::new(),
            in_flight: DashMap::new(),
            session_prefix: session_prefix.into(),
        }
    }

    fn lock_for(&self, memory_identity: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(memory_identity.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// True iff a task is currently registered as in flight for this
    /// memory identity. Exposed for tests and diagnostics.
    pub fn has_in_flight(&self, memory_identity: &str) -> bool {
        self.in_flight.contains_key(memory_identity)
    }

    /// Admit a new inbound message for `ctx.memory_identity`, per the
    /// four-step algorithm: consult the runtime's session state, forward
    /// into an in-flight task if one exists, or launch a fresh one.
    pub async fn admit(
        &self,
        runtime: &dyn AgentRuntime,
        ctx: TaskContext,
        input: UserInput,
        listener: Arc<dyn EventListener>,
        cancel: CancellationToken,
    ) -> SchedulerOutcome {
        let memory_identity = ctx.memory_identity.clone();
        let lock = self.lock_for(&memory_identity);
        let guard = lock.lock_owned().await;

        let session_meta = match runtime.ensure_session(&memory_identity).await {
            Ok(meta) => meta,
            Err(e) => return SchedulerOutcome::Failed(e),
        };

        if session_meta.await_user_input {
            debug!(%memory_identity, session_id = %session_meta.session_id, "resuming session awaiting input");
            return self
                .launch(runtime, ctx, session_meta.session_id, input, listener, cancel, guard)
                .await;
        }

        if let Some(entry) = self.in_flight.get(&memory_identity) {
            debug!(%memory_identity, "forwarding into in-flight task");
            let _ = entry.user_input_tx.try_send(input);
            return SchedulerOutcome::Forwarded;
        }

        let session_id = format!("{}-{}", self.session_prefix, Uuid::new_v4());
        self.launch(runtime, ctx, session_id, input, listener, cancel, guard)
            .await
    }

    /// Register the in-flight entry, release the admission lock so
    /// concurrent inbounds for this identity can observe and forward into
    /// it, run the task, then briefly reacquire the lock to remove the
    /// entry.
    async fn launch(
        &self,
        runtime: &dyn AgentRuntime,
        ctx: TaskContext,
        session_id: String,
        input: UserInput,
        listener: Arc<dyn EventListener>,
        cancel: CancellationToken,
        guard: OwnedMutexGuard<()>,
    ) -> SchedulerOutcome {
        let memory_identity = ctx.memory_identity.clone();
        let (tx, rx) = mpsc::channel(8);
        self.in_flight.insert(
            memory_identity.clone(),
            InFlightEntry {
                session_id: session_id.clone(),
                user_input_tx: tx,
            },
        );
        drop(guard);

        let result = runtime
            .execute_task(ctx, session_id, input, listener, Some(rx), cancel)
            .await;

        let lock = self.lock_for(&memory_identity);
        let cleanup_guard = lock.lock_owned().await;
        self.in_flight.remove(&memory_identity);
        drop(cleanup_guard);

        match result {
            Ok(task_result) => SchedulerOutcome::Ran(task_result),
            Err(e) => SchedulerOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elephant_agent_contract::{MockAgentRuntime, NullListener, ScriptedTurn, StopReason};
    use std::time::Duration;

    fn ctx(memory_identity: &str) -> TaskContext {
        TaskContext {
            memory_identity: memory_identity.to_string(),
            chat_id: "oc_1".to_string(),
            sender_id: "ou_1".to_string(),
            is_group: false,
            agent_preset: "full".to_string(),
            tool_preset: "full".to_string(),
            reply_timeout_secs: 30,
            memory_enabled: true,
        }
    }

    #[tokio::test]
    async fn fresh_task_runs_and_cleans_up() {
        let runtime = MockAgentRuntime::default();
        runtime.queue_turn("mem-1", ScriptedTurn::completed("hi"));
        let scheduler = Scheduler::new("lark");

        let outcome = scheduler
            .admit(
                &runtime,
                ctx("mem-1"),
                UserInput::text("hello"),
                Arc::new(NullListener),
                CancellationToken::new(),
            )
            .await;

        match outcome {
            SchedulerOutcome::Ran(result) => assert_eq!(result.content, "hi"),
            _ => panic!("expected Ran"),
        }
        assert!(!scheduler.has_in_flight("mem-1"));
    }

    #[tokio::test]
    async fn second_inbound_forwards_into_in_flight_task() {
        let runtime = Arc::new(MockAgentRuntime::default());
        runtime.queue_turn(
            "mem-1",
            ScriptedTurn::completed("done").waiting_for_forward(),
        );
        let scheduler = Arc::new(Scheduler::new("lark"));

        let r1 = runtime.clone();
        let s1 = scheduler.clone();
        let handle = tokio::spawn(async move {
            s1.admit(
                r1.as_ref(),
                ctx("mem-1"),
                UserInput::text("first"),
                Arc::new(NullListener),
                CancellationToken::new(),
            )
            .await
        });

        // Give the first task a chance to register as in-flight.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scheduler.has_in_flight("mem-1"));

        let outcome = scheduler
            .admit(
                runtime.as_ref(),
                ctx("mem-1"),
                UserInput::text("second"),
                Arc::new(NullListener),
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(outcome, SchedulerOutcome::Forwarded));

        let first_outcome = handle.await.unwrap();
        assert!(matches!(first_outcome, SchedulerOutcome::Ran(_)));

        let calls = runtime.calls();
        assert_eq!(calls.len(), 1, "only one agent invocation should have happened");
        assert_eq!(
            calls[0].forwarded_input.as_ref().map(|i| i.content.as_str()),
            Some("second")
        );
    }

    #[tokio::test]
    async fn awaiting_input_session_is_reused() {
        let runtime = MockAgentRuntime::default();
        runtime.queue_turn(
            "mem-1",
            ScriptedTurn::completed("turn 1").with_stop_reason(StopReason::AwaitUserInput),
        );
        runtime.queue_turn("mem-1", ScriptedTurn::completed("turn 2"));
        let scheduler = Scheduler::new("lark");

        let first = scheduler
            .admit(
                &runtime,
                ctx("mem-1"),
                UserInput::text("start"),
                Arc::new(NullListener),
                CancellationToken::new(),
            )
            .await;
        let first_session = match first {
            SchedulerOutcome::Ran(r) => r.session_id,
            _ => panic!("expected Ran"),
        };
        runtime.set_awaiting_input("mem-1", &first_session);

        let second = scheduler
            .admit(
                &runtime,
                ctx("mem-1"),
                UserInput::text("continue"),
                Arc::new(NullListener),
                CancellationToken::new(),
            )
            .await;
        let second_session = match second {
            SchedulerOutcome::Ran(r) => r.session_id,
            _ => panic!("expected Ran"),
        };

        assert_eq!(first_session, second_session);
    }
}
