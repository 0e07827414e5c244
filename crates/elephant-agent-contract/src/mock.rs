//! An in-memory [`AgentRuntime`] double for exercising channel gateways in
//! tests, without pulling in any real model provider. Never wired into a
//! production binary.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::events::{AgentEvent, EventListener};
use crate::runtime::AgentRuntime;
use crate::types::{PlanReviewPending, SessionMeta, StopReason, TaskContext, TaskResult, UserInput};

/// One pre-scripted response for a future `execute_task` call.
pub struct ScriptedTurn {
    pub result: TaskResult,
    /// Events replayed through the listener before returning `result`.
    pub events: Vec<AgentEvent>,
    /// When true, this turn blocks on `user_input_rx` until a forwarded
    /// [`UserInput`] arrives, simulating a still-running task that a second
    /// inbound message gets pushed into (spec §4.3 step 3 / §8 scenario 3).
    pub wait_for_forward: bool,
}

impl ScriptedTurn {
    pub fn completed(content: impl Into<String>) -> Self {
        Self {
            result: TaskResult {
                session_id: String::new(),
                content: content.into(),
                stop_reason: StopReason::Completed,
                attachments: Vec::new(),
                plan_review_pending: None,
            },
            events: Vec::new(),
            wait_for_forward: false,
        }
    }

    pub fn with_events(mut self, events: Vec<AgentEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn waiting_for_forward(mut self) -> Self {
        self.wait_for_forward = true;
        self
    }

    pub fn with_stop_reason(mut self, stop_reason: StopReason) -> Self {
        self.result.stop_reason = stop_reason;
        self
    }

    pub fn with_plan_review(
        mut self,
        run_id: impl Into<String>,
        overall_goal_ui: impl Into<String>,
        internal_plan: serde_json::Value,
    ) -> Self {
        self.result.plan_review_pending = Some(PlanReviewPending {
            run_id: run_id.into(),
            overall_goal_ui: overall_goal_ui.into(),
            internal_plan,
        });
        self
    }
}

/// A recorded call to `execute_task`, for post-hoc assertions.
#[derive(Debug, Clone)]
pub struct ExecuteCall {
    pub memory_identity: String,
    pub session_id: String,
    pub input: UserInput,
    /// The `UserInput` forwarded through `user_input_rx`, if the scripted
    /// turn waited for one.
    pub forwarded_input: Option<UserInput>,
}

#[derive(Default)]
pub struct MockAgentRuntime {
    sessions: Mutex<HashMap<String, SessionMeta>>,
    turns: Mutex<HashMap<String, VecDeque<ScriptedTurn>>>,
    calls: Mutex<Vec<ExecuteCall>>,
}

impl MockAgentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted response for the next `execute_task` call against
    /// `memory_identity`. Turns are consumed in FIFO order; once the queue
    /// is empty, calls fall back to a plain echo completion.
    pub fn queue_turn(&self, memory_identity: &str, turn: ScriptedTurn) {
        self.turns
            .lock()
            .unwrap()
            .entry(memory_identity.to_string())
            .or_default()
            .push_back(turn);
    }

    /// Make `ensure_session` report an existing session awaiting user input
    /// for `memory_identity`, so the scheduler reuses it (spec §8 scenario 4).
    pub fn set_awaiting_input(&self, memory_identity: &str, session_id: &str) {
        self.sessions.lock().unwrap().insert(
            memory_identity.to_string(),
            SessionMeta {
                session_id: session_id.to_string(),
                await_user_input: true,
            },
        );
    }

    /// Clear the awaiting-input flag, as `execute_task` would once the
    /// reused session starts running again.
    pub fn clear_awaiting_input(&self, memory_identity: &str) {
        self.sessions.lock().unwrap().remove(memory_identity);
    }

    /// Snapshot of every `execute_task` call observed so far, in order.
    pub fn calls(&self) -> Vec<ExecuteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentRuntime for MockAgentRuntime {
    async fn ensure_session(&self, memory_identity: &str) -> Result<SessionMeta> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .get(memory_identity)
            .cloned()
            .unwrap_or_else(|| SessionMeta {
                session_id: format!("mock-{memory_identity}"),
                await_user_input: false,
            }))
    }

    async fn execute_task(
        &self,
        ctx: TaskContext,
        session_id: String,
        input: UserInput,
        listener: Arc<dyn EventListener>,
        mut user_input_rx: Option<mpsc::Receiver<UserInput>>,
        _cancel: CancellationToken,
    ) -> Result<TaskResult> {
        let turn = {
            let mut turns = self.turns.lock().unwrap();
            turns
                .get_mut(&ctx.memory_identity)
                .and_then(VecDeque::pop_front)
        };

        let turn = turn.unwrap_or_else(|| ScriptedTurn::completed(format!("echo: {}", input.content)));

        for event in &turn.events {
            listener.on_event(event);
        }

        let forwarded_input = if turn.wait_for_forward {
            match user_input_rx.as_mut() {
                Some(rx) => rx.recv().await,
                None => None,
            }
        } else {
            None
        };

        self.calls.lock().unwrap().push(ExecuteCall {
            memory_identity: ctx.memory_identity,
            session_id: session_id.clone(),
            input,
            forwarded_input,
        });

        let mut result = turn.result;
        if result.session_id.is_empty() {
            result.session_id = session_id;
        }
        Ok(result)
    }

    async fn reset_session(&self, memory_identity: &str) -> Result<()> {
        self.sessions.lock().unwrap().remove(memory_identity);
        Ok(())
    }
}
