use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::events::EventListener;
use crate::types::{SessionMeta, TaskContext, TaskResult, UserInput};

/// The external agent runtime's contract, as consumed by a channel gateway.
///
/// Everything behind this trait — model routing, tool execution, memory
/// recall — belongs to the runtime, not to the gateway. The gateway only
/// needs these three operations plus the [`EventListener`] callback the
/// runtime drives during `execute_task`.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Resolve (or lazily create) the session for a memory identity and
    /// report whether it is currently awaiting user input.
    async fn ensure_session(&self, memory_identity: &str) -> Result<SessionMeta>;

    /// Run one agentic turn to completion (or until it awaits input, or is
    /// cancelled). `user_input_rx`, when present, lets a second inbound
    /// message for the same memory identity be pulled into this same run
    /// instead of spawning a new one (spec §4.3 step 3).
    async fn execute_task(
        &self,
        ctx: TaskContext,
        session_id: String,
        input: UserInput,
        listener: Arc<dyn EventListener>,
        user_input_rx: Option<mpsc::Receiver<UserInput>>,
        cancel: CancellationToken,
    ) -> Result<TaskResult>;

    /// Drop all state for a memory identity's session. Used by the `/reset`
    /// slash command.
    async fn reset_session(&self, memory_identity: &str) -> Result<()>;
}
