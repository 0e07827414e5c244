use serde_json::Value;

/// Events published by the agent runtime over the course of one task.
///
/// Decorators built around a single [`EventListener`] observe every variant
/// and react to the ones they care about; see `elephant_lark::listener`.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Emitted early in a task to suggest a reaction emoji. The gateway's
    /// emoji decorator reacts exactly once per task regardless of how many
    /// times (if ever) this fires.
    PreAnalysisEmoji { emoji: String },

    /// A tool call began.
    ToolStarted { call_id: String, tool_name: String },

    /// A tool call finished, successfully or not.
    ToolCompleted {
        call_id: String,
        tool_name: String,
        duration_secs: f64,
        error: Option<String>,
        /// Present for `plan`/`clarify` tool calls: carries
        /// `overall_goal_ui` / `question_to_user` / `needs_user_input`.
        metadata: Option<Value>,
    },

    /// A background workflow was handed off to an external agent.
    BackgroundTaskDispatched { task_id: String, summary: String },

    /// Periodic progress update for a dispatched background task.
    ExternalAgentProgress { task_id: String, summary: String },

    /// The background task needs input from the user before it can proceed.
    ExternalInputRequested { task_id: String, question: String },

    /// The background task finished.
    BackgroundTaskCompleted {
        task_id: String,
        summary: String,
        error: Option<String>,
    },
}

/// Single-method observer the agent runtime drives every event through.
///
/// Implementations that wrap another listener (decorators) must forward
/// every event to the inner listener — "forward first, react second" —
/// so the inner listener always sees the complete event stream.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &AgentEvent);
}

/// A listener that does nothing; the innermost link of a decorator chain
/// when the caller supplies no observer of its own.
pub struct NullListener;

impl EventListener for NullListener {
    fn on_event(&self, _event: &AgentEvent) {}
}
