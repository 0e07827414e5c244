//! The contract a channel gateway needs from the external agent runtime:
//! session lifecycle, task execution, and the event stream a task emits
//! while it runs. The runtime's internals (model routing, tool execution,
//! memory recall) are deliberately not represented here.

pub mod error;
pub mod events;
pub mod mock;
pub mod runtime;
pub mod types;

pub use error::{AgentRuntimeError, Result};
pub use events::{AgentEvent, EventListener, NullListener};
pub use mock::{ExecuteCall, MockAgentRuntime, ScriptedTurn};
pub use runtime::AgentRuntime;
pub use types::{
    Attachment, PlanReviewPending, SessionMeta, StopReason, TaskContext, TaskResult, UserInput,
};
