use serde::{Deserialize, Serialize};

/// Metadata the agent runtime reports back for a given memory identity when
/// asked to `ensure_session`. Tells the scheduler whether a prior session
/// for this identity is still awaiting user input (and therefore must be
/// reused rather than replaced by a freshly minted session id).
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub session_id: String,
    pub await_user_input: bool,
}

/// A chunk of user-authored content pushed into a running task, either as
/// the initial turn or as a forwarded message while the task is in flight.
#[derive(Debug, Clone)]
pub struct UserInput {
    pub content: String,
    /// Raw attachment payloads carried alongside the text, if any.
    pub attachments: Vec<serde_json::Value>,
}

impl UserInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
        }
    }
}

/// Why a task run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    AwaitUserInput,
    Error,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Completed => "completed",
            StopReason::AwaitUserInput => "await_user_input",
            StopReason::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// An attachment as returned in the agent's final result map. The gateway
/// never mutates this once received — only filters and dispatches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    #[serde(default)]
    pub uri: Option<String>,
    /// Base64-encoded inline payload, mutually exclusive with `uri` in
    /// practice but not enforced here — the fetch helper tries both.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub preview_profile: Option<String>,
}

impl Attachment {
    /// True when this attachment is a rich A2UI descriptor the gateway must
    /// never dispatch as an image or file (spec §4.7 step 1).
    pub fn is_a2ui(&self) -> bool {
        self.media_type.contains("a2ui")
            || self.format.as_deref() == Some("a2ui")
            || self
                .preview_profile
                .as_deref()
                .is_some_and(|p| p.contains("a2ui"))
    }
}

/// The outcome of one `execute_task` call.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub session_id: String,
    pub content: String,
    pub stop_reason: StopReason,
    pub attachments: Vec<Attachment>,
    /// Present when `stop_reason == AwaitUserInput` and the agent emitted a
    /// `<plan_review_pending>` block in its messages.
    pub plan_review_pending: Option<PlanReviewPending>,
}

/// Parsed contents of a `<plan_review_pending>` block, ready to hand to the
/// plan-review store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReviewPending {
    pub run_id: String,
    pub overall_goal_ui: String,
    pub internal_plan: serde_json::Value,
}

/// Everything `execute_task` needs beyond the session id and user input.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub memory_identity: String,
    pub chat_id: String,
    pub sender_id: String,
    pub is_group: bool,
    pub agent_preset: String,
    pub tool_preset: String,
    pub reply_timeout_secs: u64,
    /// Whether the runtime should consult/update the memory service for
    /// this task, per the channel's `memory_enabled` configuration.
    pub memory_enabled: bool,
}
