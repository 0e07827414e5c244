use thiserror::Error;

/// Error taxonomy for the Elephant gateway, following the error-kind
/// breakdown from the gateway's design: transport, agent-runtime, store,
/// parse, duplicate, and cancellation errors are first-class variants so
/// callers can apply the right best-effort-vs-surfaced policy.
#[derive(Debug, Error)]
pub enum ElephantError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Messenger transport error: {0}")]
    Transport(String),

    #[error("Agent runtime error: {0}")]
    AgentRuntime(String),

    #[error("Plan-review store error: {0}")]
    Store(String),

    #[error("Failed to parse inbound event: {0}")]
    Parse(String),

    #[error("Duplicate inbound message")]
    Duplicate,

    #[error("Task cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ElephantError {
    /// Short error code used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ElephantError::Config(_) => "CONFIG_ERROR",
            ElephantError::Transport(_) => "TRANSPORT_ERROR",
            ElephantError::AgentRuntime(_) => "AGENT_RUNTIME_ERROR",
            ElephantError::Store(_) => "STORE_ERROR",
            ElephantError::Parse(_) => "PARSE_ERROR",
            ElephantError::Duplicate => "DUPLICATE",
            ElephantError::Cancelled => "CANCELLED",
            ElephantError::Database(_) => "DATABASE_ERROR",
            ElephantError::Serialization(_) => "SERIALIZATION_ERROR",
            ElephantError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ElephantError>;
