use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentRuntimeError {
    #[error("session error: {0}")]
    Session(String),

    #[error("task execution failed: {0}")]
    Execution(String),

    #[error("task cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AgentRuntimeError>;
