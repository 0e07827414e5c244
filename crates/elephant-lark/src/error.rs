use thiserror::Error;

#[derive(Debug, Error)]
pub enum LarkError {
    #[error("messenger transport error: {0}")]
    Transport(String),

    #[error("agent runtime error: {0}")]
    AgentRuntime(#[from] elephant_agent_contract::AgentRuntimeError),

    #[error("plan-review store error: {0}")]
    Store(String),

    #[error("failed to parse inbound event: {0}")]
    Parse(String),
}

impl LarkError {
    pub fn from_rusqlite(e: rusqlite::Error) -> Self {
        LarkError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LarkError>;
