use thiserror::Error;

use crate::EngineError;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Stable label for envelopes, logs and metric attributes
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "tool_not_found",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::ExecutionFailed(_) => "execution_failed",
            ToolError::Timeout => "timeout",
            ToolError::Internal(_) => "internal",
        }
    }
}

impl From<EngineError> for ToolError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Serialization(e) => ToolError::Internal(e.to_string()),
            other => ToolError::ExecutionFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::Internal(e.to_string())
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
