use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a locally executed tool call. These are returned to the remote
/// agent as structured error payloads rather than raised, so the model can
/// observe the failure and retry with corrected arguments.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ToolResult<T> = Result<T, ToolError>;
