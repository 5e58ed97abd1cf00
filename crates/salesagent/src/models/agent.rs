use serde::{Deserialize, Serialize};

use super::tool::{ToolDefinition, ToolResources};

/// The remote-side configuration object for one conversational session.
/// Created once at startup, immutable afterwards, deleted at shutdown unless
/// the user opts to retain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub model: String,
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAgentRequest {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_resources: Option<ToolResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// The remote-side ordered message history, scoped to one agent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub id: String,
}

/// Handle for a file uploaded to or generated by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePurpose {
    /// Input made available to the agent (datasheets, font bundles).
    #[serde(rename = "assistants")]
    AgentInput,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilePurpose::AgentInput => "assistants",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Per-run budgets and sampling overrides, passed when opening a streaming
/// exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// One streamed exchange over a thread. Only the fields the client routes on
/// are decoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}
