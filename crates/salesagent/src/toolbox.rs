use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{ToolError, ToolResult};
use crate::models::tool::{ToolCall, ToolDefinition};

/// A named local capability the remote agent can invoke by name + arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    /// The declaration included in the agent definition's tool set.
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, arguments: Value) -> ToolResult<String>;
}

/// Static name → handler map, resolved once at startup. Dispatch is a plain
/// lookup; there is no registration after initialization.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Declarations for every registered handler, sorted by name so the
    /// agent definition is deterministic.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.handlers[name].definition())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve one tool call. An unregistered name is an error value, not a
    /// silently dropped request; the driver turns it into an error payload
    /// submission so the remote run is never left waiting.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult<String> {
        let handler = self
            .handlers
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        handler.call(call.arguments.clone()).await
    }
}
