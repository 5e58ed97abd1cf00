use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::agent::{
    AgentDefinition, ConversationThread, CreateAgentRequest, FileInfo, FilePurpose, RunOptions,
    VectorStore,
};
use crate::models::event::StreamEvent;
use crate::models::message::{MessageRole, ThreadMessage};
use crate::models::tool::ToolOutput;

pub mod http;
pub mod mock;

/// Decoded events of one streaming exchange, in arrival order.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// The remote agents service, treated as an opaque asynchronous RPC surface.
/// Every call is a suspension point; none are retried here.
#[async_trait]
pub trait AgentsService: Send + Sync {
    async fn create_agent(&self, request: CreateAgentRequest) -> Result<AgentDefinition>;

    async fn delete_agent(&self, agent_id: &str) -> Result<()>;

    async fn create_thread(&self) -> Result<ConversationThread>;

    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage>;

    /// Open one streaming exchange for the latest thread state.
    async fn create_run_stream(
        &self,
        thread_id: &str,
        agent_id: &str,
        options: &RunOptions,
    ) -> Result<EventStream>;

    /// Answer a suspended run. The returned stream continues the same
    /// exchange and must be consumed in place of the exhausted one.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<EventStream>;

    async fn upload_file(&self, path: &Path, purpose: FilePurpose) -> Result<FileInfo>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;

    async fn get_file_content(&self, file_id: &str) -> Result<Vec<u8>>;

    async fn create_vector_store(&self, file_ids: Vec<String>, name: &str) -> Result<VectorStore>;

    /// Resolve a named service connection (e.g. web grounding) to its id.
    async fn get_connection_id(&self, name: &str) -> Result<String>;
}
