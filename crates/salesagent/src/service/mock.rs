use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use super::{AgentsService, EventStream};
use crate::models::agent::{
    AgentDefinition, ConversationThread, CreateAgentRequest, FileInfo, FilePurpose, RunOptions,
    VectorStore,
};
use crate::models::event::StreamEvent;
use crate::models::message::{MessageContent, MessageRole, TextContent, ThreadMessage};
use crate::models::tool::ToolOutput;

/// In-memory service with scripted streams, recording every call. Each
/// `script_run` queues the events of one stream; `create_run_stream` and
/// `submit_tool_outputs` consume scripts in order, so a turn with one tool
/// round takes two scripts. An exhausted queue yields a bare `Done` stream.
#[derive(Default)]
pub struct MockAgentsService {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    scripts: VecDeque<Vec<StreamEvent>>,
    counter: usize,
    fail_thread_creation: bool,
    created_agents: Vec<AgentDefinition>,
    deleted_agents: Vec<String>,
    deleted_threads: Vec<String>,
    deletion_order: Vec<String>,
    posted_messages: Vec<(String, String)>,
    run_streams_opened: usize,
    submissions: Vec<(String, Vec<ToolOutput>)>,
    uploaded_files: Vec<(PathBuf, FilePurpose)>,
    vector_stores: Vec<VectorStore>,
    file_contents: HashMap<String, Vec<u8>>,
    deleted_files: Vec<String>,
}

impl MockAgentsService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the events of the next stream handed out.
    pub fn script_run(&self, events: Vec<StreamEvent>) {
        self.inner.lock().unwrap().scripts.push_back(events);
    }

    pub fn fail_thread_creation(&self) {
        self.inner.lock().unwrap().fail_thread_creation = true;
    }

    pub fn stage_file_content(&self, file_id: &str, content: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .file_contents
            .insert(file_id.to_string(), content);
    }

    pub fn created_agents(&self) -> Vec<AgentDefinition> {
        self.inner.lock().unwrap().created_agents.clone()
    }

    pub fn deleted_agents(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_agents.clone()
    }

    pub fn deleted_threads(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_threads.clone()
    }

    /// Kinds deleted, in call order ("thread" / "agent").
    pub fn deletion_order(&self) -> Vec<String> {
        self.inner.lock().unwrap().deletion_order.clone()
    }

    pub fn posted_messages(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().posted_messages.clone()
    }

    pub fn run_streams_opened(&self) -> usize {
        self.inner.lock().unwrap().run_streams_opened
    }

    pub fn submissions(&self) -> Vec<(String, Vec<ToolOutput>)> {
        self.inner.lock().unwrap().submissions.clone()
    }

    pub fn uploaded_files(&self) -> Vec<(PathBuf, FilePurpose)> {
        self.inner.lock().unwrap().uploaded_files.clone()
    }

    pub fn vector_stores(&self) -> Vec<VectorStore> {
        self.inner.lock().unwrap().vector_stores.clone()
    }

    pub fn deleted_files(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_files.clone()
    }

    fn next_stream(&self) -> EventStream {
        let events = self
            .inner
            .lock()
            .unwrap()
            .scripts
            .pop_front()
            .unwrap_or_else(|| vec![StreamEvent::Done]);
        stream::iter(events.into_iter().map(Ok::<_, anyhow::Error>)).boxed()
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.counter += 1;
        format!("{prefix}_{}", inner.counter)
    }
}

#[async_trait]
impl AgentsService for MockAgentsService {
    async fn create_agent(&self, request: CreateAgentRequest) -> Result<AgentDefinition> {
        let agent = AgentDefinition {
            id: self.next_id("agent"),
            name: request.name,
            model: request.model,
            instructions: request.instructions,
            tools: request.tools,
            temperature: request.temperature,
            top_p: request.top_p,
        };
        self.inner.lock().unwrap().created_agents.push(agent.clone());
        Ok(agent)
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.deleted_agents.push(agent_id.to_string());
        inner.deletion_order.push("agent".to_string());
        Ok(())
    }

    async fn create_thread(&self) -> Result<ConversationThread> {
        if self.inner.lock().unwrap().fail_thread_creation {
            return Err(anyhow!("thread creation refused"));
        }
        Ok(ConversationThread {
            id: self.next_id("thread"),
        })
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.deleted_threads.push(thread_id.to_string());
        inner.deletion_order.push("thread".to_string());
        Ok(())
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage> {
        self.inner
            .lock()
            .unwrap()
            .posted_messages
            .push((thread_id.to_string(), content.to_string()));
        Ok(ThreadMessage {
            id: self.next_id("msg"),
            role,
            content: vec![MessageContent::Text {
                text: TextContent {
                    value: content.to_string(),
                    annotations: Vec::new(),
                },
            }],
        })
    }

    async fn create_run_stream(
        &self,
        _thread_id: &str,
        _agent_id: &str,
        _options: &RunOptions,
    ) -> Result<EventStream> {
        self.inner.lock().unwrap().run_streams_opened += 1;
        Ok(self.next_stream())
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<EventStream> {
        self.inner
            .lock()
            .unwrap()
            .submissions
            .push((run_id.to_string(), outputs));
        Ok(self.next_stream())
    }

    async fn upload_file(&self, path: &Path, purpose: FilePurpose) -> Result<FileInfo> {
        self.inner
            .lock()
            .unwrap()
            .uploaded_files
            .push((path.to_path_buf(), purpose));
        Ok(FileInfo {
            id: self.next_id("file"),
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        })
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .deleted_files
            .push(file_id.to_string());
        Ok(())
    }

    async fn get_file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .file_contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {file_id}"))
    }

    async fn create_vector_store(&self, _file_ids: Vec<String>, name: &str) -> Result<VectorStore> {
        let store = VectorStore {
            id: self.next_id("vs"),
            name: Some(name.to_string()),
        };
        self.inner.lock().unwrap().vector_stores.push(store.clone());
        Ok(store)
    }

    async fn get_connection_id(&self, name: &str) -> Result<String> {
        Ok(format!("conn-{name}"))
    }
}
