use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::capabilities::{self, Capability};
use crate::instructions::render_instructions_file;
use crate::models::agent::{AgentDefinition, ConversationThread, CreateAgentRequest};
use crate::service::AgentsService;
use crate::toolbox::ToolRegistry;

/// Startup configuration for the remote session resources.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub agent_name: String,
    pub model: String,
    /// Template the agent instructions are rendered from. Without one there
    /// is nothing meaningful to create, so initialization fails fast.
    pub instructions_file: Option<PathBuf>,
    pub capabilities: Vec<Capability>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// The paired remote resources for one run: an agent definition and the
/// conversation thread scoped to it. Always released together, thread first.
#[derive(Debug, Clone)]
pub struct SessionResources {
    pub agent: AgentDefinition,
    pub thread: ConversationThread,
}

/// Acquire the remote session resources. Uploads and capability evaluation
/// happen before agent creation so the instruction substitutions (schema
/// description, font file id) are available. If the thread cannot be created
/// after the agent exists, the agent is deleted again before the error
/// propagates: a partial initialization never leaks remote resources.
pub async fn initialize(
    service: &dyn AgentsService,
    registry: &ToolRegistry,
    schema_description: &str,
    options: &InitOptions,
) -> Result<SessionResources> {
    let Some(instructions_file) = options.instructions_file.as_ref() else {
        bail!("no instructions template configured");
    };

    let capability_set = capabilities::build(service, registry, &options.capabilities).await?;

    let mut context: HashMap<&str, &str> = HashMap::new();
    context.insert("database_schema_string", schema_description);
    if let Some(font_file_id) = capability_set.font_file_id.as_deref() {
        context.insert("font_file_id", font_file_id);
    }
    let instructions = render_instructions_file(instructions_file, &context)
        .with_context(|| format!("failed to render {}", instructions_file.display()))?;

    let agent = service
        .create_agent(CreateAgentRequest {
            model: options.model.clone(),
            name: options.agent_name.clone(),
            instructions,
            tools: capability_set.tools,
            tool_resources: capability_set.tool_resources,
            temperature: options.temperature,
            top_p: options.top_p,
        })
        .await
        .context("failed to create agent")?;
    tracing::info!(agent_id = %agent.id, "created agent");

    let thread = match service.create_thread().await {
        Ok(thread) => thread,
        Err(e) => {
            if let Err(delete_err) = service.delete_agent(&agent.id).await {
                tracing::warn!(agent_id = %agent.id, error = %delete_err,
                    "failed to delete agent while unwinding initialization");
            }
            return Err(e).context("failed to create thread");
        }
    };
    tracing::info!(thread_id = %thread.id, "created thread");

    Ok(SessionResources { agent, thread })
}

/// Release the remote resources, thread before agent since the thread is
/// scoped to its agent. Best-effort: failures are logged and never block
/// shutdown. A `None` means nothing was created and this is a no-op.
pub async fn cleanup(service: &dyn AgentsService, resources: Option<SessionResources>) {
    let Some(resources) = resources else {
        return;
    };
    if let Err(e) = service.delete_thread(&resources.thread.id).await {
        tracing::warn!(thread_id = %resources.thread.id, error = %e, "failed to delete thread");
    }
    if let Err(e) = service.delete_agent(&resources.agent.id).await {
        tracing::warn!(agent_id = %resources.agent.id, error = %e, "failed to delete agent");
    }
}
