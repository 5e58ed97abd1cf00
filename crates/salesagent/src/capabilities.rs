use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::models::agent::FilePurpose;
use crate::models::tool::{
    CodeInterpreterResources, FileSearchResources, ToolDefinition, ToolResources,
};
use crate::service::AgentsService;
use crate::toolbox::ToolRegistry;

/// One configuration-selected capability of the agent. The set is evaluated
/// exactly once, at initialization, into the final declared tool list.
#[derive(Debug, Clone)]
pub enum Capability {
    /// Locally executed function tools, declared from the registry.
    Functions,
    /// Remote document retrieval over an uploaded file set.
    FileSearch {
        files: Vec<PathBuf>,
        store_name: String,
    },
    /// Remote code execution, optionally with a font bundle for chart
    /// rendering in non-Latin scripts.
    CodeInterpreter { font_file: Option<PathBuf> },
    /// Web grounding through a named service connection.
    WebGrounding { connection_name: String },
}

/// The evaluated capability set: what the agent definition declares, plus
/// the uploaded font id needed for instruction substitution.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    pub tools: Vec<ToolDefinition>,
    pub tool_resources: Option<ToolResources>,
    pub font_file_id: Option<String>,
}

pub async fn build(
    service: &dyn AgentsService,
    registry: &ToolRegistry,
    capabilities: &[Capability],
) -> Result<CapabilitySet> {
    let mut set = CapabilitySet::default();
    let mut resources = ToolResources::default();

    for capability in capabilities {
        match capability {
            Capability::Functions => {
                set.tools.extend(registry.definitions());
            }
            Capability::FileSearch { files, store_name } => {
                let mut file_ids = Vec::with_capacity(files.len());
                for file in files {
                    let info = service
                        .upload_file(file, FilePurpose::AgentInput)
                        .await
                        .with_context(|| format!("failed to upload {}", file.display()))?;
                    tracing::info!(file_id = %info.id, file = %file.display(), "uploaded file");
                    file_ids.push(info.id);
                }
                let store = service
                    .create_vector_store(file_ids, store_name)
                    .await
                    .context("failed to create vector store")?;
                tracing::info!(vector_store_id = %store.id, "created vector store");
                set.tools.push(ToolDefinition::FileSearch);
                resources.file_search = Some(FileSearchResources {
                    vector_store_ids: vec![store.id],
                });
            }
            Capability::CodeInterpreter { font_file } => {
                if let Some(font_file) = font_file {
                    let info = service
                        .upload_file(font_file, FilePurpose::AgentInput)
                        .await
                        .with_context(|| format!("failed to upload {}", font_file.display()))?;
                    tracing::info!(file_id = %info.id, "uploaded font bundle");
                    resources.code_interpreter = Some(CodeInterpreterResources {
                        file_ids: vec![info.id.clone()],
                    });
                    set.font_file_id = Some(info.id);
                }
                set.tools.push(ToolDefinition::CodeInterpreter);
            }
            Capability::WebGrounding { connection_name } => {
                let connection_id = service
                    .get_connection_id(connection_name)
                    .await
                    .with_context(|| format!("no connection named '{connection_name}'"))?;
                set.tools.push(ToolDefinition::web_grounding(connection_id));
            }
        }
    }

    if !resources.is_empty() {
        set.tool_resources = Some(resources);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::mock::MockAgentsService;

    #[tokio::test]
    async fn empty_configuration_declares_nothing() {
        let service = MockAgentsService::new();
        let set = build(&service, &ToolRegistry::new(), &[]).await.unwrap();
        assert!(set.tools.is_empty());
        assert!(set.tool_resources.is_none());
        assert!(set.font_file_id.is_none());
    }

    #[tokio::test]
    async fn file_search_uploads_and_creates_a_store() {
        let service = MockAgentsService::new();
        let set = build(
            &service,
            &ToolRegistry::new(),
            &[Capability::FileSearch {
                files: vec![PathBuf::from("datasheet/tents.pdf")],
                store_name: "Product Information".into(),
            }],
        )
        .await
        .unwrap();

        assert_eq!(set.tools, vec![ToolDefinition::FileSearch]);
        let resources = set.tool_resources.unwrap();
        let store_ids = resources.file_search.unwrap().vector_store_ids;
        assert_eq!(store_ids.len(), 1);
        assert_eq!(service.uploaded_files().len(), 1);
        assert_eq!(service.vector_stores().len(), 1);
    }

    #[tokio::test]
    async fn code_interpreter_font_feeds_instruction_substitution() {
        let service = MockAgentsService::new();
        let set = build(
            &service,
            &ToolRegistry::new(),
            &[Capability::CodeInterpreter {
                font_file: Some(PathBuf::from("fonts/fonts.zip")),
            }],
        )
        .await
        .unwrap();

        assert_eq!(set.tools, vec![ToolDefinition::CodeInterpreter]);
        let font_id = set.font_file_id.unwrap();
        let resources = set.tool_resources.unwrap();
        assert_eq!(resources.code_interpreter.unwrap().file_ids, vec![font_id]);
    }

    #[tokio::test]
    async fn web_grounding_resolves_the_named_connection() {
        let service = MockAgentsService::new();
        let set = build(
            &service,
            &ToolRegistry::new(),
            &[Capability::WebGrounding {
                connection_name: "bing-search".into(),
            }],
        )
        .await
        .unwrap();

        match &set.tools[0] {
            ToolDefinition::BingGrounding { bing_grounding } => {
                assert_eq!(
                    bing_grounding.connections[0].connection_id,
                    "conn-bing-search"
                );
            }
            other => panic!("unexpected tool: {other:?}"),
        }
    }
}
