use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use futures::future;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::assets;
use crate::lifecycle::SessionResources;
use crate::models::agent::RunOptions;
use crate::models::event::StreamEvent;
use crate::models::message::MessageRole;
use crate::models::tool::{ToolCall, ToolOutput};
use crate::service::AgentsService;
use crate::toolbox::ToolRegistry;

/// Where a turn's output goes. The driver never talks to the terminal
/// directly; the CLI supplies a colored implementation and tests a
/// recording one.
pub trait OutputSink: Send {
    /// Incremental agent text, forwarded the moment it arrives.
    fn token(&mut self, text: &str);
    /// Progress notices (file saves, retention guidance).
    fn notice(&mut self, message: &str);
    /// Failures, rendered visually distinct from agent output.
    fn error(&mut self, message: &str);
    /// A tool call about to be executed locally.
    fn tool_call(&mut self, name: &str, arguments: &Value);
}

/// Terminal outcome of one streaming exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The exchange completed; the accumulated agent text is returned for
    /// callers that want more than the incremental sink output.
    Completed { transcript: String },
    /// The run reported failure. Contained to this turn; the session
    /// remains usable.
    Failed { message: String },
}

/// Drives streaming exchanges against one thread/agent pair: posts the user
/// content, routes the event sequence, executes local tool calls and feeds
/// their results back into the same exchange.
pub struct SessionDriver<'a> {
    service: &'a dyn AgentsService,
    registry: &'a ToolRegistry,
    options: RunOptions,
    download_dir: PathBuf,
}

impl<'a> SessionDriver<'a> {
    pub fn new(
        service: &'a dyn AgentsService,
        registry: &'a ToolRegistry,
        options: RunOptions,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            service,
            registry,
            options,
            download_dir,
        }
    }

    /// Run one conversational turn to its terminal event. Transport errors
    /// propagate as turn errors for the caller to contain; a failed run is
    /// a normal outcome, not an error.
    pub async fn run_turn(
        &self,
        sink: &mut dyn OutputSink,
        resources: &SessionResources,
        content: &str,
    ) -> Result<TurnOutcome> {
        anyhow::ensure!(!content.trim().is_empty(), "cannot post an empty message");

        self.service
            .create_message(&resources.thread.id, MessageRole::User, content)
            .await
            .context("failed to post the message")?;

        let mut stream = self
            .service
            .create_run_stream(&resources.thread.id, &resources.agent.id, &self.options)
            .await
            .context("failed to open the streaming exchange")?;

        let mut transcript = String::new();
        // Per-message accumulators for text still being streamed.
        let mut in_progress: HashMap<String, String> = HashMap::new();

        loop {
            let Some(event) = stream.next().await else {
                // Transport closed without a terminal event.
                break;
            };
            match event.context("streaming exchange failed")? {
                StreamEvent::MessageCreated(message) => {
                    in_progress.insert(message.id, String::new());
                }
                StreamEvent::MessageDelta(delta) => {
                    let text = delta.text();
                    in_progress.entry(delta.id).or_default().push_str(&text);
                    transcript.push_str(&text);
                    sink.token(&text);
                }
                StreamEvent::MessageCompleted(message) => {
                    in_progress.remove(&message.id);
                    if message.has_file_content() {
                        assets::save_generated_files(
                            self.service,
                            &message,
                            &self.download_dir,
                            sink,
                        )
                        .await;
                    }
                }
                StreamEvent::RunRequiresAction(action) => {
                    let outputs = self.resolve_tool_calls(sink, &action.tool_calls).await;
                    // The continuation stream replaces the exhausted one.
                    stream = self
                        .service
                        .submit_tool_outputs(&resources.thread.id, &action.run_id, outputs)
                        .await
                        .context("failed to submit tool outputs")?;
                }
                StreamEvent::RunStepCompleted(_) => {}
                StreamEvent::RunCompleted(_) => {
                    sink.token("\n");
                }
                StreamEvent::RunFailed(run) => {
                    let message = match run.last_error {
                        Some(error) => match error.code {
                            Some(code) => format!("{} (code: {})", error.message, code),
                            None => error.message,
                        },
                        None => "the run failed without an error message".to_string(),
                    };
                    return Ok(TurnOutcome::Failed { message });
                }
                StreamEvent::Done => break,
            }
        }

        Ok(TurnOutcome::Completed { transcript })
    }

    /// Resolve a requires-action batch. Independent calls run concurrently
    /// (the read-only dataset is the only shared state); every request id is
    /// answered exactly once, with failures converted into error payloads so
    /// the remote run is never left waiting on a missing output.
    async fn resolve_tool_calls(
        &self,
        sink: &mut dyn OutputSink,
        calls: &[ToolCall],
    ) -> Vec<ToolOutput> {
        for call in calls {
            sink.tool_call(&call.name, &call.arguments);
        }

        let pending: Vec<_> = calls.iter().map(|call| self.registry.dispatch(call)).collect();
        let results = future::join_all(pending).await;

        calls
            .iter()
            .zip(results)
            .map(|(call, result)| ToolOutput {
                tool_call_id: call.id.clone(),
                output: match result {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                        json!({"error": e.to_string()}).to_string()
                    }
                },
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_sink::RecordingSink;
    use super::*;
    use crate::errors::{ToolError, ToolResult};
    use crate::models::agent::{AgentDefinition, ConversationThread};
    use crate::models::event::{MessageDelta, RequiredAction};
    use crate::models::tool::ToolDefinition;
    use crate::service::mock::MockAgentsService;
    use crate::toolbox::ToolHandler;
    use async_trait::async_trait;

    struct Uppercase;

    #[async_trait]
    impl ToolHandler for Uppercase {
        fn name(&self) -> &str {
            "uppercase"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function("uppercase", "Uppercases text", json!({"type": "object"}))
        }

        async fn call(&self, arguments: Value) -> ToolResult<String> {
            let text = arguments
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidParameters("missing 'text'".into()))?;
            Ok(text.to_uppercase())
        }
    }

    fn resources() -> SessionResources {
        SessionResources {
            agent: AgentDefinition {
                id: "agent_1".into(),
                name: "Sales Analysis Agent".into(),
                model: "gpt-4o".into(),
                instructions: "answer questions".into(),
                tools: Vec::new(),
                temperature: None,
                top_p: None,
            },
            thread: ConversationThread { id: "thread_1".into() },
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Uppercase));
        registry
    }

    fn delta(id: &str, text: &str) -> StreamEvent {
        StreamEvent::MessageDelta(
            serde_json::from_value::<MessageDelta>(json!({
                "id": id,
                "delta": {"content": [{"type": "text", "text": {"value": text}}]}
            }))
            .unwrap(),
        )
    }

    fn driver<'a>(
        service: &'a MockAgentsService,
        registry: &'a ToolRegistry,
    ) -> SessionDriver<'a> {
        SessionDriver::new(
            service,
            registry,
            RunOptions::default(),
            std::env::temp_dir(),
        )
    }

    #[tokio::test]
    async fn deltas_are_forwarded_in_arrival_order() {
        let service = MockAgentsService::new();
        service.script_run(vec![
            delta("msg_1", "Sales "),
            delta("msg_1", "by "),
            delta("msg_1", "region"),
            StreamEvent::Done,
        ]);
        let registry = registry();
        let mut sink = RecordingSink::default();

        let outcome = driver(&service, &registry)
            .run_turn(&mut sink, &resources(), "show sales by region")
            .await
            .unwrap();

        assert_eq!(sink.tokens, vec!["Sales ", "by ", "region"]);
        assert_eq!(
            outcome,
            TurnOutcome::Completed { transcript: "Sales by region".into() }
        );
        assert_eq!(service.run_streams_opened(), 1);
        assert_eq!(service.posted_messages().len(), 1);
    }

    #[tokio::test]
    async fn tool_batch_is_answered_exactly_once_each() {
        let service = MockAgentsService::new();
        service.script_run(vec![StreamEvent::RunRequiresAction(RequiredAction {
            run_id: "run_1".into(),
            tool_calls: vec![
                ToolCall::new("call_1", "uppercase", json!({"text": "one"})),
                ToolCall::new("call_2", "uppercase", json!({"text": "two"})),
            ],
        })]);
        service.script_run(vec![delta("msg_1", "ONE TWO"), StreamEvent::Done]);
        let registry = registry();
        let mut sink = RecordingSink::default();

        let outcome = driver(&service, &registry)
            .run_turn(&mut sink, &resources(), "uppercase both")
            .await
            .unwrap();

        let submissions = service.submissions();
        assert_eq!(submissions.len(), 1);
        let (run_id, outputs) = &submissions[0];
        assert_eq!(run_id, "run_1");
        let mut ids: Vec<_> = outputs.iter().map(|o| o.tool_call_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["call_1", "call_2"]);
        assert_eq!(outputs.iter().find(|o| o.tool_call_id == "call_1").unwrap().output, "ONE");
        assert_eq!(sink.tool_calls.len(), 2);
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_submits_an_error_payload() {
        let service = MockAgentsService::new();
        service.script_run(vec![StreamEvent::RunRequiresAction(RequiredAction {
            run_id: "run_1".into(),
            tool_calls: vec![ToolCall::new("call_1", "no_such_tool", json!({}))],
        })]);
        service.script_run(vec![StreamEvent::Done]);
        let registry = registry();
        let mut sink = RecordingSink::default();

        let outcome = driver(&service, &registry)
            .run_turn(&mut sink, &resources(), "call something odd")
            .await
            .unwrap();

        let submissions = service.submissions();
        assert_eq!(submissions.len(), 1);
        let output: Value = serde_json::from_str(&submissions[0].1[0].output).unwrap();
        assert!(output["error"].as_str().unwrap().contains("no_such_tool"));
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn failed_run_is_a_contained_outcome() {
        let service = MockAgentsService::new();
        service.script_run(vec![StreamEvent::parse(
            "thread.run.failed",
            r#"{"id":"run_1","last_error":{"code":"rate_limit_exceeded","message":"slow down"}}"#,
        )
        .unwrap()
        .unwrap()]);
        let registry = registry();
        let mut sink = RecordingSink::default();

        let outcome = driver(&service, &registry)
            .run_turn(&mut sink, &resources(), "anything")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Failed { message: "slow down (code: rate_limit_exceeded)".into() }
        );
    }

    #[tokio::test]
    async fn blank_content_never_opens_an_exchange() {
        let service = MockAgentsService::new();
        let registry = registry();
        let mut sink = RecordingSink::default();

        let result = driver(&service, &registry)
            .run_turn(&mut sink, &resources(), "   ")
            .await;

        assert!(result.is_err());
        assert_eq!(service.run_streams_opened(), 0);
        assert!(service.posted_messages().is_empty());
    }
}
