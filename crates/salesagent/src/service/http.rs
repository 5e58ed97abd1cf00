use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::multipart;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

use super::{AgentsService, EventStream};
use crate::models::agent::{
    AgentDefinition, ConversationThread, CreateAgentRequest, FileInfo, FilePurpose, RunOptions,
    VectorStore,
};
use crate::models::event::StreamEvent;
use crate::models::message::{MessageRole, ThreadMessage};
use crate::models::tool::ToolOutput;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the agents service project endpoint.
    pub endpoint: String,
    /// Opaque credential, sent as a bearer token.
    pub api_key: String,
}

/// Agents service over REST + server-sent events.
pub struct HttpAgentsService {
    client: Client,
    config: ServiceConfig,
}

impl HttpAgentsService {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.endpoint.trim_end_matches('/'))
    }

    async fn post_json(&self, path: &str, payload: &Value) -> Result<Value> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(path))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Open one streaming request and decode its server-sent events. Events
    /// the client does not route on are dropped here; transport and decode
    /// failures surface as stream errors.
    async fn open_stream(&self, path: &str, payload: &Value) -> Result<EventStream> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .header("Accept", "text/event-stream")
            .json(payload)
            .send()
            .await?;
        let response = check_status(response).await?;

        let events = response.bytes_stream().eventsource().filter_map(|item| async move {
            match item {
                Ok(event) => match StreamEvent::parse(&event.event, &event.data) {
                    Ok(Some(decoded)) => Some(Ok(decoded)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(anyhow!("stream transport error: {e}"))),
            }
        });
        Ok(events.boxed())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
            Err(anyhow!("Server error: {}", status))
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!("Request failed: {status}\n{body}"))
        }
    }
}

async fn parse_json(response: Response) -> Result<Value> {
    let response = check_status(response).await?;
    Ok(response.json().await?)
}

fn run_payload(agent_id: &str, options: &RunOptions) -> Value {
    let mut payload = json!({
        "assistant_id": agent_id,
        "stream": true,
    });
    if let Value::Object(overrides) = serde_json::to_value(options).unwrap_or_default() {
        payload.as_object_mut().unwrap().extend(overrides);
    }
    payload
}

#[async_trait]
impl AgentsService for HttpAgentsService {
    async fn create_agent(&self, request: CreateAgentRequest) -> Result<AgentDefinition> {
        let response = self
            .post_json("assistants", &serde_json::to_value(&request)?)
            .await?;
        serde_json::from_value(response).context("malformed agent payload")
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        self.delete(&format!("assistants/{agent_id}")).await
    }

    async fn create_thread(&self) -> Result<ConversationThread> {
        let response = self.post_json("threads", &json!({})).await?;
        serde_json::from_value(response).context("malformed thread payload")
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.delete(&format!("threads/{thread_id}")).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage> {
        let response = self
            .post_json(
                &format!("threads/{thread_id}/messages"),
                &json!({"role": role, "content": content}),
            )
            .await?;
        serde_json::from_value(response).context("malformed message payload")
    }

    async fn create_run_stream(
        &self,
        thread_id: &str,
        agent_id: &str,
        options: &RunOptions,
    ) -> Result<EventStream> {
        self.open_stream(
            &format!("threads/{thread_id}/runs"),
            &run_payload(agent_id, options),
        )
        .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<EventStream> {
        self.open_stream(
            &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &json!({"tool_outputs": outputs, "stream": true}),
        )
        .await
    }

    async fn upload_file(&self, path: &Path, purpose: FilePurpose) -> Result<FileInfo> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let form = multipart::Form::new()
            .text("purpose", purpose.as_str())
            .part("file", multipart::Part::bytes(content).file_name(file_name));

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;
        serde_json::from_value(parse_json(response).await?).context("malformed file payload")
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.delete(&format!("files/{file_id}")).await
    }

    async fn get_file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("files/{file_id}/content")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn create_vector_store(&self, file_ids: Vec<String>, name: &str) -> Result<VectorStore> {
        let response = self
            .post_json("vector_stores", &json!({"file_ids": file_ids, "name": name}))
            .await?;
        serde_json::from_value(response).context("malformed vector store payload")
    }

    async fn get_connection_id(&self, name: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("connections/{name}")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let payload = parse_json(response).await?;
        payload
            .get("id")
            .and_then(|id| id.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("connection '{name}' has no id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service_for(server: &MockServer) -> HttpAgentsService {
        HttpAgentsService::new(ServiceConfig {
            endpoint: server.uri(),
            api_key: "test_api_key".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_agent_round_trips_the_definition() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .and(body_partial_json(json!({"model": "gpt-4o", "name": "Sales Analysis Agent"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "agent_abc",
                "name": "Sales Analysis Agent",
                "model": "gpt-4o",
                "instructions": "answer sales questions",
                "tools": [{"type": "code_interpreter"}],
                "temperature": 0.1
            })))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let agent = service
            .create_agent(CreateAgentRequest {
                model: "gpt-4o".into(),
                name: "Sales Analysis Agent".into(),
                instructions: "answer sales questions".into(),
                tools: Vec::new(),
                tool_resources: None,
                temperature: Some(0.1),
                top_p: None,
            })
            .await?;

        assert_eq!(agent.id, "agent_abc");
        assert_eq!(agent.temperature, Some(0.1));
        Ok(())
    }

    #[tokio::test]
    async fn run_stream_decodes_server_sent_events() -> Result<()> {
        let sse_body = concat!(
            "event: thread.run.created\n",
            "data: {\"id\":\"run_1\"}\n\n",
            "event: thread.message.delta\n",
            "data: {\"id\":\"msg_1\",\"delta\":{\"content\":[{\"type\":\"text\",\"text\":{\"value\":\"Hi\"}}]}}\n\n",
            "event: thread.run.completed\n",
            "data: {\"id\":\"run_1\",\"status\":\"completed\"}\n\n",
            "event: done\n",
            "data: [DONE]\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/runs"))
            .and(body_partial_json(json!({"assistant_id": "agent_1", "stream": true})))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let stream = service
            .create_run_stream("thread_1", "agent_1", &RunOptions::default())
            .await?;
        let events: Vec<StreamEvent> = stream.try_collect().await?;

        // thread.run.created is not routed on and is dropped in decoding.
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], StreamEvent::MessageDelta(d) if d.text() == "Hi"));
        assert!(matches!(events[1], StreamEvent::RunCompleted(_)));
        assert_eq!(events[2], StreamEvent::Done);
        Ok(())
    }

    #[tokio::test]
    async fn client_errors_carry_the_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let service = service_for(&server).await;
        let err = service.create_thread().await.unwrap_err();
        assert!(err.to_string().contains("bad request"));
    }

    #[test]
    fn run_payload_carries_budgets_and_sampling() {
        let payload = run_payload(
            "agent_1",
            &RunOptions {
                max_completion_tokens: Some(10240),
                max_prompt_tokens: Some(20480),
                temperature: Some(0.1),
                top_p: Some(0.1),
            },
        );
        assert_eq!(payload["assistant_id"], "agent_1");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["max_completion_tokens"], 10240);
        assert_eq!(payload["max_prompt_tokens"], 20480);
    }
}
