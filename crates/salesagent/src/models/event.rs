use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use super::agent::Run;
use super::message::ThreadMessage;
use super::tool::ToolCall;

/// One decoded event from a streaming exchange.
///
/// Deltas for a given message arrive in emission order, and a
/// `RunRequiresAction` always precedes the run step that depends on its
/// outputs; the driver relies on both.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MessageCreated(ThreadMessage),
    MessageDelta(MessageDelta),
    MessageCompleted(ThreadMessage),
    RunRequiresAction(RequiredAction),
    RunStepCompleted(RunStep),
    RunCompleted(Run),
    RunFailed(Run),
    Done,
}

/// Incremental text for an in-progress message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageDelta {
    pub id: String,
    pub delta: DeltaBody,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeltaBody {
    #[serde(default)]
    pub content: Vec<DeltaContent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaContent {
    Text {
        #[serde(default)]
        text: Option<DeltaText>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeltaText {
    #[serde(default)]
    pub value: Option<String>,
}

impl MessageDelta {
    /// The text fragments of this delta, in emission order.
    pub fn text(&self) -> String {
        self.delta
            .content
            .iter()
            .filter_map(|part| match part {
                DeltaContent::Text { text: Some(text) } => text.value.as_deref(),
                _ => None,
            })
            .collect()
    }
}

/// A run suspended on local tool execution: the batch of calls that must all
/// be answered (exactly once each) before the exchange can advance.
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredAction {
    pub run_id: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunStep {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

// Wire shape of a run carrying a submit_tool_outputs action.
#[derive(Deserialize)]
struct RunWithAction {
    id: String,
    required_action: Option<WireAction>,
}

#[derive(Deserialize)]
struct WireAction {
    submit_tool_outputs: WireToolCalls,
}

#[derive(Deserialize)]
struct WireToolCalls {
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

impl StreamEvent {
    /// Decode one server-sent event. Returns `Ok(None)` for event names the
    /// client does not route on; malformed data for a known name is an error.
    pub fn parse(event: &str, data: &str) -> Result<Option<StreamEvent>> {
        let parsed = match event {
            "thread.message.created" => {
                Some(StreamEvent::MessageCreated(decode(event, data)?))
            }
            "thread.message.delta" => Some(StreamEvent::MessageDelta(decode(event, data)?)),
            "thread.message.completed" => {
                Some(StreamEvent::MessageCompleted(decode(event, data)?))
            }
            "thread.run.requires_action" => {
                let run: RunWithAction = decode(event, data)?;
                let action = run
                    .required_action
                    .with_context(|| format!("run {} requires action without tool calls", run.id))?;
                let tool_calls = action
                    .submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|call| ToolCall {
                        id: call.id,
                        name: call.function.name,
                        // Arguments arrive as a JSON string; an unparsable one
                        // is preserved so dispatch can reject it as invalid
                        // parameters instead of dropping the request.
                        arguments: serde_json::from_str(&call.function.arguments)
                            .unwrap_or(Value::String(call.function.arguments)),
                    })
                    .collect();
                Some(StreamEvent::RunRequiresAction(RequiredAction {
                    run_id: run.id,
                    tool_calls,
                }))
            }
            "thread.run.step.completed" => {
                Some(StreamEvent::RunStepCompleted(decode(event, data)?))
            }
            "thread.run.completed" => Some(StreamEvent::RunCompleted(decode(event, data)?)),
            "thread.run.failed" => Some(StreamEvent::RunFailed(decode(event, data)?)),
            "done" => Some(StreamEvent::Done),
            _ => None,
        };
        Ok(parsed)
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T> {
    serde_json::from_str(data).with_context(|| format!("malformed `{event}` event payload"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_text_in_order() {
        let event = StreamEvent::parse(
            "thread.message.delta",
            r#"{"id":"msg_1","delta":{"content":[
                {"index":0,"type":"text","text":{"value":"Sales "}},
                {"index":0,"type":"text","text":{"value":"by region"}}
            ]}}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            StreamEvent::MessageDelta(delta) => assert_eq!(delta.text(), "Sales by region"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn requires_action_extracts_calls_and_parses_arguments() {
        let event = StreamEvent::parse(
            "thread.run.requires_action",
            r#"{"id":"run_1","status":"requires_action","required_action":{
                "type":"submit_tool_outputs",
                "submit_tool_outputs":{"tool_calls":[
                    {"id":"call_1","type":"function","function":{
                        "name":"fetch_sales_data",
                        "arguments":"{\"query\":\"SELECT 1\"}"}}
                ]}}}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            StreamEvent::RunRequiresAction(action) => {
                assert_eq!(action.run_id, "run_1");
                assert_eq!(action.tool_calls.len(), 1);
                assert_eq!(action.tool_calls[0].name, "fetch_sales_data");
                assert_eq!(action.tool_calls[0].arguments["query"], "SELECT 1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unparsable_arguments_are_preserved_as_text() {
        let event = StreamEvent::parse(
            "thread.run.requires_action",
            r#"{"id":"run_1","required_action":{
                "type":"submit_tool_outputs",
                "submit_tool_outputs":{"tool_calls":[
                    {"id":"call_1","type":"function","function":{
                        "name":"fetch_sales_data","arguments":"not json"}}
                ]}}}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            StreamEvent::RunRequiresAction(action) => {
                assert_eq!(action.tool_calls[0].arguments, Value::String("not json".into()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn failed_run_carries_last_error() {
        let event = StreamEvent::parse(
            "thread.run.failed",
            r#"{"id":"run_1","status":"failed","last_error":{
                "code":"rate_limit_exceeded","message":"slow down"}}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            StreamEvent::RunFailed(run) => {
                let error = run.last_error.unwrap();
                assert_eq!(error.code.as_deref(), Some("rate_limit_exceeded"));
                assert_eq!(error.message, "slow down");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unrouted_events_are_skipped() {
        assert_eq!(
            StreamEvent::parse("thread.run.step.delta", "{}").unwrap(),
            None
        );
        assert_eq!(
            StreamEvent::parse("done", "[DONE]").unwrap(),
            Some(StreamEvent::Done)
        );
    }
}
