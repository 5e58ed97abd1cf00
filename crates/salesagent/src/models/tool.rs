use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A capability declared on the agent definition. The function variant is
/// backed by a local handler; the others are executed remotely and only need
/// declaring (plus resources / a connection id where applicable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function { function: FunctionSpec },
    FileSearch,
    CodeInterpreter,
    BingGrounding { bing_grounding: WebGroundingSpec },
}

impl ToolDefinition {
    pub fn function<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolDefinition::Function {
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn web_grounding<S: Into<String>>(connection_id: S) -> Self {
        ToolDefinition::BingGrounding {
            bing_grounding: WebGroundingSpec {
                connections: vec![ToolConnection {
                    connection_id: connection_id.into(),
                }],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebGroundingSpec {
    pub connections: Vec<ToolConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConnection {
    pub connection_id: String,
}

/// Per-capability resources attached at agent creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_search: Option<FileSearchResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_interpreter: Option<CodeInterpreterResources>,
}

impl ToolResources {
    pub fn is_empty(&self) -> bool {
        self.file_search.is_none() && self.code_interpreter.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSearchResources {
    pub vector_store_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeInterpreterResources {
    pub file_ids: Vec<String>,
}

/// A request, delivered mid-stream, for the client to execute a named local
/// capability. `id` correlates the eventual output with this request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<I, N>(id: I, name: N, arguments: Value) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The answer to one [`ToolCall`], keyed by its correlation id. Every request
/// observed on a stream must be answered by exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn function_definition_wire_shape() {
        let tool = ToolDefinition::function(
            "fetch_sales_data",
            "Run a query",
            json!({"type": "object"}),
        );
        let wire = serde_json::to_value(&tool).unwrap();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "fetch_sales_data");
    }

    #[test]
    fn remote_tools_serialize_as_bare_types() {
        assert_eq!(
            serde_json::to_value(ToolDefinition::CodeInterpreter).unwrap(),
            json!({"type": "code_interpreter"})
        );
        let grounding = serde_json::to_value(ToolDefinition::web_grounding("conn-1")).unwrap();
        assert_eq!(grounding["type"], "bing_grounding");
        assert_eq!(
            grounding["bing_grounding"]["connections"][0]["connection_id"],
            "conn-1"
        );
    }
}
