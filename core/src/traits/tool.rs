use crate::error::ToolError;
use crate::traits::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// A tool as advertised by a tool server. Fetched live, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Option<Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: Some(input_schema),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: self.name.clone(),
                description: self.description.clone().unwrap_or_default(),
                parameters: self
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            },
        }
    }
}

/// Function-calling representation of a tool, as sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: Result<String, ToolError>,
    pub elapsed: Duration,
}

impl ToolCallResult {
    pub fn success(request: &ToolCall, payload: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            outcome: Ok(payload.into()),
            elapsed,
        }
    }

    pub fn failure(request: &ToolCall, error: ToolError, elapsed: Duration) -> Self {
        Self {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            outcome: Err(error),
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&ToolError> {
        self.outcome.as_ref().err()
    }

    /// Text fed back to the model as the tool message content.
    pub fn content(&self) -> String {
        match &self.outcome {
            Ok(payload) => payload.clone(),
            Err(e) => format!("Error: {e}"),
        }
    }
}
