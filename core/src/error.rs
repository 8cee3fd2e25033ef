use crate::tools::sanitizer::SanitizeError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single tool call.
///
/// Every variant is scoped to one call: the executor turns it into a tool
/// result that is fed back to the model, it never aborts the agent loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Invalid tool server configuration: {reason}")]
    Configuration { reason: String },

    #[error("Failed to connect to tool server '{server}': {reason}")]
    Connection { server: String, reason: String },

    #[error(
        "Tool server '{server}' is temporarily unavailable (circuit open, retry in {}s)",
        retry_in.as_secs().max(1)
    )]
    CircuitOpen { server: String, retry_in: Duration },

    #[error("Tool '{name}' not found")]
    NotFound { name: String },

    #[error("Invalid arguments for tool '{name}': {source}")]
    InvalidArguments {
        name: String,
        #[source]
        source: SanitizeError,
    },

    #[error("Tool '{name}' failed: {reason}")]
    Execution { name: String, reason: String },

    #[error("Tool '{name}' timed out after {}ms", timeout.as_millis())]
    Timeout { name: String, timeout: Duration },
}

/// Reason an agent loop invocation terminated without a final answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopError {
    #[error("Max iterations reached ({limit})")]
    MaxIterations { limit: usize },

    #[error("Total timeout of {}ms exceeded", limit.as_millis())]
    Timeout { limit: Duration },

    #[error("Completion provider failed: {0}")]
    Provider(String),

    #[error("Empty response from model: no content or tool calls")]
    EmptyResponse,
}
