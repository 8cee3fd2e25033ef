pub mod connector;
pub mod provider;
pub mod store;
pub mod tool;

pub use connector::{Connector, ConnectorBuilder};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, Provider, ToolCall};
pub use store::ConfigStore;
pub use tool::{FunctionSpec, ToolCallResult, ToolDefinition, ToolSpec};
