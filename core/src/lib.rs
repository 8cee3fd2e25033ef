pub mod agent;
pub mod config;
pub mod connection;
pub mod error;
pub mod tools;
pub mod traits;

#[cfg(test)]
mod testing;

pub use agent::{AgentLoop, LoopOutcome, RunOptions};
pub use config::{
    AgentConfig, BreakerConfig, Config, ConfigError, ExecutorConfig, InMemoryStore,
    SanitizerConfig, StoreError, ToolPreference, ToolServerConfig, Transport, TransportKind,
    Visibility,
};
pub use connection::{BreakerStatus, ConnectionRegistry, ConnectorFactory, TransportConfig};
pub use error::{LoopError, ToolError};
pub use tools::{
    FieldPath, ResolvedTool, SanitizeError, Sanitizer, ToolCatalog, ToolExecutor, ToolIndex,
};
pub use traits::*;
