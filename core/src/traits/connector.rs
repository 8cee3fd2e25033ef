use crate::config::ToolServerConfig;
use crate::connection::TransportConfig;
use crate::traits::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Live handle to one tool server, independent of its transport.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDefinition>>;

    /// Invoke a tool. The raw result shape is server specific and is
    /// classified by the executor.
    async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<Value>;

    fn is_alive(&self) -> bool {
        true
    }

    /// Resolves once the underlying process or session has ended.
    async fn terminated(&self) {
        std::future::pending::<()>().await
    }

    async fn shutdown(&self) {}
}

#[async_trait]
pub trait ConnectorBuilder: Send + Sync {
    async fn build(
        &self,
        server: &ToolServerConfig,
        transport: &TransportConfig,
    ) -> anyhow::Result<Arc<dyn Connector>>;
}
