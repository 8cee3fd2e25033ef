use crate::config::ToolServerConfig;
use async_trait::async_trait;
use uuid::Uuid;

/// Read access to tool-server definitions and per-user tool preferences.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn owned_servers(&self, user_id: &str) -> anyhow::Result<Vec<ToolServerConfig>>;

    async fn global_servers(&self) -> anyhow::Result<Vec<ToolServerConfig>>;

    /// Stored preference, `None` when the user never toggled the tool.
    async fn tool_preference(
        &self,
        user_id: &str,
        server_id: Uuid,
        tool_name: &str,
    ) -> anyhow::Result<Option<bool>>;

    async fn is_tool_enabled(
        &self,
        user_id: &str,
        server_id: Uuid,
        tool_name: &str,
    ) -> anyhow::Result<bool> {
        Ok(self
            .tool_preference(user_id, server_id, tool_name)
            .await?
            .unwrap_or(true))
    }
}
