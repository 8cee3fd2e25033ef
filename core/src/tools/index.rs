use crate::config::ToolServerConfig;
use crate::connection::ConnectionRegistry;
use crate::error::ToolError;
use crate::traits::{ConfigStore, ToolDefinition, ToolSpec};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool name resolved to the server that owns it for a given user.
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub server: ToolServerConfig,
    pub definition: ToolDefinition,
}

/// Snapshot of the tools a user can call, taken from one listing pass.
///
/// Entries keep aggregation order with duplicates dropped, so a lookup
/// returns the same server `ToolIndex::resolve` would. Servers that could not
/// be listed are remembered so a miss can say why.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ResolvedTool>,
    skipped: Vec<ToolError>,
}

impl ToolCatalog {
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.definition.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn resolve(&self, tool_name: &str) -> Result<ResolvedTool, ToolError> {
        if let Some(tool) = self.tools.iter().find(|t| t.definition.name == tool_name) {
            return Ok(tool.clone());
        }

        // A skipped server might have owned the tool, so report why it was skipped.
        let circuit_open = self
            .skipped
            .iter()
            .find(|e| matches!(e, ToolError::CircuitOpen { .. }));
        Err(circuit_open
            .or(self.skipped.first())
            .cloned()
            .unwrap_or_else(|| ToolError::NotFound {
                name: tool_name.to_string(),
            }))
    }
}

struct ServerTools {
    server: ToolServerConfig,
    tools: Vec<ToolDefinition>,
}

/// Per-user view of every tool exposed by the servers the user can see.
///
/// Servers are ordered user-owned first, then global, each group by name.
/// When two servers expose the same tool name the first one in that order
/// owns it.
pub struct ToolIndex {
    store: Arc<dyn ConfigStore>,
    registry: Arc<ConnectionRegistry>,
    list_timeout: Duration,
}

impl ToolIndex {
    pub fn new(store: Arc<dyn ConfigStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            list_timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub async fn visible_servers(&self, user_id: &str) -> anyhow::Result<Vec<ToolServerConfig>> {
        let mut owned = self.store.owned_servers(user_id).await?;
        let mut global = self.store.global_servers().await?;

        owned.retain(|s| s.enabled);
        global.retain(|s| s.enabled);
        owned.sort_by(|a, b| a.name.cmp(&b.name));
        global.sort_by(|a, b| a.name.cmp(&b.name));

        owned.extend(global);
        Ok(owned)
    }

    /// Lists every visible server concurrently. Each listing is bounded by
    /// the listing timeout, so one stuck server delays the catalog by at most
    /// that long.
    pub async fn load_catalog(&self, user_id: &str) -> anyhow::Result<ToolCatalog> {
        let servers = self.visible_servers(user_id).await?;
        let loaded = join_all(servers.into_iter().map(|s| self.load_server(s, user_id))).await;

        let mut seen = HashSet::new();
        let mut catalog = ToolCatalog::default();
        for entry in loaded {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(user_id, error = %e, "Skipping tool server");
                    catalog.skipped.push(e);
                    continue;
                }
            };

            for definition in entry.tools {
                if seen.insert(definition.name.clone()) {
                    catalog.tools.push(ResolvedTool {
                        server: entry.server.clone(),
                        definition,
                    });
                } else {
                    warn!(
                        tool = %definition.name,
                        server = %entry.server.name,
                        "Duplicate tool name, keeping the earlier server's tool"
                    );
                }
            }
        }

        debug!(user_id, count = catalog.len(), "Aggregated tools");
        Ok(catalog)
    }

    /// Like `load_catalog`, but a store failure yields an empty catalog.
    pub async fn catalog_for_user(&self, user_id: &str) -> ToolCatalog {
        match self.load_catalog(user_id).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(user_id, error = %format!("{e:#}"), "Failed to load tool servers");
                ToolCatalog::default()
            }
        }
    }

    /// Enabled tools across the user's visible servers in function-calling
    /// format. Unreachable servers are skipped.
    pub async fn tools_for_user(&self, user_id: &str) -> Vec<ToolSpec> {
        self.catalog_for_user(user_id).await.specs()
    }

    pub async fn has_tools(&self, user_id: &str) -> bool {
        !self.catalog_for_user(user_id).await.is_empty()
    }

    pub async fn resolve(&self, tool_name: &str, user_id: &str) -> Result<ResolvedTool, ToolError> {
        self.load_catalog(user_id)
            .await
            .map_err(|e| ToolError::Configuration {
                reason: format!("failed to load tool servers: {e:#}"),
            })?
            .resolve(tool_name)
    }

    async fn load_server(&self, server: ToolServerConfig, user_id: &str) -> Result<ServerTools, ToolError> {
        let connector = self.registry.acquire(&server).await?;

        let listed = tokio::time::timeout(self.list_timeout, connector.list_tools()).await;
        let tools = match listed {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => {
                self.registry.record_failure(server.id).await;
                return Err(ToolError::Connection {
                    server: server.name,
                    reason: format!("failed to list tools: {e:#}"),
                });
            }
            Err(_) => {
                self.registry.record_failure(server.id).await;
                return Err(ToolError::Connection {
                    server: server.name,
                    reason: format!(
                        "listing tools timed out after {}ms",
                        self.list_timeout.as_millis()
                    ),
                });
            }
        };

        let mut enabled = Vec::with_capacity(tools.len());
        for tool in tools {
            if self.is_enabled(user_id, &server, &tool.name).await {
                enabled.push(tool);
            }
        }

        Ok(ServerTools {
            server,
            tools: enabled,
        })
    }

    async fn is_enabled(&self, user_id: &str, server: &ToolServerConfig, tool_name: &str) -> bool {
        match self.store.is_tool_enabled(user_id, server.id, tool_name).await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(
                    user_id,
                    server = %server.name,
                    tool = tool_name,
                    error = %format!("{e:#}"),
                    "Failed to read tool preference, treating as enabled"
                );
                true
            }
        }
    }
}
