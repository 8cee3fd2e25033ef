use crate::config::{ToolServerConfig, TransportKind};
use crate::connection::TransportConfig;
use crate::traits::{Connector, ConnectorBuilder};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Picks the builder for a server: a per-server override if one is set,
/// otherwise the builder registered for the server's transport kind.
#[derive(Default, Clone)]
pub struct ConnectorFactory {
    by_kind: HashMap<TransportKind, Arc<dyn ConnectorBuilder>>,
    by_server: HashMap<Uuid, Arc<dyn ConnectorBuilder>>,
}

impl ConnectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, kind: TransportKind, builder: Arc<dyn ConnectorBuilder>) -> Self {
        self.by_kind.insert(kind, builder);
        self
    }

    pub fn with_server_override(mut self, server_id: Uuid, builder: Arc<dyn ConnectorBuilder>) -> Self {
        self.by_server.insert(server_id, builder);
        self
    }

    pub fn supports(&self, kind: TransportKind) -> bool {
        self.by_kind.contains_key(&kind)
    }
}

#[async_trait]
impl ConnectorBuilder for ConnectorFactory {
    async fn build(
        &self,
        server: &ToolServerConfig,
        transport: &TransportConfig,
    ) -> anyhow::Result<Arc<dyn Connector>> {
        let builder = self
            .by_server
            .get(&server.id)
            .or_else(|| self.by_kind.get(&transport.kind()))
            .ok_or_else(|| {
                anyhow!(
                    "No connector available for {} transport (server '{}')",
                    transport.kind(),
                    server.name
                )
            })?;

        builder.build(server, transport).await
    }
}
