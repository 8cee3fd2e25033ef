//! Connector and store doubles shared by the unit tests.

use crate::config::{BreakerConfig, InMemoryStore, ToolServerConfig};
use crate::connection::{ConnectionRegistry, TransportConfig};
use crate::tools::ToolIndex;
use crate::traits::{Connector, ConnectorBuilder, ToolDefinition};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub enum Reply {
    Value(Value),
    Fail(String),
    After(Duration, Value),
    Panic,
    Hang,
}

#[derive(Default)]
pub struct ScriptedConnector {
    tools: Vec<ToolDefinition>,
    replies: HashMap<String, Reply>,
    pub list_fails: AtomicBool,
    pub list_hangs: AtomicBool,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedConnector {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools
                .iter()
                .map(|name| ToolDefinition::new(*name, format!("{name} tool"), json!({"type": "object"})))
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_tool(mut self, definition: ToolDefinition) -> Self {
        self.tools.push(definition);
        self
    }

    pub fn reply(mut self, tool: &str, reply: Reply) -> Self {
        self.replies.insert(tool.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDefinition>> {
        if self.list_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.list_fails.load(Ordering::SeqCst) {
            anyhow::bail!("listing failed");
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        self.calls.lock().unwrap().push((name.to_string(), arguments));
        match self.replies.get(name).cloned() {
            None => Ok(json!({"content": [{"type": "text", "text": format!("{name} ok")}]})),
            Some(Reply::Value(value)) => Ok(value),
            Some(Reply::Fail(reason)) => Err(anyhow::anyhow!(reason)),
            Some(Reply::After(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Some(Reply::Panic) => panic!("tool crashed"),
            Some(Reply::Hang) => std::future::pending::<anyhow::Result<Value>>().await,
        }
    }
}

/// Hands out pre-built connectors by server name.
#[derive(Default)]
pub struct MapBuilder {
    connectors: HashMap<String, Arc<ScriptedConnector>>,
    pub builds: AtomicUsize,
}

impl MapBuilder {
    pub fn with(mut self, server: &str, connector: Arc<ScriptedConnector>) -> Self {
        self.connectors.insert(server.to_string(), connector);
        self
    }
}

#[async_trait]
impl ConnectorBuilder for MapBuilder {
    async fn build(
        &self,
        server: &ToolServerConfig,
        _transport: &TransportConfig,
    ) -> anyhow::Result<Arc<dyn Connector>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let connector = self
            .connectors
            .get(&server.name)
            .ok_or_else(|| anyhow::anyhow!("cannot reach {}", server.name))?;
        Ok(connector.clone())
    }
}

pub fn server(name: &str) -> ToolServerConfig {
    ToolServerConfig::local_process(name, format!("{name}-server"), vec![])
}

pub fn index_with(
    servers: Vec<ToolServerConfig>,
    builder: MapBuilder,
) -> (Arc<InMemoryStore>, Arc<ToolIndex>) {
    let store = Arc::new(InMemoryStore::new());
    for server in servers {
        store.insert_server(server).unwrap();
    }
    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(builder),
        BreakerConfig::default(),
    ));
    (store.clone(), Arc::new(ToolIndex::new(store, registry)))
}
