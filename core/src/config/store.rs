use crate::config::{Config, ConfigError, ToolServerConfig, Visibility};
use crate::traits::ConfigStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("A tool server named '{name}' already exists ({scope})")]
    Conflict { name: String, scope: String },

    #[error("Tool server not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPreference {
    pub user_id: String,
    pub server_id: Uuid,
    pub tool: String,
    pub enabled: bool,
}

type PreferenceKey = (String, Uuid, String);

/// Configuration store held in memory, seeded from the TOML config file.
#[derive(Default)]
pub struct InMemoryStore {
    servers: RwLock<Vec<ToolServerConfig>>,
    preferences: RwLock<HashMap<PreferenceKey, bool>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store = Self::new();
        for server in &config.servers {
            store.insert_server(server.clone())?;
        }
        for pref in &config.preferences {
            store.set_tool_enabled(&pref.user_id, pref.server_id, &pref.tool, pref.enabled)?;
        }
        Ok(store)
    }

    pub fn insert_server(&self, server: ToolServerConfig) -> Result<(), StoreError> {
        server.validate()?;

        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        if servers
            .iter()
            .any(|s| s.name == server.name && s.visibility == server.visibility)
        {
            return Err(StoreError::Conflict {
                name: server.name,
                scope: server.visibility.to_string(),
            });
        }

        tracing::debug!(
            server_id = %server.id,
            name = %server.name,
            kind = %server.transport.kind(),
            "Tool server registered"
        );
        servers.push(server);
        Ok(())
    }

    /// Removes a server together with every preference that refers to it.
    pub fn remove_server(&self, server_id: Uuid) -> Result<ToolServerConfig, StoreError> {
        let removed = {
            let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
            let idx = servers
                .iter()
                .position(|s| s.id == server_id)
                .ok_or(StoreError::NotFound(server_id))?;
            servers.remove(idx)
        };

        self.preferences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(_, sid, _), _| *sid != server_id);

        Ok(removed)
    }

    /// Removes the user's own servers and all of their preferences, returning
    /// the servers that were removed.
    pub fn remove_user(&self, user_id: &str) -> Vec<ToolServerConfig> {
        let owned: Vec<Uuid> = self
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.visibility.is_owned_by(user_id))
            .map(|s| s.id)
            .collect();

        let mut removed = Vec::with_capacity(owned.len());
        for id in owned {
            match self.remove_server(id) {
                Ok(server) => removed.push(server),
                Err(e) => tracing::debug!(server_id = %id, user_id, error = %e, "Server already removed"),
            }
        }

        self.preferences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(uid, _, _), _| uid != user_id);

        removed
    }

    pub fn set_tool_enabled(
        &self,
        user_id: &str,
        server_id: Uuid,
        tool_name: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        if !self.contains_server(server_id) {
            return Err(StoreError::NotFound(server_id));
        }

        self.preferences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (user_id.to_string(), server_id, tool_name.to_string()),
                enabled,
            );
        Ok(())
    }

    pub fn enable_tool(&self, user_id: &str, server_id: Uuid, tool_name: &str) -> Result<(), StoreError> {
        self.set_tool_enabled(user_id, server_id, tool_name, true)
    }

    pub fn disable_tool(&self, user_id: &str, server_id: Uuid, tool_name: &str) -> Result<(), StoreError> {
        self.set_tool_enabled(user_id, server_id, tool_name, false)
    }

    pub fn contains_server(&self, server_id: Uuid) -> bool {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|s| s.id == server_id)
    }

    pub fn servers(&self) -> Vec<ToolServerConfig> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn preferences_for(&self, user_id: &str) -> Vec<ToolPreference> {
        let mut prefs: Vec<ToolPreference> = self
            .preferences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((uid, _, _), _)| uid == user_id)
            .map(|((uid, sid, tool), enabled)| ToolPreference {
                user_id: uid.clone(),
                server_id: *sid,
                tool: tool.clone(),
                enabled: *enabled,
            })
            .collect();
        prefs.sort_by(|a, b| a.server_id.cmp(&b.server_id).then_with(|| a.tool.cmp(&b.tool)));
        prefs
    }

    fn filtered(&self, keep: impl Fn(&Visibility) -> bool) -> Vec<ToolServerConfig> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| keep(&s.visibility))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn owned_servers(&self, user_id: &str) -> anyhow::Result<Vec<ToolServerConfig>> {
        Ok(self.filtered(|v| v.is_owned_by(user_id)))
    }

    async fn global_servers(&self) -> anyhow::Result<Vec<ToolServerConfig>> {
        Ok(self.filtered(Visibility::is_global))
    }

    async fn tool_preference(
        &self,
        user_id: &str,
        server_id: Uuid,
        tool_name: &str,
    ) -> anyhow::Result<Option<bool>> {
        Ok(self
            .preferences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user_id.to_string(), server_id, tool_name.to_string()))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(server: &ToolServerConfig) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_server(server.clone()).unwrap();
        store
    }

    #[tokio::test]
    async fn preferences_default_to_enabled() {
        let server = ToolServerConfig::local_process("fs", "fs-server", vec![]);
        let store = store_with(&server);

        assert!(store.is_tool_enabled("alice", server.id, "read").await.unwrap());

        store.disable_tool("alice", server.id, "read").unwrap();
        assert!(!store.is_tool_enabled("alice", server.id, "read").await.unwrap());

        store.enable_tool("alice", server.id, "read").unwrap();
        store.enable_tool("alice", server.id, "read").unwrap();
        assert!(store.is_tool_enabled("alice", server.id, "read").await.unwrap());

        assert!(store.is_tool_enabled("bob", server.id, "read").await.unwrap());
    }

    #[test]
    fn duplicate_name_in_same_scope_rejected() {
        let store = InMemoryStore::new();
        store
            .insert_server(ToolServerConfig::local_process("fs", "a", vec![]).owned_by("alice"))
            .unwrap();

        let dup = ToolServerConfig::local_process("fs", "b", vec![]).owned_by("alice");
        assert!(matches!(
            store.insert_server(dup),
            Err(StoreError::Conflict { .. })
        ));

        store
            .insert_server(ToolServerConfig::local_process("fs", "c", vec![]).owned_by("bob"))
            .unwrap();
        store
            .insert_server(ToolServerConfig::local_process("fs", "d", vec![]))
            .unwrap();
        assert_eq!(store.servers().len(), 3);
    }

    #[test]
    fn invalid_server_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .insert_server(ToolServerConfig::remote_endpoint("web", ""))
            .unwrap_err();
        assert_eq!(err, StoreError::Invalid(ConfigError::EmptyUrl("web".into())));
    }

    #[tokio::test]
    async fn removing_server_cascades_preferences() {
        let server = ToolServerConfig::local_process("fs", "fs-server", vec![]);
        let store = store_with(&server);
        store.disable_tool("alice", server.id, "rm").unwrap();

        store.remove_server(server.id).unwrap();

        assert!(store.preferences_for("alice").is_empty());
        assert!(matches!(
            store.disable_tool("alice", server.id, "rm"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn removing_user_drops_owned_servers_and_preferences() {
        let global = ToolServerConfig::local_process("shared", "s", vec![]);
        let own = ToolServerConfig::local_process("mine", "m", vec![]).owned_by("alice");
        let store = store_with(&global);
        store.insert_server(own).unwrap();
        store.disable_tool("alice", global.id, "x").unwrap();

        let removed = store.remove_user("alice");
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "mine");
        assert!(store.remove_user("alice").is_empty());

        assert!(store.owned_servers("alice").await.unwrap().is_empty());
        assert_eq!(store.global_servers().await.unwrap().len(), 1);
        assert!(store.preferences_for("alice").is_empty());
    }

    #[tokio::test]
    async fn from_config_seeds_servers_and_preferences() {
        let server = ToolServerConfig::local_process("fs", "fs-server", vec![]).owned_by("alice");
        let config = Config {
            servers: vec![server.clone()],
            preferences: vec![ToolPreference {
                user_id: "alice".into(),
                server_id: server.id,
                tool: "write".into(),
                enabled: false,
            }],
            ..Config::default()
        };

        let store = InMemoryStore::from_config(&config).unwrap();
        assert_eq!(store.owned_servers("alice").await.unwrap().len(), 1);
        assert_eq!(
            store.tool_preference("alice", server.id, "write").await.unwrap(),
            Some(false)
        );
    }
}
