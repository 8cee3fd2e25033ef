use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Tool server name cannot be empty")]
    EmptyName,

    #[error("Tool server '{0}': command cannot be empty")]
    EmptyCommand(String),

    #[error("Tool server '{0}': base URL cannot be empty")]
    EmptyUrl(String),

    #[error("Tool server '{name}': base URL must start with http:// or https://, got '{url}'")]
    InvalidUrl { name: String, url: String },

    #[error("Tool server '{name}': {field} names cannot be empty")]
    EmptyKey { name: String, field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    LocalProcess,
    RemoteEndpoint,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalProcess => write!(f, "local-process"),
            Self::RemoteEndpoint => write!(f, "remote-endpoint"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Transport {
    LocalProcess {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    RemoteEndpoint {
        base_url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::LocalProcess { .. } => TransportKind::LocalProcess,
            Self::RemoteEndpoint { .. } => TransportKind::RemoteEndpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum Visibility {
    Global,
    Owned { user_id: String },
}

impl Visibility {
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        matches!(self, Self::Owned { user_id: owner } if owner == user_id)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Owned { user_id } => write!(f, "owned by {user_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub transport: Transport,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub visibility: Visibility,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl ToolServerConfig {
    fn with_transport(name: impl Into<String>, transport: Transport) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            transport,
            enabled: true,
            visibility: Visibility::Global,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn local_process(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self::with_transport(
            name,
            Transport::LocalProcess {
                command: command.into(),
                args,
                env: BTreeMap::new(),
            },
        )
    }

    pub fn remote_endpoint(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_transport(
            name,
            Transport::RemoteEndpoint {
                base_url: base_url.into(),
                headers: BTreeMap::new(),
            },
        )
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.visibility = Visibility::Owned {
            user_id: user_id.into(),
        };
        self
    }

    pub fn global(mut self) -> Self {
        self.visibility = Visibility::Global;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Adds an environment variable (local-process) or header (remote-endpoint).
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self.transport {
            Transport::LocalProcess { env, .. } => env.insert(key.into(), value.into()),
            Transport::RemoteEndpoint { headers, .. } => headers.insert(key.into(), value.into()),
        };
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        match &self.transport {
            Transport::LocalProcess { command, env, .. } => {
                if command.trim().is_empty() {
                    return Err(ConfigError::EmptyCommand(self.name.clone()));
                }
                if env.keys().any(|k| k.trim().is_empty()) {
                    return Err(ConfigError::EmptyKey {
                        name: self.name.clone(),
                        field: "environment variable",
                    });
                }
            }
            Transport::RemoteEndpoint { base_url, headers } => {
                let url = base_url.trim();
                if url.is_empty() {
                    return Err(ConfigError::EmptyUrl(self.name.clone()));
                }
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::InvalidUrl {
                        name: self.name.clone(),
                        url: url.to_string(),
                    });
                }
                if headers.keys().any(|k| k.trim().is_empty()) {
                    return Err(ConfigError::EmptyKey {
                        name: self.name.clone(),
                        field: "header",
                    });
                }
            }
        }

        Ok(())
    }
}
