use crate::config::{ConfigError, ToolServerConfig, Transport, TransportKind};

/// Normalized connection parameters handed to a connector builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    LocalProcess {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
    RemoteEndpoint {
        base_url: String,
        headers: Vec<(String, String)>,
    },
}

impl TransportConfig {
    pub fn from_server(server: &ToolServerConfig) -> Result<Self, ConfigError> {
        server.validate()?;

        Ok(match &server.transport {
            Transport::LocalProcess { command, args, env } => Self::LocalProcess {
                command: command.trim().to_string(),
                args: args.clone(),
                env: env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            },
            Transport::RemoteEndpoint { base_url, headers } => Self::RemoteEndpoint {
                base_url: base_url.trim().trim_end_matches('/').to_string(),
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            },
        })
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::LocalProcess { .. } => TransportKind::LocalProcess,
            Self::RemoteEndpoint { .. } => TransportKind::RemoteEndpoint,
        }
    }
}
