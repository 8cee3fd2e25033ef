pub mod server;
pub mod store;

pub use server::{ConfigError, ToolServerConfig, Transport, TransportKind, Visibility};
pub use store::{InMemoryStore, StoreError, ToolPreference};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const TOOLRUN_DIR: &str = ".toolrun";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            timeout_ms: 120_000,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    pub call_timeout_ms: u64,
    pub max_result_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            max_result_bytes: 100_000,
        }
    }
}

impl ExecutorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: usize,
    pub window_secs: u64,
    pub reset_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window_secs: 30,
            reset_secs: 15,
        }
    }
}

impl BreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn reset_after(&self) -> Duration {
        Duration::from_secs(self.reset_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SanitizerConfig {
    pub max_depth: usize,
    pub max_string_bytes: usize,
    pub max_array_items: usize,
    pub max_input_bytes: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_string_bytes: 64 * 1024,
            max_array_items: 1_000,
            max_input_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub executor: ExecutorConfig,
    pub breaker: BreakerConfig,
    pub sanitizer: SanitizerConfig,
    pub servers: Vec<ToolServerConfig>,
    pub preferences: Vec<ToolPreference>,
}

pub fn get_toolrun_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(TOOLRUN_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_toolrun_dir().join("config.toml")
}

pub fn ensure_toolrun_dir() -> Result<PathBuf> {
    let dir = get_toolrun_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create toolrun directory at {}", dir.display()))?;
    }

    Ok(dir)
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Config::default())
        }
    }
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!(
                "Config file not found at {}. Create it or pass --config.",
                path.display()
            )
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        }
    })?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_toolrun_dir()?;
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.timeout(), Duration::from_secs(120));
        assert_eq!(config.executor.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.executor.max_result_bytes, 100_000);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.window(), Duration::from_secs(30));
        assert_eq!(config.breaker.reset_after(), Duration::from_secs(15));
        assert_eq!(config.sanitizer.max_depth, 10);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn parses_servers_and_preferences() {
        let content = r#"
            [agent]
            max_iterations = 4

            [[servers]]
            id = "6f1c1a52-4a8e-4f0c-9a7e-0d6b9d3f2a11"
            name = "files"
            visibility = { scope = "owned", user_id = "alice" }
            transport = { kind = "local-process", command = "files-server", args = ["--root", "/srv"] }

            [[servers]]
            name = "search"
            visibility = { scope = "global" }

            [servers.transport]
            kind = "remote-endpoint"
            base_url = "https://tools.example.com/search"
            headers = { Authorization = "Bearer abc" }

            [[preferences]]
            user_id = "alice"
            server_id = "6f1c1a52-4a8e-4f0c-9a7e-0d6b9d3f2a11"
            tool = "delete_file"
            enabled = false
        "#;

        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.agent.timeout_ms, 120_000);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].transport.kind(), TransportKind::LocalProcess);
        assert_eq!(
            config.servers[0].visibility,
            Visibility::Owned {
                user_id: "alice".into()
            }
        );
        assert!(config.servers[0].enabled);
        assert_eq!(config.servers[1].transport.kind(), TransportKind::RemoteEndpoint);
        assert_eq!(config.preferences.len(), 1);
        assert!(!config.preferences[0].enabled);
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let mut config = Config::default();
        config.breaker.failure_threshold = 7;
        config
            .servers
            .push(ToolServerConfig::local_process("calc", "calc-server", vec![]));

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.breaker.failure_threshold, 7);
        assert_eq!(loaded.servers.len(), 1);
        assert_eq!(loaded.servers[0].name, "calc");
        assert_eq!(loaded.servers[0].id, config.servers[0].id);
    }

    #[test]
    fn missing_file_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.toml");
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
