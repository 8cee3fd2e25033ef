use anyhow::{Context, Result};
use console::style;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use toolrun_core::config::{self, Config, InMemoryStore, ToolServerConfig, Transport};
use toolrun_core::{ConnectionRegistry, ConnectorFactory, ToolIndex};
use uuid::Uuid;

pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (pass --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    config::save_config_to(&Config::default(), path)?;
    println!(
        "{} Wrote default config to {}",
        style("✓").green().bold(),
        path.display()
    );
    Ok(())
}

pub fn check(path: &Path) -> Result<()> {
    let config = config::load_config_from(path)?;
    let store = InMemoryStore::from_config(&config)
        .with_context(|| format!("Invalid tool server configuration in {}", path.display()))?;

    println!("{} {} is valid", style("✓").green().bold(), path.display());
    println!();
    println!(
        "  Agent:     {} iterations, {}ms total",
        config.agent.max_iterations, config.agent.timeout_ms
    );
    println!(
        "  Executor:  {}ms per call, results capped at {} bytes",
        config.executor.call_timeout_ms, config.executor.max_result_bytes
    );
    println!(
        "  Breaker:   {} failures in {}s opens for {}s",
        config.breaker.failure_threshold, config.breaker.window_secs, config.breaker.reset_secs
    );
    println!(
        "  Sanitizer: depth {}, strings {} bytes, arrays {} items",
        config.sanitizer.max_depth,
        config.sanitizer.max_string_bytes,
        config.sanitizer.max_array_items
    );
    println!();

    let servers = store.servers();
    if servers.is_empty() {
        println!("{} No tool servers configured", style("!").yellow());
        return Ok(());
    }

    println!("Tool servers ({})", servers.len());
    for server in &servers {
        print_server(server);
    }
    println!();
    println!("Tool preferences: {}", config.preferences.len());

    Ok(())
}

pub async fn servers(path: &Path, user_id: &str) -> Result<()> {
    let config = config::load_config_from(path)?;
    let store = Arc::new(InMemoryStore::from_config(&config)?);

    // Listing visibility never connects, so no transports are registered.
    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(ConnectorFactory::new()),
        config.breaker,
    ));
    let index = ToolIndex::new(store.clone(), registry);

    let visible = index.visible_servers(user_id).await?;
    if visible.is_empty() {
        println!(
            "{} No enabled tool servers visible to '{}'",
            style("!").yellow(),
            user_id
        );
        return Ok(());
    }

    let mut disabled: BTreeMap<Uuid, Vec<String>> = BTreeMap::new();
    for pref in store.preferences_for(user_id) {
        if !pref.enabled {
            disabled.entry(pref.server_id).or_default().push(pref.tool);
        }
    }

    println!(
        "{} Tool servers visible to '{}' ({})",
        style("✓").green().bold(),
        user_id,
        visible.len()
    );
    println!();
    for server in &visible {
        print_server(server);
        if let Some(tools) = disabled.get(&server.id) {
            println!("      Disabled: {}", tools.join(", "));
        }
    }

    Ok(())
}

fn print_server(server: &ToolServerConfig) {
    let status = if server.enabled {
        style("on").green()
    } else {
        style("off").dim()
    };

    println!(
        "  {} [{}] {} ({})",
        style(&server.name).white().bold(),
        status,
        server.transport.kind(),
        server.visibility
    );
    println!("      {}", style(target(server)).dim());
    if let Some(description) = &server.description {
        println!("      {description}");
    }
}

fn target(server: &ToolServerConfig) -> String {
    match &server.transport {
        Transport::LocalProcess { command, args, .. } if args.is_empty() => command.clone(),
        Transport::LocalProcess { command, args, .. } => format!("{command} {}", args.join(" ")),
        Transport::RemoteEndpoint { base_url, .. } => base_url.clone(),
    }
}
