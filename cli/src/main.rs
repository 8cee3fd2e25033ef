use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolrun_core::config;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

#[derive(Parser)]
#[command(name = "toolrun")]
#[command(about = "toolrun - tool server configuration for the agent loop", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.toolrun/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with default limits
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Validate the config file and print a summary
    Check,
    /// List the tool servers a user can see and the tools they disabled
    Servers {
        #[arg(short, long)]
        user: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(config::get_config_path);
    tracing::debug!(config = %path.display(), "Using config file");

    match cli.command {
        Commands::Init { force } => commands::init(&path, force),
        Commands::Check => commands::check(&path),
        Commands::Servers { user } => commands::servers(&path, &user).await,
    }
}
