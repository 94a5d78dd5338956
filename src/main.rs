//! Cluster controller daemon: a single logical control plane over a set of
//! container-runtime host agents.

use anyhow::Result;
use clap::Parser;
use tracing::error;

mod cmd;

#[derive(Parser)]
#[command(name = "citadel-cluster")]
#[command(about = "Cluster controller for container hosts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<cmd::Commands>,

    /// Path to the cluster's TOML configuration file.
    #[arg(short, long, default_value = "config.toml", env = "CITADEL_CONFIG")]
    config: String,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("citadel_cluster={}", log_level).into()),
        )
        .init();

    match cli.command {
        Some(cmd::Commands::Diagnostics) => cmd::diagnostics::run(&cli.config).await?,
        None => {
            if let Err(e) = cmd::root::run(&cli.config).await {
                error!("cluster controller error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
