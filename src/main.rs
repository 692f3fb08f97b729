//! powerwall - Tesla Powerwall backup reserve control
//!
#![doc = "Main entry point for the powerwall binary."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use powerwall::cli::{Cli, Commands};
use powerwall::commands;
use powerwall::config::{Config, DEFAULT_CONFIG_PATH};
use powerwall::device::CommandOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Some(Commands::Monitor { .. }) => {
            tracing::info!("Starting monitor on {}", config.monitor.listen_addr);
            commands::monitor::run_monitor(config).await
        }
        None => {
            let command = cli.reserve_command();
            tracing::debug!("Running {:?}", command);
            match commands::reserve::run_reserve(&config, command).await? {
                CommandOutcome::Charge { percent } => println!("{percent:.1}"),
                CommandOutcome::ReserveSet { percent } => {
                    tracing::info!("Backup reserve is now {}%", percent)
                }
            }
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "powerwall=debug" } else { "powerwall=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
