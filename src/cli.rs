//! Command-line interface definition for powerwall
//!
//! This module defines the CLI structure using clap's derive API. Without a
//! subcommand the binary runs a single backup reserve command; `monitor`
//! keeps running and exports metrics.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::device::ReserveCommand;

/// powerwall - Tesla Powerwall backup reserve control
///
/// With no flags, prints the current battery charge. `--percent` sets the
/// backup reserve; `--hold` sets it to the current charge.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "powerwall")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "POWERWALL_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Set the backup reserve to this percentage
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub percent: Option<u8>,

    /// Set the backup reserve to the current charge (ignored with --percent)
    #[arg(long)]
    pub hold: bool,

    /// Tesla account name (falls back to TESLA_CLOUD_USERNAME)
    #[arg(long)]
    pub username: Option<String>,

    /// Tesla account password (falls back to TESLA_CLOUD_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// Directory for the bearer token file (falls back to POWERWALL_STATE_DIR)
    #[arg(long)]
    pub statedir: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for powerwall
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Keep the credential fresh and export site metrics over HTTP
    Monitor {
        /// Address to serve /metrics on
        #[arg(long)]
        listen: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The reserve command selected by `--percent` and `--hold`.
    pub fn reserve_command(&self) -> ReserveCommand {
        ReserveCommand::from_flags(self.percent, self.hold)
    }
}
