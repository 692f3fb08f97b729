//! powerwall - Tesla Powerwall backup reserve control library
//!
//! This library logs in to the Tesla cloud the way a browser would, keeps
//! the resulting owner API credential fresh on disk, and drives an energy
//! site's backup reserve.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: PKCE, sign-in form scraping and the login exchange
//! - `credential`: credential persistence, validation and refresh policy
//! - `device`: owner API energy-site client and reserve commands
//! - `metrics`: injected metrics sink
//! - `monitor`: long-running refresh and poll loops with a metrics listener
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use powerwall::cli::Cli;
//! use powerwall::commands::reserve::run_reserve;
//! use powerwall::device::ReserveCommand;
//! use powerwall::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Cli::default())?;
//!     config.validate()?;
//!
//!     let outcome = run_reserve(&config, ReserveCommand::Query).await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod credential;
pub mod device;
pub mod error;
pub mod http;
pub mod metrics;
pub mod monitor;

// Re-export commonly used types
pub use config::Config;
pub use credential::{Credential, CredentialRefresher, SharedCredential};
pub use device::{CommandOutcome, ReserveCommand};
pub use error::{PowerwallError, Result};

#[cfg(test)]
pub mod test_utils;
