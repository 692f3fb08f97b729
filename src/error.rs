//! Error types for powerwall
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for powerwall operations
///
/// Covers configuration, the multi-step login exchange, credential
/// persistence and every call made against the owner API. Policy code in
/// [`crate::credential::refresher`] recovers the typed variant from an
/// `anyhow::Error` with `downcast_ref` when the decision depends on it.
#[derive(Error, Debug)]
pub enum PowerwallError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Account name or password was not supplied
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The login page no longer contains the expected sign-in form
    #[error("Sign-in form not found: {0}")]
    FormNotFound(String),

    /// Any step of the authorization exchange failed or returned an
    /// unexpected shape
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The owner API rejected the bearer token
    #[error("Credential unusable: {0}")]
    CredentialUnusable(String),

    /// No product in the account exposes an energy site
    #[error("No energy site found in product list")]
    DeviceNotFound,

    /// The owner API answered with an error status or an unexpected body
    #[error("API error: {0}")]
    Api(String),

    /// Connection-level failure talking to a remote endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// An outbound call exceeded the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// A reserve command was only partially applied
    #[error("Command failed: {0}")]
    Command(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PowerwallError {
    /// Maps a transport error into [`PowerwallError::Timeout`] or
    /// [`PowerwallError::Network`].
    ///
    /// A timeout is reported separately but every caller handles the two
    /// identically.
    pub fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PowerwallError::Timeout(format!("{context}: {err}"))
        } else {
            PowerwallError::Network(format!("{context}: {err}"))
        }
    }

    /// Returns `true` for errors raised by the transport rather than by the
    /// remote service.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PowerwallError::Network(_) | PowerwallError::Timeout(_) | PowerwallError::Http(_)
        )
    }
}

/// Result type alias for powerwall operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
