//! Configuration management for powerwall
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! Precedence is file, then environment, then command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::form::SIGN_IN_FORM_CLASS;
use crate::auth::pkce::{DEFAULT_STATE_LENGTH, DEFAULT_VERIFIER_LENGTH};
use crate::credential::refresher::{
    RefreshPolicy, DEFAULT_MAX_LIFETIME_DAYS, DEFAULT_REFRESH_MARGIN_DAYS,
};
use crate::credential::store::DEFAULT_FILE_NAME;
use crate::error::{PowerwallError, Result};

/// Config file consulted when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/powerwall/config.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cloud account used for the login flow
    #[serde(default)]
    pub account: Account,
    /// Identity provider endpoints and PKCE parameters
    #[serde(default)]
    pub auth: AuthConfig,
    /// Owner API endpoints and client identity
    #[serde(default)]
    pub owner_api: OwnerApiConfig,
    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,
    /// Credential persistence and freshness policy
    #[serde(default)]
    pub credential: CredentialConfig,
    /// Long-running monitor settings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Account name and password as used in the Tesla app.
///
/// The password never appears in `Debug` output.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Account name, typically an email address
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    password: String,
}

impl Account {
    /// Creates an account from a name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the account password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Replaces the account password.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field(
                "password",
                &if self.password.is_empty() {
                    "<unset>"
                } else {
                    "<redacted>"
                },
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// Where the `code_verifier` sent in the code exchange comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeVerifierSource {
    /// base64url of the authorization code itself. This is what the
    /// identity provider has accepted historically.
    #[default]
    AuthorizationCode,
    /// The verifier whose challenge was sent to the authorize endpoint
    /// (RFC 7636).
    PkceVerifier,
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Authorize endpoint serving the login page
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    /// Token endpoint for the authorization code exchange
    #[serde(default = "default_auth_token_url")]
    pub token_url: String,

    /// Registered redirect URI; never actually fetched
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// OAuth client id
    #[serde(default = "default_auth_client_id")]
    pub client_id: String,

    /// Space-separated scopes
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Class substring identifying the sign-in form
    #[serde(default = "default_form_class")]
    pub form_class: String,

    /// Random bytes behind the PKCE verifier
    #[serde(default = "default_verifier_length")]
    pub verifier_length: usize,

    /// Random bytes behind the `state` value
    #[serde(default = "default_state_length")]
    pub state_length: usize,

    /// Source of the `code_verifier` in the code exchange
    #[serde(default)]
    pub code_verifier_source: CodeVerifierSource,
}

const DEFAULT_AUTH_BASE: &str = "https://auth.tesla.com";

fn default_authorize_url() -> String {
    format!("{DEFAULT_AUTH_BASE}/oauth2/v3/authorize")
}

fn default_auth_token_url() -> String {
    format!("{DEFAULT_AUTH_BASE}/oauth2/v3/token")
}

fn default_redirect_uri() -> String {
    format!("{DEFAULT_AUTH_BASE}/void/callback")
}

fn default_auth_client_id() -> String {
    "ownerapi".to_string()
}

fn default_scope() -> String {
    "openid email offline_access".to_string()
}

fn default_form_class() -> String {
    SIGN_IN_FORM_CLASS.to_string()
}

fn default_verifier_length() -> usize {
    DEFAULT_VERIFIER_LENGTH
}

fn default_state_length() -> usize {
    DEFAULT_STATE_LENGTH
}

impl AuthConfig {
    /// Points the authorize and token endpoints at another identity
    /// provider host.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorize_url = format!("{base}/oauth2/v3/authorize");
        self.token_url = format!("{base}/oauth2/v3/token");
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: default_authorize_url(),
            token_url: default_auth_token_url(),
            redirect_uri: default_redirect_uri(),
            client_id: default_auth_client_id(),
            scope: default_scope(),
            form_class: default_form_class(),
            verifier_length: default_verifier_length(),
            state_length: default_state_length(),
            code_verifier_source: CodeVerifierSource::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// OwnerApiConfig
// ---------------------------------------------------------------------------

/// Owner API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerApiConfig {
    /// Base URL, without trailing slash
    #[serde(default = "default_owner_api_base")]
    pub base_url: String,

    /// Client id for the jwt-bearer token exchange
    #[serde(default = "default_owner_client_id")]
    pub client_id: String,

    /// Client secret for the jwt-bearer token exchange
    #[serde(default = "default_owner_client_secret")]
    pub client_secret: String,

    /// `User-Agent` header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// `X-Tesla-User-Agent` header
    #[serde(default = "default_tesla_user_agent")]
    pub tesla_user_agent: String,
}

fn default_owner_api_base() -> String {
    "https://owner-api.teslamotors.com".to_string()
}

fn default_owner_client_id() -> String {
    "81527cff06843c8634fdc09e8ac0abefb46ac849f38fe1e431c2ef2106796384".to_string()
}

fn default_owner_client_secret() -> String {
    "c7257eb71a564034f9419ee651c7d0e5f7aa6bfbd18bafb5c5c033b093bb2fa3".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_tesla_user_agent() -> String {
    "https://github.com/DentonGentry/powerwall".to_string()
}

impl OwnerApiConfig {
    /// Owner API token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url.trim_end_matches('/'))
    }

    /// Absolute URL for an `/api/1/...` path.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/1/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for OwnerApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_owner_api_base(),
            client_id: default_owner_client_id(),
            client_secret: default_owner_client_secret(),
            user_agent: default_user_agent(),
            tesla_user_agent: default_tesla_user_agent(),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpConfig
// ---------------------------------------------------------------------------

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-call timeout (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl HttpConfig {
    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialConfig
// ---------------------------------------------------------------------------

/// Credential persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Directory holding the credential file; the system temp dir when unset
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Credential file name inside `state_dir`
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Days after which the provider stops honouring a token
    #[serde(default = "default_max_lifetime_days")]
    pub max_lifetime_days: i64,

    /// Days before expiry at which a proactive refresh is attempted
    #[serde(default = "default_refresh_margin_days")]
    pub refresh_margin_days: i64,
}

fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_string()
}

fn default_max_lifetime_days() -> i64 {
    DEFAULT_MAX_LIFETIME_DAYS
}

fn default_refresh_margin_days() -> i64 {
    DEFAULT_REFRESH_MARGIN_DAYS
}

impl CredentialConfig {
    /// Resolved state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Full path of the credential file.
    pub fn path(&self) -> PathBuf {
        self.state_dir().join(&self.file_name)
    }

    /// Freshness policy derived from this configuration.
    pub fn policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            max_lifetime_days: self.max_lifetime_days,
            refresh_margin_days: self.refresh_margin_days,
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            file_name: default_file_name(),
            max_lifetime_days: default_max_lifetime_days(),
            refresh_margin_days: default_refresh_margin_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// Long-running monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Address the metrics listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Seconds between credential re-probes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// Seconds between live-status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_refresh_interval() -> u64 {
    6 * 60 * 60
}

fn default_poll_interval() -> u64 {
    300
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            refresh_interval_seconds: default_refresh_interval(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PowerwallError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PowerwallError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(username) = std::env::var("TESLA_CLOUD_USERNAME") {
            self.account.username = username;
        }

        if let Ok(password) = std::env::var("TESLA_CLOUD_PASSWORD") {
            self.account.set_password(password);
        }

        if let Ok(state_dir) = std::env::var("POWERWALL_STATE_DIR") {
            if !state_dir.is_empty() {
                self.credential.state_dir = Some(PathBuf::from(state_dir));
            }
        }

        if let Ok(auth_base) = std::env::var("POWERWALL_AUTH_BASE") {
            self.auth = self.auth.clone().with_base_url(&auth_base);
        }

        if let Ok(api_base) = std::env::var("POWERWALL_API_BASE") {
            self.owner_api.base_url = api_base;
        }

        if let Ok(timeout) = std::env::var("POWERWALL_HTTP_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.http.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid POWERWALL_HTTP_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(listen) = std::env::var("POWERWALL_LISTEN_ADDR") {
            self.monitor.listen_addr = listen;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(username) = &cli.username {
            self.account.username = username.clone();
        }

        if let Some(password) = &cli.password {
            self.account.set_password(password.clone());
        }

        if let Some(state_dir) = &cli.statedir {
            self.credential.state_dir = Some(state_dir.clone());
        }

        if let Some(crate::cli::Commands::Monitor {
            listen: Some(listen),
        }) = &cli.command
        {
            self.monitor.listen_addr = listen.clone();
        }

        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`PowerwallError::MissingCredentials`] when the account name
    /// or password is empty and [`PowerwallError::Config`] for any other
    /// out-of-range value.
    pub fn validate(&self) -> Result<()> {
        if self.account.username.is_empty() {
            return Err(PowerwallError::MissingCredentials(
                "Tesla account name must be provided in --username or TESLA_CLOUD_USERNAME"
                    .to_string(),
            )
            .into());
        }

        if self.account.password().is_empty() {
            return Err(PowerwallError::MissingCredentials(
                "Tesla account password must be provided in --password or TESLA_CLOUD_PASSWORD"
                    .to_string(),
            )
            .into());
        }

        for (name, value) in [
            ("auth.authorize_url", &self.auth.authorize_url),
            ("auth.token_url", &self.auth.token_url),
            ("auth.redirect_uri", &self.auth.redirect_uri),
            ("owner_api.base_url", &self.owner_api.base_url),
        ] {
            Url::parse(value)
                .map_err(|e| PowerwallError::Config(format!("{name} is not a valid URL: {e}")))?;
        }

        if self.auth.verifier_length == 0 || self.auth.state_length == 0 {
            return Err(PowerwallError::Config(
                "auth.verifier_length and auth.state_length must be greater than 0".to_string(),
            )
            .into());
        }

        if self.http.timeout_seconds == 0 {
            return Err(PowerwallError::Config(
                "http.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.credential.file_name.is_empty() {
            return Err(
                PowerwallError::Config("credential.file_name cannot be empty".to_string()).into(),
            );
        }

        if self.credential.refresh_margin_days < 0
            || self.credential.refresh_margin_days >= self.credential.max_lifetime_days
        {
            return Err(PowerwallError::Config(
                "credential.refresh_margin_days must be between 0 and max_lifetime_days"
                    .to_string(),
            )
            .into());
        }

        if self.monitor.refresh_interval_seconds == 0 || self.monitor.poll_interval_seconds == 0 {
            return Err(PowerwallError::Config(
                "monitor intervals must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
