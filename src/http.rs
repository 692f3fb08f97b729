//! Outbound HTTP client construction
//!
//! Every request leaving the process goes through a `reqwest::Client` built
//! here so the per-call timeout is applied uniformly.

use std::time::Duration;

use crate::error::{PowerwallError, Result};

/// Redirect handling for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    /// Follow redirects the way a browser would.
    Follow,
    /// Hand 3xx responses back to the caller untouched.
    Manual,
}

/// Builds an HTTP client with the given timeout and redirect policy.
///
/// # Errors
///
/// Returns [`PowerwallError::Config`] if the TLS backend cannot be
/// initialised.
pub fn build_client(timeout: Duration, redirects: Redirects) -> Result<reqwest::Client> {
    let policy = match redirects {
        Redirects::Follow => reqwest::redirect::Policy::limited(10),
        Redirects::Manual => reqwest::redirect::Policy::none(),
    };

    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(policy)
        .build()
        .map_err(|e| PowerwallError::Config(format!("failed to build HTTP client: {e}")).into())
}
