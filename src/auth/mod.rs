//! Cloud account authorization
//!
//! Obtains an owner API bearer token from an account name and password.
//!
//! # Module Layout
//!
//! - [`pkce`] -- PKCE `S256` verifier, challenge and state generation
//! - [`form`] -- hidden-field extraction from the login page
//! - [`flow`] -- the multi-step login and token exchange

pub mod flow;
pub mod form;
pub mod pkce;

use async_trait::async_trait;

use crate::config::Account;
use crate::credential::Credential;
use crate::error::Result;

/// Something that can trade account credentials for a bearer token.
///
/// [`flow::LoginFlow`] is the production implementation. The
/// [`CredentialRefresher`](crate::credential::refresher::CredentialRefresher)
/// only depends on this trait.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Runs a complete login and returns the resulting access token.
    ///
    /// # Errors
    ///
    /// Returns [`PowerwallError::Auth`](crate::error::PowerwallError::Auth)
    /// or [`PowerwallError::FormNotFound`](crate::error::PowerwallError::FormNotFound)
    /// when any step fails.
    async fn authenticate(&self, account: &Account) -> Result<Credential>;
}
