//! Owner API bearer credential handling
//!
//! # Module Layout
//!
//! - `store`: persistence of the credential with file-age tracking
//! - `refresher`: probe, proactive refresh and forced re-authentication
//! - `shared`: concurrency-safe holder for long-running callers

pub mod refresher;
pub mod shared;
pub mod store;

pub use refresher::{CredentialRefresher, Freshness, RefreshPolicy, ValidatedCredential};
pub use shared::{RefreshOutcome, SharedCredential};
pub use store::{CredentialStore, FileCredentialStore, StoredCredential};

/// An opaque owner API access token.
///
/// Empty means "no credential". The token never appears in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps an access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when no token is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}
