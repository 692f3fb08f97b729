//! PKCE S256 challenge generation
//!
//! This module implements the Proof Key for Code Exchange (PKCE) extension
//! to OAuth 2.0 as defined in RFC 7636, specifically the `S256` challenge
//! method used by the Tesla identity provider.
//!
//! # How PKCE works
//!
//! 1. The client generates a high-entropy random string called the `code_verifier`.
//! 2. The client computes a SHA-256 hash of the verifier and base64url-encodes
//!    it to produce the `code_challenge`.
//! 3. The authorization request includes `code_challenge` and
//!    `code_challenge_method=S256`.
//! 4. The token exchange request includes a `code_verifier`.
//!
//! A [`PkceSession`] also carries the anti-forgery `state` value sent with
//! the authorization request. It lives for exactly one login attempt and is
//! never persisted.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest, Sha256};

use crate::error::{PowerwallError, Result};

/// Number of random bytes behind the code verifier.
pub const DEFAULT_VERIFIER_LENGTH: usize = 86;

/// Number of random bytes behind the `state` value.
pub const DEFAULT_STATE_LENGTH: usize = 20;

/// The PKCE challenge method sent to the authorize endpoint.
pub const CHALLENGE_METHOD: &str = "S256";

// ---------------------------------------------------------------------------
// PkceSession
// ---------------------------------------------------------------------------

/// Ephemeral secrets for a single authorization attempt.
///
/// Created by [`generate`] at the start of
/// [`LoginFlow::authenticate`](super::flow::LoginFlow) and dropped when the
/// attempt finishes, successfully or not.
///
/// # Examples
///
/// ```
/// use powerwall::auth::pkce::generate;
///
/// let session = generate(86, 20).expect("PKCE generation must not fail");
/// assert_ne!(session.verifier, session.challenge);
/// assert!(!session.state.is_empty());
/// ```
#[derive(Clone)]
pub struct PkceSession {
    /// The code verifier: `verifier_length` random bytes encoded as
    /// base64url without padding.
    pub verifier: String,

    /// The code challenge: base64url (no padding) SHA-256 digest of the
    /// ASCII bytes of [`Self::verifier`].
    pub challenge: String,

    /// Random anti-CSRF value echoed back by the identity provider.
    pub state: String,
}

impl std::fmt::Debug for PkceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceSession")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .field("state", &self.state)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Generates a fresh PKCE session.
///
/// Both lengths are byte counts measured before encoding. Bytes come from
/// `rand`'s thread-local generator, a ChaCha CSPRNG seeded from the
/// operating system, so the values are suitable as security tokens.
///
/// # Arguments
///
/// * `verifier_length` - Number of random bytes behind the verifier.
/// * `state_length` - Number of random bytes behind the state value.
///
/// # Errors
///
/// Returns [`PowerwallError::Config`] when either length is zero.
///
/// # Examples
///
/// ```
/// use base64::Engine as _;
/// use powerwall::auth::pkce::generate;
///
/// let session = generate(32, 16).unwrap();
/// let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
///     .decode(&session.verifier)
///     .unwrap();
/// assert_eq!(raw.len(), 32);
/// ```
pub fn generate(verifier_length: usize, state_length: usize) -> Result<PkceSession> {
    if verifier_length == 0 {
        return Err(
            PowerwallError::Config("PKCE verifier length must be positive".to_string()).into(),
        );
    }
    if state_length == 0 {
        return Err(
            PowerwallError::Config("PKCE state length must be positive".to_string()).into(),
        );
    }

    let verifier = random_urlsafe(verifier_length);
    let challenge = challenge_for(&verifier);
    let state = random_urlsafe(state_length);

    Ok(PkceSession {
        verifier,
        challenge,
        state,
    })
}

/// Computes the S256 challenge for a verifier string.
///
/// `BASE64URL(SHA256(ASCII(code_verifier)))`, RFC 7636 section 4.2.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
