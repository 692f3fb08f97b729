//! Browser-emulated authorization code flow with PKCE
//!
//! The identity provider offers no headless grant, so [`LoginFlow`] walks
//! the same pages a browser would and then trades the result for an owner
//! API access token.
//!
//! # Flow overview
//!
//! 1. Generate a PKCE session and GET the authorize URL. Keep the session
//!    cookies and the HTML login page.
//! 2. Scrape the hidden inputs of the sign-in form and add `identity` and
//!    `credential`.
//! 3. POST the form back to the authorize URL with redirects disabled.
//! 4. Read the authorization `code` out of the redirect `Location`.
//! 5. Exchange the code at the identity provider token endpoint for a
//!    first-stage bearer token.
//! 6. Exchange that bearer token at the owner API token endpoint for the
//!    final access token.
//!
//! Every step depends on the previous one; the first failure aborts the
//! attempt with [`PowerwallError::Auth`] (or
//! [`PowerwallError::FormNotFound`] from step 2).

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, LOCATION, SET_COOKIE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::form::{extract_hidden_fields, FormFields};
use crate::auth::pkce::{self, PkceSession, CHALLENGE_METHOD};
use crate::auth::Authenticator;
use crate::config::{Account, AuthConfig, CodeVerifierSource, HttpConfig, OwnerApiConfig};
use crate::credential::Credential;
use crate::error::{PowerwallError, Result};
use crate::http::{build_client, Redirects};

/// Grant type for the identity provider token exchange.
const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

/// Grant type for the owner API token exchange.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AuthorizationCodeRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    code: &'a str,
    code_verifier: &'a str,
    redirect_uri: &'a str,
}

#[derive(Debug, Serialize)]
struct JwtBearerRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Only `access_token` is required; refresh tokens and expiry hints are
/// not kept.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Result of the login POST: the authorization code plus the state the
/// provider echoed back, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRedirect {
    /// Authorization code to exchange.
    pub code: String,
    /// `state` query parameter from the redirect.
    pub state: Option<String>,
}

// ---------------------------------------------------------------------------
// LoginFlow
// ---------------------------------------------------------------------------

/// Drives the six-step login exchange.
///
/// # Examples
///
/// ```no_run
/// use powerwall::auth::flow::LoginFlow;
/// use powerwall::auth::Authenticator;
/// use powerwall::config::{Account, Config};
///
/// # async fn example() -> powerwall::error::Result<()> {
/// let config = Config::default();
/// let flow = LoginFlow::new(&config.auth, &config.owner_api, &config.http)?;
/// let account = Account::new("me@example.com", "hunter2");
/// let credential = flow.authenticate(&account).await?;
/// # Ok(())
/// # }
/// ```
pub struct LoginFlow {
    browser: reqwest::Client,
    no_redirect: reqwest::Client,
    auth: AuthConfig,
    owner_api: OwnerApiConfig,
}

impl LoginFlow {
    /// Creates a flow for the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`PowerwallError::Config`] if an HTTP client cannot be built.
    pub fn new(auth: &AuthConfig, owner_api: &OwnerApiConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            browser: build_client(http.timeout(), Redirects::Follow)?,
            no_redirect: build_client(http.timeout(), Redirects::Manual)?,
            auth: auth.clone(),
            owner_api: owner_api.clone(),
        })
    }

    /// Builds the authorize URL for a PKCE session.
    ///
    /// # Errors
    ///
    /// Returns [`PowerwallError::Config`] when `authorize_url` is not a
    /// valid URL.
    pub fn authorization_url(&self, session: &PkceSession) -> Result<Url> {
        let mut url = Url::parse(&self.auth.authorize_url).map_err(|e| {
            PowerwallError::Config(format!(
                "invalid authorize_url '{}': {e}",
                self.auth.authorize_url
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.auth.client_id)
            .append_pair("code_challenge", &session.challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("redirect_uri", &self.auth.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.auth.scope)
            .append_pair("state", &session.state);
        Ok(url)
    }

    /// Step 1: fetch the login page. Returns the HTML body and the cookie
    /// header to replay.
    async fn fetch_login_page(&self, url: &Url) -> Result<(String, Option<String>)> {
        let resp = self
            .browser
            .get(url.clone())
            .send()
            .await
            .map_err(|e| auth_transport("login page request failed", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PowerwallError::Auth(format!("login page returned {status}")).into());
        }

        let cookies = cookie_header(resp.headers());
        let body = resp
            .text()
            .await
            .map_err(|e| auth_transport("failed to read login page", e))?;
        Ok((body, cookies))
    }

    /// Steps 3 and 4: submit the filled form and parse the redirect.
    async fn submit_login(
        &self,
        url: &Url,
        fields: &FormFields,
        cookies: Option<&str>,
    ) -> Result<AuthorizationRedirect> {
        let mut req = self.no_redirect.post(url.clone()).form(fields);
        if let Some(cookies) = cookies {
            req = req.header(COOKIE, cookies);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| auth_transport("login form submission failed", e))?;

        let status = resp.status();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                PowerwallError::Auth(format!(
                    "login form returned {status} without a redirect; check username and password"
                ))
            })?;

        parse_authorization_redirect(url, location)
    }

    /// Step 5: authorization code for a first-stage bearer token.
    async fn exchange_code(&self, code: &str, session: &PkceSession) -> Result<String> {
        let verifier = match self.auth.code_verifier_source {
            CodeVerifierSource::AuthorizationCode => {
                base64::engine::general_purpose::URL_SAFE.encode(code.as_bytes())
            }
            CodeVerifierSource::PkceVerifier => session.verifier.clone(),
        };

        let body = AuthorizationCodeRequest {
            grant_type: AUTHORIZATION_CODE_GRANT,
            client_id: &self.auth.client_id,
            code,
            code_verifier: &verifier,
            redirect_uri: &self.auth.redirect_uri,
        };

        let resp = self
            .browser
            .post(&self.auth.token_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| auth_transport("code exchange request failed", e))?;

        read_access_token(resp, "code exchange").await
    }

    /// Step 6: first-stage bearer token for the owner API access token.
    async fn exchange_bearer(&self, bearer: &str) -> Result<String> {
        let body = JwtBearerRequest {
            grant_type: JWT_BEARER_GRANT,
            client_id: &self.owner_api.client_id,
            client_secret: &self.owner_api.client_secret,
        };

        let resp = self
            .no_redirect
            .post(self.owner_api.token_url())
            .bearer_auth(bearer)
            .header(reqwest::header::USER_AGENT, &self.owner_api.user_agent)
            .header("X-Tesla-User-Agent", &self.owner_api.tesla_user_agent)
            .json(&body)
            .send()
            .await
            .map_err(|e| auth_transport("owner API token request failed", e))?;

        read_access_token(resp, "owner API token exchange").await
    }
}

#[async_trait]
impl Authenticator for LoginFlow {
    async fn authenticate(&self, account: &Account) -> Result<Credential> {
        let session = pkce::generate(self.auth.verifier_length, self.auth.state_length)?;
        let url = self.authorization_url(&session)?;

        tracing::debug!("Fetching login page");
        let (page, cookies) = self.fetch_login_page(&url).await?;

        let mut fields = extract_hidden_fields(&page, &self.auth.form_class)?;
        tracing::debug!("Sign-in form carries {} hidden fields", fields.len());
        fields.set("identity", account.username.as_str());
        fields.set("credential", account.password());

        tracing::debug!("Submitting sign-in form");
        let redirect = self.submit_login(&url, &fields, cookies.as_deref()).await?;
        if let Some(returned) = &redirect.state {
            if returned != &session.state {
                return Err(PowerwallError::Auth(
                    "state returned by identity provider does not match".to_string(),
                )
                .into());
            }
        }

        tracing::debug!("Exchanging authorization code");
        let bearer = self.exchange_code(&redirect.code, &session).await?;

        tracing::debug!("Exchanging bearer token for owner API access token");
        let access_token = self.exchange_bearer(&bearer).await?;

        tracing::info!("Obtained new owner API access token");
        Ok(Credential::new(access_token))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Joins the `name=value` part of every `Set-Cookie` header into a single
/// `Cookie` header value.
pub fn cookie_header(headers: &HeaderMap<HeaderValue>) -> Option<String> {
    let pairs: Vec<&str> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

/// Parses a redirect `Location` into an [`AuthorizationRedirect`].
///
/// Relative locations are resolved against `base`. The redirect target is
/// never fetched.
///
/// # Errors
///
/// Returns [`PowerwallError::Auth`] when the location cannot be parsed or
/// carries no `code`.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use powerwall::auth::flow::parse_authorization_redirect;
///
/// let base = Url::parse("https://auth.example.com/oauth2/v3/authorize").unwrap();
/// let redirect = parse_authorization_redirect(
///     &base,
///     "https://auth.example.com/void/callback?code=abc&state=xyz",
/// )
/// .unwrap();
/// assert_eq!(redirect.code, "abc");
/// assert_eq!(redirect.state.as_deref(), Some("xyz"));
/// ```
pub fn parse_authorization_redirect(base: &Url, location: &str) -> Result<AuthorizationRedirect> {
    let target = base
        .join(location)
        .map_err(|e| PowerwallError::Auth(format!("unparseable redirect location: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in target.query_pairs() {
        match key.as_ref() {
            "code" if code.is_none() => code = Some(value.into_owned()),
            "state" if state.is_none() => state = Some(value.into_owned()),
            _ => {}
        }
    }

    match code {
        Some(code) if !code.is_empty() => Ok(AuthorizationRedirect { code, state }),
        _ => Err(PowerwallError::Auth("no authorization code in redirect".to_string()).into()),
    }
}

async fn read_access_token(resp: reqwest::Response, step: &str) -> Result<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| auth_transport(&format!("failed to read {step} response"), e))?;

    if !status.is_success() {
        return Err(PowerwallError::Auth(format!("{step} returned {status}")).into());
    }

    let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        PowerwallError::Auth(format!("{step} response has no usable access_token: {e}"))
    })?;
    if token.access_token.is_empty() {
        return Err(PowerwallError::Auth(format!("{step} returned an empty access_token")).into());
    }
    Ok(token.access_token)
}

fn auth_transport(context: &str, err: reqwest::Error) -> PowerwallError {
    let kind = if err.is_timeout() { "timed out" } else { "failed" };
    PowerwallError::Auth(format!("{context} ({kind}): {err}"))
}
