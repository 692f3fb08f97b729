//! Browser-emulated login flow integration tests using wiremock
//!
//! Drives `src/auth/flow.rs` end to end against a mock identity provider
//! and owner API token endpoint:
//!
//! - hidden sign-in fields, account name and password are submitted with
//!   the session cookie
//! - the authorization code is read from the redirect without following it
//! - the `code_verifier` source follows configuration
//! - every failure surfaces as `PowerwallError::Auth` or `FormNotFound`

mod common;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use powerwall::auth::flow::LoginFlow;
use powerwall::auth::Authenticator;
use powerwall::config::{CodeVerifierSource, Config};
use powerwall::error::PowerwallError;

use common::*;

fn flow_for(config: &Config) -> LoginFlow {
    LoginFlow::new(&config.auth, &config.owner_api, &config.http).expect("flow")
}

fn config_for(server: &MockServer) -> Config {
    let dir = std::env::temp_dir();
    test_config(server, &dir)
}

fn downcast(err: &anyhow::Error) -> &PowerwallError {
    err.downcast_ref::<PowerwallError>()
        .expect("expected a PowerwallError")
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_login_returns_owner_api_token() {
    let server = MockServer::start().await;
    mount_login(&server, "owner-api-token").await;
    let config = config_for(&server);

    let credential = flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap();

    assert_eq!(credential.as_str(), "owner-api-token");
}

#[tokio::test]
async fn test_authorize_request_carries_pkce_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/authorize"))
        .and(query_param("client_id", "ownerapi"))
        .and(query_param("code_challenge_method", "S256"))
        .and(query_param("response_type", "code"))
        .and(query_param("scope", "openid email offline_access"))
        .and(query_param("redirect_uri", "https://auth.tesla.com/void/callback"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    let config = config_for(&server);

    // Submission is not mounted, so the flow stops after the first step.
    let err = flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap_err();
    assert!(matches!(downcast(&err), PowerwallError::Auth(_)));
}

#[tokio::test]
async fn test_default_code_verifier_is_base64url_of_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .and(body_string_contains(format!(
            r#""code_verifier":"{AUTH_CODE_VERIFIER}""#
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": FIRST_STAGE_TOKEN
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_login(&server, "owner-api-token").await;
    let config = config_for(&server);

    flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pkce_code_verifier_source_sends_session_verifier() {
    let server = MockServer::start().await;
    mount_login(&server, "owner-api-token").await;
    let mut config = config_for(&server);
    config.auth.code_verifier_source = CodeVerifierSource::PkceVerifier;

    flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let exchange = requests
        .iter()
        .find(|r| r.url.path() == "/oauth2/v3/token")
        .expect("code exchange request");
    let body: serde_json::Value = serde_json::from_slice(&exchange.body).unwrap();
    let verifier = body["code_verifier"].as_str().unwrap();

    assert_ne!(verifier, AUTH_CODE_VERIFIER);
    // 86 random bytes, unpadded base64url
    assert_eq!(verifier.len(), 115);

    let authorize = requests
        .iter()
        .find(|r| r.url.path() == "/oauth2/v3/authorize")
        .unwrap();
    let challenge = authorize
        .url
        .query_pairs()
        .find(|(k, _)| k == "code_challenge")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(challenge, powerwall::auth::pkce::challenge_for(verifier));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_sign_in_form_is_form_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>Maintenance</body></html>"),
        )
        .mount(&server)
        .await;
    let config = config_for(&server);

    let err = flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap_err();

    assert!(matches!(downcast(&err), PowerwallError::FormNotFound(_)));
}

#[tokio::test]
async fn test_wrong_password_without_redirect_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;
    let config = config_for(&server);

    let err = flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap_err();

    assert!(matches!(downcast(&err), PowerwallError::Auth(_)));
    assert!(err.to_string().contains("without a redirect"));
}

#[tokio::test]
async fn test_redirect_without_code_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "https://auth.tesla.com/void/callback?error=denied"),
        )
        .mount(&server)
        .await;
    let config = config_for(&server);

    let err = flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap_err();

    assert!(matches!(downcast(&err), PowerwallError::Auth(_)));
}

#[tokio::test]
async fn test_state_mismatch_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            "https://auth.tesla.com/void/callback?code=abc&state=not-the-session-state",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": FIRST_STAGE_TOKEN
        })))
        .expect(0)
        .mount(&server)
        .await;
    let config = config_for(&server);

    let err = flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("state"));
}

#[tokio::test]
async fn test_code_exchange_without_access_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "refresh_token": "only-a-refresh-token"
        })))
        .mount(&server)
        .await;
    mount_login(&server, "owner-api-token").await;
    let config = config_for(&server);

    let err = flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap_err();

    assert!(matches!(downcast(&err), PowerwallError::Auth(_)));
}

#[tokio::test]
async fn test_owner_token_rejection_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;
    mount_login(&server, "owner-api-token").await;
    let config = config_for(&server);

    let err = flow_for(&config)
        .authenticate(&config.account)
        .await
        .unwrap_err();

    assert!(matches!(downcast(&err), PowerwallError::Auth(_)));
    assert!(err.to_string().contains("401"));
}
