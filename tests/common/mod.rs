use std::path::Path;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use powerwall::config::{Account, Config};

pub const AUTH_CODE: &str = "auth-code-1";

/// base64url (padded) of [`AUTH_CODE`].
#[allow(dead_code)]
pub const AUTH_CODE_VERIFIER: &str = "YXV0aC1jb2RlLTE=";

pub const FIRST_STAGE_TOKEN: &str = "first-stage-bearer";

pub const SITE_ID: i64 = 1234567;

/// Login page as served by the identity provider, trimmed.
#[allow(dead_code)]
pub const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Tesla SSO</title></head>
<body>
  <form method="get" class="language-picker">
    <input type="hidden" name="locale" value="en-US" />
  </form>
  <form method="post" id="form" class="sso-form sign-in-form">
    <input type="hidden" name="_csrf" value="mh4O8Qn7-wyTq2wB-2OR2bzVdzSSZjlqd4iE" />
    <input type="hidden" name="_phase" value="authenticate" />
    <input type="hidden" name="_process" value="1" />
    <input type="hidden" name="transaction_id" value="qoqqxdxw" />
    <input type="hidden" name="cancel" value="" id="form-input-cancel" />
    <input type="email" name="identity" value="" />
    <input type="password" name="credential" value="" />
    <button type="submit">Sign In</button>
  </form>
</body>
</html>"#;

/// Configuration pointing every endpoint at `server`, with the credential
/// file inside `state_dir`.
#[allow(dead_code)]
pub fn test_config(server: &MockServer, state_dir: &Path) -> Config {
    let mut config = Config::default();
    config.account = Account::new("me@example.com", "hunter2");
    config.auth = config.auth.clone().with_base_url(&server.uri());
    config.owner_api.base_url = server.uri();
    config.http.timeout_seconds = 2;
    config.credential.state_dir = Some(state_dir.to_path_buf());
    config
}

/// Mounts the four identity steps, ending in `access_token`.
#[allow(dead_code)]
pub async fn mount_login(server: &MockServer, access_token: &str) {
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/authorize"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "tesla-auth.sid=s3ss10n; Path=/; HttpOnly")
                .set_body_string(LOGIN_PAGE),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v3/authorize"))
        .and(header("cookie", "tesla-auth.sid=s3ss10n"))
        .and(body_string_contains("identity=me%40example.com"))
        .and(body_string_contains("credential=hunter2"))
        .and(body_string_contains("transaction_id=qoqqxdxw"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            format!("https://auth.tesla.com/void/callback?code={AUTH_CODE}").as_str(),
        ))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .and(body_string_contains(r#""grant_type":"authorization_code""#))
        .and(body_string_contains(format!(r#""code":"{AUTH_CODE}""#)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": FIRST_STAGE_TOKEN,
            "refresh_token": "ignored",
            "expires_in": 300,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header(
            "authorization",
            format!("Bearer {FIRST_STAGE_TOKEN}").as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 3888000
        })))
        .mount(server)
        .await;
}

/// Mounts a product list that resolves `token` to [`SITE_ID`].
#[allow(dead_code)]
pub async fn mount_products(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/api/1/products"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [
                { "id": 1, "vin": "5YJ3E1EA7KF000000", "display_name": "Car" },
                { "energy_site_id": SITE_ID, "resource_type": "battery", "site_name": "Home" }
            ],
            "count": 2
        })))
        .mount(server)
        .await;
}

/// Mounts a product list for `token` that holds only a car.
#[allow(dead_code)]
pub async fn mount_products_without_site(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/api/1/products"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [{ "id": 1, "vin": "5YJ3E1EA7KF000000" }],
            "count": 1
        })))
        .mount(server)
        .await;
}

/// Mounts a product list that rejects `token`.
#[allow(dead_code)]
pub async fn mount_products_rejected(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/api/1/products"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .mount(server)
        .await;
}

/// Mounts a live status reporting `charge` percent.
#[allow(dead_code)]
pub async fn mount_live_status(server: &MockServer, charge: f64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/1/energy_sites/{SITE_ID}/live_status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "solar_power": 3250,
                "energy_left": 10350.5,
                "total_pack_energy": 13500,
                "percentage_charged": charge,
                "battery_power": -1200,
                "load_power": 1650,
                "grid_status": "Active",
                "grid_power": -400,
                "island_status": "on_grid",
                "storm_mode_active": false,
                "backup_capable": true,
                "timestamp": "2026-10-18T09:30:00-07:00"
            }
        })))
        .mount(server)
        .await;
}

/// Writes `token` as the stored credential, `age_days` old.
#[allow(dead_code)]
pub fn write_credential(state_dir: &Path, token: &str, age_days: u64) {
    let file = state_dir.join("tesla_bearer_token");
    std::fs::write(&file, token).expect("failed to write credential");
    let modified =
        std::time::SystemTime::now() - std::time::Duration::from_secs(age_days * 24 * 60 * 60);
    std::fs::File::options()
        .write(true)
        .open(&file)
        .and_then(|f| f.set_modified(modified))
        .expect("failed to set credential mtime");
}

/// Reads the stored credential back.
#[allow(dead_code)]
pub fn read_credential(state_dir: &Path) -> String {
    std::fs::read_to_string(state_dir.join("tesla_bearer_token")).expect("no stored credential")
}
