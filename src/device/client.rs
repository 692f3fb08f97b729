//! Owner API energy-site client
//!
//! [`EnergyApi`] is the seam between policy code and the owner API;
//! [`OwnerApiClient`] is the HTTP implementation.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{HttpConfig, OwnerApiConfig};
use crate::credential::Credential;
use crate::error::{PowerwallError, Result};
use crate::http::{build_client, Redirects};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SELF_CONSUMPTION_MODE: &str = "self_consumption";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifier of an energy site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteId(pub i64);

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of the product-list probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteLookup {
    /// The credential works and the account has this energy site.
    Found(SiteId),
    /// The credential works but no product is an energy site.
    NoEnergySite,
    /// The call failed; the credential is treated as unusable.
    Unusable(String),
}

impl SiteLookup {
    /// `true` only for [`SiteLookup::Found`].
    pub fn ok(&self) -> bool {
        matches!(self, SiteLookup::Found(_))
    }

    /// The site id, if found.
    pub fn site_id(&self) -> Option<SiteId> {
        match self {
            SiteLookup::Found(id) => Some(*id),
            _ => None,
        }
    }
}

/// Live status of an energy site. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStatus {
    pub solar_power: Option<f64>,
    pub energy_left: Option<f64>,
    pub total_pack_energy: Option<f64>,
    pub percentage_charged: Option<f64>,
    pub backup_capable: Option<bool>,
    pub battery_power: Option<f64>,
    pub load_power: Option<f64>,
    pub grid_status: Option<String>,
    pub grid_power: Option<f64>,
    pub island_status: Option<String>,
    pub storm_mode_active: Option<bool>,
    pub timestamp: Option<String>,
}

impl LiveStatus {
    /// `true` when the grid reports itself up.
    pub fn grid_present(&self) -> Option<bool> {
        self.grid_status.as_deref().map(|s| s == "Active")
    }

    /// `true` when the site is connected to the grid.
    pub fn on_grid(&self) -> Option<bool> {
        self.island_status.as_deref().map(|s| s == "on_grid")
    }
}

#[derive(Deserialize)]
struct ProductList {
    response: Vec<Value>,
}

#[derive(Deserialize)]
struct LiveStatusEnvelope {
    response: LiveStatus,
}

#[derive(Serialize)]
struct OperationRequest<'a> {
    default_real_mode: &'a str,
}

#[derive(Serialize)]
struct BackupRequest {
    backup_reserve_percent: f64,
}

// ---------------------------------------------------------------------------
// EnergyApi
// ---------------------------------------------------------------------------

/// Energy-site operations on the owner API.
#[async_trait]
pub trait EnergyApi: Send + Sync {
    /// Probes the credential with the product list and picks the first
    /// energy site.
    ///
    /// Any transport failure or non-success status is
    /// [`SiteLookup::Unusable`].
    ///
    /// # Errors
    ///
    /// Returns [`PowerwallError::Api`] when a successful response has an
    /// unexpected shape.
    async fn resolve_site_id(&self, credential: &Credential) -> Result<SiteLookup>;

    /// Switches the site to self-consumption mode.
    async fn set_mode_self_consumption(&self, credential: &Credential, site: SiteId)
        -> Result<()>;

    /// Sets the backup reserve. `percent` is forwarded unmodified.
    async fn set_backup_reserve(
        &self,
        credential: &Credential,
        site: SiteId,
        percent: f64,
    ) -> Result<()>;

    /// Reads the full live status.
    async fn live_status(&self, credential: &Credential, site: SiteId) -> Result<LiveStatus>;

    /// Reads the battery charge percentage.
    ///
    /// # Errors
    ///
    /// Returns [`PowerwallError::Api`] when the live status has no
    /// `percentage_charged`.
    async fn get_charge_percent(&self, credential: &Credential, site: SiteId) -> Result<f64> {
        let status = self.live_status(credential, site).await?;
        status.percentage_charged.ok_or_else(|| {
            PowerwallError::Api("live status has no percentage_charged".to_string()).into()
        })
    }
}

// ---------------------------------------------------------------------------
// OwnerApiClient
// ---------------------------------------------------------------------------

/// HTTP implementation of [`EnergyApi`].
#[derive(Debug, Clone)]
pub struct OwnerApiClient {
    http: reqwest::Client,
    config: OwnerApiConfig,
}

impl OwnerApiClient {
    /// Creates a client for the configured owner API.
    ///
    /// # Errors
    ///
    /// Returns [`PowerwallError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &OwnerApiConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            http: build_client(http.timeout(), Redirects::Follow)?,
            config: config.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, credential: &Credential) -> RequestBuilder {
        self.http
            .request(method, self.config.api_url(path))
            .bearer_auth(credential.as_str())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(USER_AGENT, &self.config.user_agent)
            .header("X-Tesla-User-Agent", &self.config.tesla_user_agent)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Value> {
        let resp = req
            .send()
            .await
            .map_err(|e| PowerwallError::from_transport(what, e))?;
        read_json(resp, what).await
    }
}

#[async_trait]
impl EnergyApi for OwnerApiClient {
    async fn resolve_site_id(&self, credential: &Credential) -> Result<SiteLookup> {
        let resp = match self
            .request(Method::GET, "products", credential)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return Ok(SiteLookup::Unusable(
                    PowerwallError::from_transport("product list", e).to_string(),
                ))
            }
        };

        let status = resp.status();
        if !status.is_success() {
            return Ok(SiteLookup::Unusable(format!("product list returned {status}")));
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                return Ok(SiteLookup::Unusable(
                    PowerwallError::from_transport("product list body", e).to_string(),
                ))
            }
        };
        let products: ProductList = serde_json::from_str(&body)
            .map_err(|e| PowerwallError::Api(format!("malformed product list: {e}")))?;

        Ok(products
            .response
            .iter()
            .find_map(energy_site_id)
            .map(SiteLookup::Found)
            .unwrap_or(SiteLookup::NoEnergySite))
    }

    async fn set_mode_self_consumption(
        &self,
        credential: &Credential,
        site: SiteId,
    ) -> Result<()> {
        let req = self
            .request(
                Method::POST,
                &format!("energy_sites/{site}/operation"),
                credential,
            )
            .json(&OperationRequest {
                default_real_mode: SELF_CONSUMPTION_MODE,
            });
        self.send(req, "operation mode update").await?;
        tracing::debug!("Site {} set to self-consumption mode", site);
        Ok(())
    }

    async fn set_backup_reserve(
        &self,
        credential: &Credential,
        site: SiteId,
        percent: f64,
    ) -> Result<()> {
        let req = self
            .request(
                Method::POST,
                &format!("energy_sites/{site}/backup"),
                credential,
            )
            .json(&BackupRequest {
                backup_reserve_percent: percent,
            });
        self.send(req, "backup reserve update").await?;
        tracing::debug!("Site {} backup reserve set to {}", site, percent);
        Ok(())
    }

    async fn live_status(&self, credential: &Credential, site: SiteId) -> Result<LiveStatus> {
        let req = self.request(
            Method::GET,
            &format!("energy_sites/{site}/live_status"),
            credential,
        );
        let body = self.send(req, "live status").await?;
        let envelope: LiveStatusEnvelope = serde_json::from_value(body)
            .map_err(|e| PowerwallError::Api(format!("malformed live status: {e}")))?;
        Ok(envelope.response)
    }
}

/// `energy_site_id` of a product entry, as an integer or numeric string.
fn energy_site_id(product: &Value) -> Option<SiteId> {
    match product.get("energy_site_id")? {
        Value::Number(n) => n.as_i64().map(SiteId),
        Value::String(s) => s.trim().parse().ok().map(SiteId),
        _ => None,
    }
}

async fn read_json(resp: Response, what: &str) -> Result<Value> {
    let status = resp.status();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(PowerwallError::CredentialUnusable(format!("{what} returned {status}")).into());
    }
    if !status.is_success() {
        return Err(PowerwallError::Api(format!("{what} returned {status}")).into());
    }

    let body = resp
        .text()
        .await
        .map_err(|e| PowerwallError::from_transport(what, e))?;
    serde_json::from_str(&body)
        .map_err(|e| PowerwallError::Api(format!("{what} returned a non-JSON body: {e}")).into())
}
