//! Credential validation and refresh policy
//!
//! [`CredentialRefresher::ensure`] turns whatever is in the store into a
//! credential that the owner API accepted a moment ago, together with the
//! energy site it resolved to.
//!
//! | Stored credential                 | Action                               | Failure   |
//! |-----------------------------------|--------------------------------------|-----------|
//! | absent                            | re-authenticate, re-probe, persist   | fatal     |
//! | probe rejected                    | re-authenticate, re-probe, persist   | fatal     |
//! | accepted, outside refresh margin  | use as is                            | n/a       |
//! | accepted, inside refresh margin   | re-authenticate, re-probe, persist   | keep old  |
//!
//! The provider does not disclose token lifetime, so age is measured from
//! the time the credential was written and compared to a fixed lifetime.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::Authenticator;
use crate::config::Account;
use crate::credential::{Credential, CredentialStore};
use crate::device::{EnergyApi, SiteId, SiteLookup};
use crate::error::{PowerwallError, Result};
use crate::metrics::{MetricsSink, CREDENTIAL_SAVE_FAILED, REFRESH_FAILED, REFRESH_SUCCESS, TOKEN_AGE_DAYS};

/// Days after which the provider stops honouring a token.
pub const DEFAULT_MAX_LIFETIME_DAYS: i64 = 45;

/// Days before expiry at which a proactive refresh is attempted.
pub const DEFAULT_REFRESH_MARGIN_DAYS: i64 = 7;

/// When a usable credential should be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub max_lifetime_days: i64,
    pub refresh_margin_days: i64,
}

impl RefreshPolicy {
    /// `true` once fewer than `refresh_margin_days` remain.
    ///
    /// # Examples
    ///
    /// ```
    /// use powerwall::credential::RefreshPolicy;
    ///
    /// let policy = RefreshPolicy::default();
    /// assert!(!policy.needs_refresh(38));
    /// assert!(policy.needs_refresh(39));
    /// ```
    pub fn needs_refresh(&self, age_days: i64) -> bool {
        self.max_lifetime_days - age_days < self.refresh_margin_days
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_lifetime_days: DEFAULT_MAX_LIFETIME_DAYS,
            refresh_margin_days: DEFAULT_REFRESH_MARGIN_DAYS,
        }
    }
}

/// How the credential in a [`ValidatedCredential`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Nothing was stored; a new credential was obtained.
    NoCredential,
    /// The stored credential was rejected; a new one was obtained.
    Stale,
    /// The stored credential was accepted and is not near expiry.
    Fresh,
    /// The stored credential was near expiry and has been replaced.
    AgingRefreshed,
    /// The stored credential was near expiry and replacing it failed.
    AgingUnrefreshed,
}

/// A credential the owner API has just accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCredential {
    pub credential: Credential,
    pub site: SiteId,
    pub freshness: Freshness,
    /// When the credential was issued, as far as is known.
    pub issued_at: DateTime<Utc>,
}

impl ValidatedCredential {
    /// Whole days since the credential was issued.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.issued_at).num_days().max(0)
    }
}

/// Applies [`RefreshPolicy`] to the stored credential.
pub struct CredentialRefresher {
    store: Arc<dyn CredentialStore>,
    authenticator: Arc<dyn Authenticator>,
    api: Arc<dyn EnergyApi>,
    metrics: Arc<dyn MetricsSink>,
    account: Account,
    policy: RefreshPolicy,
}

impl CredentialRefresher {
    /// Creates a refresher.
    ///
    /// # Arguments
    ///
    /// * `store` - Where the credential is loaded from and saved to
    /// * `authenticator` - Obtains new credentials
    /// * `api` - Probes credentials and resolves the energy site
    /// * `metrics` - Receives refresh outcomes and the credential age
    /// * `account` - Account used for re-authentication
    /// * `policy` - Proactive refresh thresholds
    pub fn new(
        store: Arc<dyn CredentialStore>,
        authenticator: Arc<dyn Authenticator>,
        api: Arc<dyn EnergyApi>,
        metrics: Arc<dyn MetricsSink>,
        account: Account,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            store,
            authenticator,
            api,
            metrics,
            account,
            policy,
        }
    }

    /// Loads, probes and if needed replaces the stored credential.
    ///
    /// # Errors
    ///
    /// Returns an error when no usable credential could be obtained: the
    /// forced re-authentication failed, the new credential was rejected, or
    /// the new credential finds no energy site
    /// ([`PowerwallError::DeviceNotFound`]). A stored credential without an
    /// energy site is treated as unusable and replaced first.
    pub async fn ensure(&self) -> Result<ValidatedCredential> {
        let stored = self.store.load();

        if stored.credential.is_empty() {
            tracing::info!("No stored credential, authenticating");
            return self.reauthenticate(Freshness::NoCredential).await;
        }

        let site = match self.api.resolve_site_id(&stored.credential).await? {
            SiteLookup::Found(site) => site,
            SiteLookup::NoEnergySite => {
                tracing::warn!("Stored credential sees no energy site, authenticating");
                return self.reauthenticate(Freshness::Stale).await;
            }
            SiteLookup::Unusable(reason) => {
                tracing::warn!("Stored credential rejected ({}), authenticating", reason);
                return self.reauthenticate(Freshness::Stale).await;
            }
        };

        let issued_at = stored.modified.unwrap_or_else(Utc::now);
        self.metrics.set(TOKEN_AGE_DAYS, stored.age_days as f64);

        if !self.policy.needs_refresh(stored.age_days) {
            tracing::debug!("Stored credential is {} days old", stored.age_days);
            return Ok(ValidatedCredential {
                credential: stored.credential,
                site,
                freshness: Freshness::Fresh,
                issued_at,
            });
        }

        tracing::info!(
            "Credential is {} days old, refreshing before the {} day limit",
            stored.age_days,
            self.policy.max_lifetime_days
        );
        match self.obtain().await {
            Ok((credential, site)) => {
                self.metrics.increment(REFRESH_SUCCESS);
                Ok(self.accept(credential, site, Freshness::AgingRefreshed))
            }
            Err(e) => {
                self.metrics.increment(REFRESH_FAILED);
                tracing::warn!("Proactive refresh failed, keeping current credential: {:#}", e);
                Ok(ValidatedCredential {
                    credential: stored.credential,
                    site,
                    freshness: Freshness::AgingUnrefreshed,
                    issued_at,
                })
            }
        }
    }

    async fn reauthenticate(&self, freshness: Freshness) -> Result<ValidatedCredential> {
        match self.obtain().await {
            Ok((credential, site)) => {
                self.metrics.increment(REFRESH_SUCCESS);
                Ok(self.accept(credential, site, freshness))
            }
            Err(e) => {
                self.metrics.increment(REFRESH_FAILED);
                Err(e.context("unable to obtain a usable owner API credential"))
            }
        }
    }

    /// Authenticates and probes the new credential.
    async fn obtain(&self) -> Result<(Credential, SiteId)> {
        let credential = self.authenticator.authenticate(&self.account).await?;
        match self.api.resolve_site_id(&credential).await? {
            SiteLookup::Found(site) => Ok((credential, site)),
            SiteLookup::NoEnergySite => Err(PowerwallError::DeviceNotFound.into()),
            SiteLookup::Unusable(reason) => Err(PowerwallError::CredentialUnusable(format!(
                "newly issued credential rejected: {reason}"
            ))
            .into()),
        }
    }

    /// Persists a new credential. A failed save is reported only.
    fn accept(&self, credential: Credential, site: SiteId, freshness: Freshness) -> ValidatedCredential {
        if let Err(e) = self.store.save(&credential) {
            self.metrics.increment(CREDENTIAL_SAVE_FAILED);
            tracing::warn!("Failed to save credential, continuing with it in memory: {:#}", e);
        }
        self.metrics.set(TOKEN_AGE_DAYS, 0.0);

        ValidatedCredential {
            credential,
            site,
            freshness,
            issued_at: Utc::now(),
        }
    }
}
