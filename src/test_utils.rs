//! In-memory fakes for unit tests
//!
//! Each fake records the calls it receives so tests can assert on order and
//! count without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::Authenticator;
use crate::config::Account;
use crate::credential::{Credential, CredentialStore, StoredCredential};
use crate::device::{EnergyApi, LiveStatus, SiteId, SiteLookup};
use crate::error::{PowerwallError, Result};
use crate::metrics::MetricsSink;

// ---------------------------------------------------------------------------
// FakeEnergyApi
// ---------------------------------------------------------------------------

#[derive(Default)]
struct EnergyState {
    default_lookup: Option<SiteLookup>,
    lookups: HashMap<String, SiteLookup>,
    charge: f64,
    fail_mode: bool,
    fail_reserve: bool,
    fail_live: Option<fn() -> PowerwallError>,
    calls: Vec<String>,
    reserves: Vec<f64>,
}

/// Scriptable [`EnergyApi`].
pub struct FakeEnergyApi {
    state: Mutex<EnergyState>,
}

impl FakeEnergyApi {
    /// Every credential resolves to energy site `site`.
    pub fn with_site(site: i64) -> Self {
        Self {
            state: Mutex::new(EnergyState {
                default_lookup: Some(SiteLookup::Found(SiteId(site))),
                charge: 50.0,
                ..EnergyState::default()
            }),
        }
    }

    /// Probes with `token` report the credential as unusable.
    pub fn reject_token(&self, token: &str) {
        self.state.lock().unwrap().lookups.insert(
            token.to_string(),
            SiteLookup::Unusable("401 Unauthorized".to_string()),
        );
    }

    /// Probes with `token` find no energy site.
    pub fn token_without_energy_site(&self, token: &str) {
        self.state
            .lock()
            .unwrap()
            .lookups
            .insert(token.to_string(), SiteLookup::NoEnergySite);
    }

    /// Every probe reports a working credential with no energy site.
    pub fn without_energy_site(&self) {
        self.state.lock().unwrap().default_lookup = Some(SiteLookup::NoEnergySite);
    }

    pub fn set_charge(&self, charge: f64) {
        self.state.lock().unwrap().charge = charge;
    }

    pub fn fail_mode(&self) {
        self.state.lock().unwrap().fail_mode = true;
    }

    pub fn fail_reserve(&self) {
        self.state.lock().unwrap().fail_reserve = true;
    }

    /// Live-status reads fail with the error built by `make`.
    pub fn fail_live_status(&self, make: fn() -> PowerwallError) {
        self.state.lock().unwrap().fail_live = Some(make);
    }

    /// Calls in the order received.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Reserve values sent, in order.
    pub fn reserves(&self) -> Vec<f64> {
        self.state.lock().unwrap().reserves.clone()
    }

    /// Tokens the product list was probed with, in order.
    pub fn probes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("probe:").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl EnergyApi for FakeEnergyApi {
    async fn resolve_site_id(&self, credential: &Credential) -> Result<SiteLookup> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("probe:{}", credential.as_str()));
        Ok(state
            .lookups
            .get(credential.as_str())
            .cloned()
            .or_else(|| state.default_lookup.clone())
            .unwrap_or(SiteLookup::NoEnergySite))
    }

    async fn set_mode_self_consumption(
        &self,
        _credential: &Credential,
        site: SiteId,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("mode:{site}"));
        if state.fail_mode {
            return Err(PowerwallError::Api("operation mode update returned 500".to_string()).into());
        }
        Ok(())
    }

    async fn set_backup_reserve(
        &self,
        _credential: &Credential,
        site: SiteId,
        percent: f64,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("reserve:{site}:{percent}"));
        state.reserves.push(percent);
        if state.fail_reserve {
            return Err(PowerwallError::Api("backup reserve update returned 500".to_string()).into());
        }
        Ok(())
    }

    async fn live_status(&self, _credential: &Credential, site: SiteId) -> Result<LiveStatus> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("live:{site}"));
        if let Some(make) = state.fail_live {
            return Err(make().into());
        }
        Ok(LiveStatus {
            percentage_charged: Some(state.charge),
            ..LiveStatus::default()
        })
    }
}

// ---------------------------------------------------------------------------
// FakeAuthenticator
// ---------------------------------------------------------------------------

/// [`Authenticator`] that replays scripted outcomes.
///
/// Once the script is exhausted every call fails.
pub struct FakeAuthenticator {
    outcomes: Mutex<VecDeque<std::result::Result<String, String>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeAuthenticator {
    /// Issues `token` on the first call.
    pub fn issuing(token: &str) -> Self {
        Self::scripted(vec![Ok(token.to_string())])
    }

    /// Fails with [`PowerwallError::Auth`] on every call.
    pub fn failing() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(outcomes: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self, _account: &Account) -> Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some(Ok(token)) => Ok(Credential::new(token)),
            Some(Err(reason)) => Err(PowerwallError::Auth(reason).into()),
            None => Err(PowerwallError::Auth("login form returned 200 without a redirect".to_string()).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// [`CredentialStore`] held in memory.
#[derive(Default)]
pub struct MemoryStore {
    stored: Mutex<StoredCredential>,
    saves: Mutex<Vec<String>>,
    fail_save: bool,
}

impl MemoryStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Holds `token` written `age_days` ago.
    pub fn holding(token: &str, age_days: i64) -> Self {
        Self {
            stored: Mutex::new(StoredCredential {
                credential: Credential::new(token),
                age_days,
                modified: Some(chrono::Utc::now() - chrono::Duration::days(age_days)),
            }),
            ..Self::default()
        }
    }

    /// Every save fails.
    pub fn failing_saves(mut self) -> Self {
        self.fail_save = true;
        self
    }

    /// Tokens successfully saved, in order.
    pub fn saves(&self) -> Vec<String> {
        self.saves.lock().unwrap().clone()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> StoredCredential {
        self.stored.lock().unwrap().clone()
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        if self.fail_save {
            return Err(PowerwallError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only state dir",
            ))
            .into());
        }
        self.saves
            .lock()
            .unwrap()
            .push(credential.as_str().to_string());
        *self.stored.lock().unwrap() = StoredCredential {
            credential: credential.clone(),
            age_days: 0,
            modified: Some(chrono::Utc::now()),
        };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingMetrics
// ---------------------------------------------------------------------------

/// [`MetricsSink`] that remembers the last gauge values and counter totals.
#[derive(Default)]
pub struct RecordingMetrics {
    gauges: Mutex<HashMap<&'static str, f64>>,
    counters: Mutex<HashMap<&'static str, u64>>,
}

impl RecordingMetrics {
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.lock().unwrap().get(name).copied()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl MetricsSink for RecordingMetrics {
    fn set(&self, name: &'static str, value: f64) {
        self.gauges.lock().unwrap().insert(name, value);
    }

    fn increment(&self, name: &'static str) {
        *self.counters.lock().unwrap().entry(name).or_insert(0) += 1;
    }
}
