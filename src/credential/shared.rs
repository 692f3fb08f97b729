//! Credential holder for long-running callers
//!
//! Readers clone a snapshot under a short read guard. A refresh runs all
//! of its network I/O without holding that lock and swaps the snapshot in
//! at the end. A separate gate keeps at most one refresh in flight; a
//! refresh requested while another runs is skipped rather than queued.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::credential::refresher::{CredentialRefresher, Freshness, ValidatedCredential};
use crate::error::Result;

/// Result of [`SharedCredential::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The refresh ran and the snapshot was replaced.
    Completed(Freshness),
    /// Another refresh was already in flight.
    Skipped,
}

/// Cloneable handle to the current [`ValidatedCredential`].
#[derive(Clone)]
pub struct SharedCredential {
    current: Arc<RwLock<ValidatedCredential>>,
    refresh_gate: Arc<Mutex<()>>,
}

impl SharedCredential {
    pub fn new(initial: ValidatedCredential) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    /// A copy of the current credential.
    pub async fn snapshot(&self) -> ValidatedCredential {
        self.current.read().await.clone()
    }

    /// Age in whole days of the current credential.
    pub async fn age_days(&self) -> i64 {
        self.current.read().await.age_days(Utc::now())
    }

    /// Runs [`CredentialRefresher::ensure`] and swaps in its result.
    ///
    /// # Errors
    ///
    /// Propagates a fatal error from `ensure`; the previous snapshot is left
    /// in place.
    pub async fn refresh(&self, refresher: &CredentialRefresher) -> Result<RefreshOutcome> {
        let Ok(_gate) = self.refresh_gate.try_lock() else {
            tracing::debug!("Credential refresh already in progress, skipping");
            return Ok(RefreshOutcome::Skipped);
        };

        let validated = refresher.ensure().await?;
        let freshness = validated.freshness;
        *self.current.write().await = validated;

        Ok(RefreshOutcome::Completed(freshness))
    }
}
