//! Backup reserve commands

use std::sync::Arc;

use crate::credential::Credential;
use crate::device::client::{EnergyApi, SiteId};
use crate::error::{PowerwallError, Result};

/// A single backup-reserve operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveCommand {
    /// Set the reserve to a fixed percentage.
    SetPercent(u8),
    /// Set the reserve to the current charge.
    Hold,
    /// Read the current charge.
    Query,
}

impl ReserveCommand {
    /// Maps command-line flags to a command. `--percent` wins over `--hold`
    /// and no flag at all means [`ReserveCommand::Query`].
    pub fn from_flags(percent: Option<u8>, hold: bool) -> Self {
        match (percent, hold) {
            (Some(p), _) => ReserveCommand::SetPercent(p),
            (None, true) => ReserveCommand::Hold,
            (None, false) => ReserveCommand::Query,
        }
    }

    /// Returns `true` if the command changes site settings.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, ReserveCommand::Query)
    }
}

/// What a command did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandOutcome {
    /// The backup reserve was set to `percent`.
    ReserveSet { percent: f64 },
    /// The battery is charged to `percent`.
    Charge { percent: f64 },
}

/// Runs [`ReserveCommand`]s against one energy site with one credential.
pub struct DeviceController {
    api: Arc<dyn EnergyApi>,
    credential: Credential,
    site: SiteId,
}

impl DeviceController {
    pub fn new(api: Arc<dyn EnergyApi>, credential: Credential, site: SiteId) -> Self {
        Self {
            api,
            credential,
            site,
        }
    }

    /// Executes `command`.
    ///
    /// For `SetPercent` and `Hold` the mode update and the reserve update
    /// are both attempted even if the first fails. Nothing is rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`PowerwallError::Command`] when the reserve was set but the
    /// mode update failed, or the reserve update's own error otherwise.
    pub async fn execute(&self, command: ReserveCommand) -> Result<CommandOutcome> {
        match command {
            ReserveCommand::SetPercent(percent) => {
                let percent = f64::from(percent);
                let mode = self.set_self_consumption().await;
                self.set_reserve(mode, percent).await
            }
            ReserveCommand::Hold => {
                let mode = self.set_self_consumption().await;
                let charge = self
                    .api
                    .get_charge_percent(&self.credential, self.site)
                    .await?;
                tracing::info!("Holding backup reserve at current charge {:.1}%", charge);
                self.set_reserve(mode, charge).await
            }
            ReserveCommand::Query => {
                let percent = self
                    .api
                    .get_charge_percent(&self.credential, self.site)
                    .await?;
                Ok(CommandOutcome::Charge { percent })
            }
        }
    }

    async fn set_self_consumption(&self) -> Result<()> {
        let result = self
            .api
            .set_mode_self_consumption(&self.credential, self.site)
            .await;
        if let Err(e) = &result {
            tracing::warn!("Failed to set self-consumption mode: {:#}", e);
        }
        result
    }

    async fn set_reserve(&self, mode: Result<()>, percent: f64) -> Result<CommandOutcome> {
        let reserve = self
            .api
            .set_backup_reserve(&self.credential, self.site, percent)
            .await;

        match (mode, reserve) {
            (Ok(()), Ok(())) => {
                tracing::info!("Backup reserve set to {}%", percent);
                Ok(CommandOutcome::ReserveSet { percent })
            }
            (Err(mode_err), Ok(())) => Err(PowerwallError::Command(format!(
                "backup reserve set to {percent}% but operation mode update failed: {mode_err:#}"
            ))
            .into()),
            (Ok(()), Err(reserve_err)) => {
                Err(reserve_err.context(format!("failed to set backup reserve to {percent}%")))
            }
            (Err(mode_err), Err(reserve_err)) => Err(PowerwallError::Command(format!(
                "operation mode update failed: {mode_err:#}; backup reserve update failed: {reserve_err:#}"
            ))
            .into()),
        }
    }
}
