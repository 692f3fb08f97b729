/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes two top-level command modules:

- `reserve`: one-shot backup reserve set, hold or query
- `monitor`: long-running credential keeper and metrics exporter

Both build the same components from a [`Config`] via [`Components`].
*/

use std::sync::Arc;

use crate::auth::flow::LoginFlow;
use crate::config::Config;
use crate::credential::{CredentialRefresher, FileCredentialStore};
use crate::device::{EnergyApi, OwnerApiClient};
use crate::error::Result;
use crate::metrics::MetricsSink;

/// Wired-up production components.
pub struct Components {
    pub api: Arc<dyn EnergyApi>,
    pub refresher: CredentialRefresher,
}

impl Components {
    /// Builds the store, login flow, owner API client and refresher.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn build(config: &Config, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        let path = config.credential.path();
        tracing::debug!("Credential file: {}", path.display());

        let store = Arc::new(FileCredentialStore::new(path));
        let flow = Arc::new(LoginFlow::new(&config.auth, &config.owner_api, &config.http)?);
        let api: Arc<dyn EnergyApi> = Arc::new(OwnerApiClient::new(&config.owner_api, &config.http)?);

        let refresher = CredentialRefresher::new(
            store,
            flow,
            api.clone(),
            metrics,
            config.account.clone(),
            config.credential.policy(),
        );

        Ok(Self { api, refresher })
    }
}

// Reserve command handler
pub mod reserve {
    //! One-shot backup reserve handler.
    //!
    //! Loads or renews the credential, resolves the energy site and runs a
    //! single [`ReserveCommand`].

    use super::*;
    use crate::device::{CommandOutcome, DeviceController, ReserveCommand};
    use crate::metrics::NoopMetrics;

    /// Run one reserve command
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `command` - What to do with the backup reserve
    ///
    /// # Returns
    ///
    /// What the command did; the caller decides how to print it
    ///
    /// # Errors
    ///
    /// Returns an error if no usable credential can be obtained or the
    /// command fails.
    pub async fn run_reserve(config: &Config, command: ReserveCommand) -> Result<CommandOutcome> {
        let components = Components::build(config, Arc::new(NoopMetrics))?;
        let validated = components.refresher.ensure().await?;
        tracing::debug!(
            "Using {:?} credential for energy site {}",
            validated.freshness,
            validated.site
        );

        let controller =
            DeviceController::new(components.api, validated.credential, validated.site);
        controller.execute(command).await
    }
}

// Monitor command handler
pub mod monitor {
    //! Long-running monitor handler.

    use super::*;
    use crate::credential::SharedCredential;
    use crate::metrics::RecorderMetrics;
    use crate::monitor::Monitor;
    use metrics_exporter_prometheus::PrometheusBuilder;

    /// Start the monitor
    ///
    /// Validates the credential once up front; a failure there is fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial credential cannot be obtained, the
    /// listener cannot bind, or a later refresh fails fatally.
    pub async fn run_monitor(config: Config) -> Result<()> {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let metrics: Arc<dyn MetricsSink> = Arc::new(RecorderMetrics::new(recorder));

        let components = Components::build(&config, metrics.clone())?;
        let initial = components.refresher.ensure().await?;
        tracing::info!(
            "Monitoring energy site {} ({:?} credential)",
            initial.site,
            initial.freshness
        );

        let monitor = Monitor::new(
            SharedCredential::new(initial),
            Arc::new(components.refresher),
            components.api,
            metrics,
            config.monitor,
        );
        monitor.run(handle).await
    }
}
