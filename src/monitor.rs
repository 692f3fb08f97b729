//! Long-running monitor
//!
//! Keeps a credential fresh, polls the site's live status and serves the
//! results in the Prometheus text format.
//!
//! # Module Layout
//!
//! - [`build_router`]: `/` liveness and `/metrics` exposition
//! - [`Monitor`]: the refresh loop and the poll loop
//! - [`publish_live_status`]: maps a [`LiveStatus`] onto gauges

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::time::MissedTickBehavior;

use crate::config::MonitorConfig;
use crate::credential::{CredentialRefresher, RefreshOutcome, SharedCredential};
use crate::device::{EnergyApi, LiveStatus};
use crate::error::{PowerwallError, Result};
use crate::metrics::{self, MetricsSink};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

/// State shared by the HTTP handlers.
pub struct MonitorState {
    pub credential: SharedCredential,
    pub metrics: Arc<dyn MetricsSink>,
    pub handle: PrometheusHandle,
}

/// Builds the axum `Router` for the metrics listener.
pub fn build_router(state: Arc<MonitorState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

/// `GET /metrics`
async fn render_metrics(State(s): State<Arc<MonitorState>>) -> impl IntoResponse {
    let age = s.credential.age_days().await;
    s.metrics.set(metrics::TOKEN_AGE_DAYS, age as f64);
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], s.handle.render())
}

/// Publishes every field present in `status`. Absent fields leave their
/// gauge untouched.
pub fn publish_live_status(sink: &dyn MetricsSink, status: &LiveStatus) {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let values = [
        (metrics::SOLAR_WATTS, status.solar_power),
        (metrics::POWERWALL_ENERGY_WH, status.energy_left),
        (metrics::POWERWALL_CAPACITY_WH, status.total_pack_energy),
        (metrics::POWERWALL_WATTS, status.battery_power),
        (metrics::HOUSE_LOAD_WATTS, status.load_power),
        (metrics::GRID_WATTS, status.grid_power),
        (metrics::PERCENTAGE_CHARGED, status.percentage_charged),
        (metrics::GRID_PRESENT, status.grid_present().map(flag)),
        (metrics::STORM_MODE_ACTIVE, status.storm_mode_active.map(flag)),
        (metrics::ON_GRID, status.on_grid().map(flag)),
    ];
    for (name, value) in values {
        if let Some(value) = value {
            sink.set(name, value);
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Drives the refresh and poll loops.
pub struct Monitor {
    credential: SharedCredential,
    refresher: Arc<CredentialRefresher>,
    api: Arc<dyn EnergyApi>,
    metrics: Arc<dyn MetricsSink>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        credential: SharedCredential,
        refresher: Arc<CredentialRefresher>,
        api: Arc<dyn EnergyApi>,
        metrics: Arc<dyn MetricsSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            credential,
            refresher,
            api,
            metrics,
            config,
        }
    }

    /// Re-validates the credential through the shared holder.
    ///
    /// # Errors
    ///
    /// Returns an error only when no usable credential can be obtained.
    pub async fn refresh_once(&self) -> Result<RefreshOutcome> {
        let outcome = self.credential.refresh(&self.refresher).await?;
        if let RefreshOutcome::Completed(freshness) = outcome {
            tracing::info!("Credential check completed: {:?}", freshness);
        }
        Ok(outcome)
    }

    /// Reads live status once and publishes it.
    ///
    /// A rejected credential triggers an immediate refresh; any other
    /// failure is counted and logged.
    ///
    /// # Errors
    ///
    /// Returns an error only when that refresh fails fatally.
    pub async fn poll_once(&self) -> Result<()> {
        let current = self.credential.snapshot().await;
        match self.api.live_status(&current.credential, current.site).await {
            Ok(status) => {
                publish_live_status(self.metrics.as_ref(), &status);
                self.metrics.increment(metrics::FETCH_SUCCESS);
                Ok(())
            }
            Err(e) => match e.downcast_ref::<PowerwallError>() {
                Some(PowerwallError::CredentialUnusable(_)) => {
                    self.metrics.increment(metrics::FETCH_AUTH_FAILED);
                    tracing::warn!("Live status rejected the credential: {:#}", e);
                    self.refresh_once().await.map(|_| ())
                }
                _ => {
                    self.metrics.increment(metrics::FETCH_FAILED);
                    tracing::warn!("Live status poll failed: {:#}", e);
                    Ok(())
                }
            },
        }
    }

    async fn refresh_loop(&self) -> Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.refresh_interval_seconds,
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the credential was just validated.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.refresh_once().await?;
        }
    }

    async fn poll_loop(&self) -> Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.poll_once().await?;
        }
    }

    /// Serves `/metrics` and runs both loops until Ctrl-C or a fatal
    /// refresh failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind, the server fails, or a
    /// refresh fails fatally.
    pub async fn run(self, handle: PrometheusHandle) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|e| {
                PowerwallError::Config(format!(
                    "cannot listen on {}: {e}",
                    self.config.listen_addr
                ))
            })?;
        tracing::info!("Serving metrics on http://{}/metrics", listener.local_addr()?);

        let router = build_router(Arc::new(MonitorState {
            credential: self.credential.clone(),
            metrics: self.metrics.clone(),
            handle,
        }));

        tokio::select! {
            res = axum::serve(listener, router).into_future() => {
                res.map_err(|e| PowerwallError::Network(format!("metrics listener failed: {e}")))?;
                Ok(())
            }
            res = self.refresh_loop() => res,
            res = self.poll_loop() => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down monitor");
                Ok(())
            }
        }
    }
}
