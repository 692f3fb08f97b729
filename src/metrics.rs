//! Metrics sink for credential and device telemetry
//!
//! Components report through an injected [`MetricsSink`] rather than a
//! process-wide recorder. The one-shot CLI passes [`NoopMetrics`]; the
//! monitor passes a [`RecorderMetrics`] backed by the Prometheus exporter.
//!
//! # Metrics
//!
//! - `token_age_days`: gauge, age of the credential in use
//! - `refresh_success` / `refresh_failed`: counters, re-authentication outcomes
//! - `credential_save_failed`: counter, failed credential writes
//! - `fetch_success` / `fetch_failed` / `fetch_auth_failed`: counters,
//!   live-status polls
//! - live-status gauges, see [`LIVE_STATUS_GAUGES`]

use std::sync::Arc;

use ::metrics::{Key, KeyName, Recorder};

pub const TOKEN_AGE_DAYS: &str = "token_age_days";
pub const REFRESH_SUCCESS: &str = "refresh_success";
pub const REFRESH_FAILED: &str = "refresh_failed";
pub const CREDENTIAL_SAVE_FAILED: &str = "credential_save_failed";
pub const FETCH_SUCCESS: &str = "fetch_success";
pub const FETCH_FAILED: &str = "fetch_failed";
pub const FETCH_AUTH_FAILED: &str = "fetch_auth_failed";

pub const SOLAR_WATTS: &str = "solar_watts";
pub const POWERWALL_ENERGY_WH: &str = "powerwall_energy_wh";
pub const POWERWALL_CAPACITY_WH: &str = "powerwall_capacity_wh";
pub const POWERWALL_WATTS: &str = "powerwall_watts";
pub const HOUSE_LOAD_WATTS: &str = "house_load_watts";
pub const GRID_WATTS: &str = "grid_watts";
pub const GRID_PRESENT: &str = "grid_present";
pub const STORM_MODE_ACTIVE: &str = "storm_mode_active";
pub const ON_GRID: &str = "on_grid";
pub const PERCENTAGE_CHARGED: &str = "percentage_charged";

/// Live-status gauges and their help text.
pub const LIVE_STATUS_GAUGES: &[(&str, &str)] = &[
    (SOLAR_WATTS, "Solar generation in watts"),
    (POWERWALL_ENERGY_WH, "Energy left in the battery in watt-hours"),
    (POWERWALL_CAPACITY_WH, "Total battery pack energy in watt-hours"),
    (POWERWALL_WATTS, "Battery power in watts, positive when discharging"),
    (HOUSE_LOAD_WATTS, "House load in watts"),
    (GRID_WATTS, "Grid power in watts, positive when importing"),
    (GRID_PRESENT, "1 when the grid is up"),
    (STORM_MODE_ACTIVE, "1 when storm watch is active"),
    (ON_GRID, "1 when the site is connected to the grid"),
    (PERCENTAGE_CHARGED, "Battery charge in percent"),
];

const COUNTERS: &[(&str, &str)] = &[
    (REFRESH_SUCCESS, "Successful credential re-authentications"),
    (REFRESH_FAILED, "Failed credential re-authentications"),
    (CREDENTIAL_SAVE_FAILED, "Credential writes that failed"),
    (FETCH_SUCCESS, "Successful live-status polls"),
    (FETCH_FAILED, "Live-status polls that failed"),
    (FETCH_AUTH_FAILED, "Live-status polls rejected for the credential"),
];

/// Destination for gauge and counter updates.
pub trait MetricsSink: Send + Sync {
    /// Sets gauge `name` to `value`.
    fn set(&self, name: &'static str, value: f64);

    /// Increments counter `name` by one.
    fn increment(&self, name: &'static str);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set(&self, _name: &'static str, _value: f64) {}

    fn increment(&self, _name: &'static str) {}
}

/// Writes to an owned [`Recorder`].
///
/// # Examples
///
/// ```
/// use metrics_exporter_prometheus::PrometheusBuilder;
/// use powerwall::metrics::{MetricsSink, RecorderMetrics, TOKEN_AGE_DAYS};
///
/// let recorder = PrometheusBuilder::new().build_recorder();
/// let handle = recorder.handle();
/// let sink = RecorderMetrics::new(recorder);
/// sink.set(TOKEN_AGE_DAYS, 3.0);
/// assert!(handle.render().contains("token_age_days 3"));
/// ```
#[derive(Clone)]
pub struct RecorderMetrics {
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl RecorderMetrics {
    /// Wraps `recorder` and registers help text for every known metric.
    pub fn new<R>(recorder: R) -> Self
    where
        R: Recorder + Send + Sync + 'static,
    {
        recorder.describe_gauge(
            KeyName::from(TOKEN_AGE_DAYS),
            None,
            "Age of the credential in use, in days".into(),
        );
        for (name, help) in LIVE_STATUS_GAUGES {
            recorder.describe_gauge(KeyName::from(*name), None, (*help).into());
        }
        for (name, help) in COUNTERS {
            recorder.describe_counter(KeyName::from(*name), None, (*help).into());
        }

        Self {
            recorder: Arc::new(recorder),
        }
    }
}

impl MetricsSink for RecorderMetrics {
    fn set(&self, name: &'static str, value: f64) {
        self.recorder
            .register_gauge(&Key::from_static_name(name))
            .set(value);
    }

    fn increment(&self, name: &'static str) {
        self.recorder
            .register_counter(&Key::from_static_name(name))
            .increment(1);
    }
}

impl std::fmt::Debug for RecorderMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderMetrics").finish_non_exhaustive()
    }
}
