// src/telemetry.rs
//! Tracing subscriber setup, metric descriptions and the Prometheus snapshot file.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_JSON: &str = "SENTINEL_LOG_JSON";
/// Where the binary writes a Prometheus text snapshot after a run. Unset: no recorder.
pub const ENV_METRICS_PATH: &str = "SENTINEL_METRICS_PATH";
const DEFAULT_DIRECTIVES: &str = "call_sentinel=info,sentinel=info,warn";

/// Install the global subscriber. `RUST_LOG` wins over the default directives;
/// `SENTINEL_LOG_JSON=1` switches to JSON lines. Safe to call more than once.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// One-time metric descriptions.
///
/// The library never installs a recorder: without one, `metrics` drops every update.
/// Hosts install their own, or use [`MetricsSnapshot::install_from_env`] as `sentinel` does.
/// Descriptions only reach a recorder that is installed before the first call.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "sentinel_rows_processed_total",
            "Rows handed to each filter."
        );
        describe_counter!(
            "sentinel_rows_flagged_total",
            "Rows flagged by each filter."
        );
        describe_counter!(
            "sentinel_sink_errors_total",
            "Failed export operations, per sink."
        );
        describe_gauge!(
            "sentinel_last_run_ts",
            "Unix ts when the pipeline last finished."
        );
    });
}

/// Prometheus recorder whose contents are written to a file once the run is over
/// (textfile-collector style; a batch run has no scrape window).
pub struct MetricsSnapshot {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsSnapshot {
    pub fn new(handle: PrometheusHandle, path: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            path: path.into(),
        }
    }

    /// Install the global recorder when `SENTINEL_METRICS_PATH` is set.
    pub fn install_from_env() -> Option<Self> {
        let path = std::env::var(ENV_METRICS_PATH).ok().filter(|p| !p.trim().is_empty())?;
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                ensure_metrics_described();
                Some(Self::new(handle, path))
            }
            Err(e) => {
                warn!(error = %e, "metrics recorder not installed");
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn write(&self) -> Result<()> {
        fs::write(&self.path, self.render())
            .with_context(|| format!("writing metrics to {}", self.path.display()))?;
        info!(path = %self.path.display(), "metrics written");
        Ok(())
    }
}
