// src/pipeline.rs
//! One end-to-end run: read records, run the filter chain, extract categories, export.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use std::collections::BTreeMap;
use tracing::{error, info};
use uuid::Uuid;

use crate::category::{extract_all, CategoryResult};
use crate::chain::FilterChain;
use crate::config::RunConfig;
use crate::export::{build_exporters, ExportContext, Exporter};
use crate::filters::registry::read_global;
use crate::filters::FilterRegistry;
use crate::reader::CsvReader;
use crate::table::RecordTable;
use crate::telemetry::ensure_metrics_described;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub name: String,
    pub flagged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFailure {
    pub sink: String,
    pub error: String,
}

/// What a run did. Sink failures do not make `run` return `Err`; check `is_success`.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub rows_read: usize,
    pub categories: Vec<CategorySummary>,
    pub sink_failures: Vec<SinkFailure>,
}

impl RunReport {
    fn empty(run_id: Uuid) -> Self {
        Self {
            run_id,
            rows_read: 0,
            categories: Vec::new(),
            sink_failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.sink_failures.is_empty()
    }

    pub fn flagged(&self, category: &str) -> Option<usize> {
        self.categories
            .iter()
            .find(|c| c.name == category)
            .map(|c| c.flagged)
    }
}

/// Build the configured chain from `registry`, run it and extract every category.
pub fn annotate(
    config: &RunConfig,
    registry: &FilterRegistry,
    table: RecordTable,
) -> Result<Vec<CategoryResult>> {
    let chain = FilterChain::from_config(registry, config.filter_specs())
        .context("building filter chain")?;
    let snapshots = chain.handle_each(table).context("running filter chain")?;
    Ok(extract_all(&snapshots))
}

/// Registry descriptions for the configured filters.
pub fn describe(config: &RunConfig, registry: &FilterRegistry) -> BTreeMap<String, String> {
    config
        .filter_names()
        .into_iter()
        .filter_map(|n| registry.description(n).map(|d| (n.to_string(), d.to_string())))
        .collect()
}

/// Run every exporter in order; failures are recorded and do not stop later sinks.
pub async fn export_all(
    exporters: &[Box<dyn Exporter>],
    ctx: &ExportContext<'_>,
) -> Vec<SinkFailure> {
    let mut failures = Vec::new();
    for exporter in exporters {
        match exporter.export(ctx).await {
            Ok(()) => info!(sink = exporter.name(), "export done"),
            Err(e) => {
                error!(sink = exporter.name(), error = %e, "export failed");
                counter!("sentinel_sink_errors_total", "sink" => exporter.name()).increment(1);
                failures.push(SinkFailure {
                    sink: exporter.name().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    failures
}

/// Full run against the global registry.
pub async fn run(config: &RunConfig) -> Result<RunReport> {
    ensure_metrics_described();
    let run_id = Uuid::new_v4();

    if config.filters.is_empty() {
        info!(%run_id, "no filters configured, nothing to do");
        return Ok(RunReport::empty(run_id));
    }

    let table = CsvReader
        .read_source(&config.data_url)
        .await
        .context("reading records")?;
    let rows_read = table.len();

    // The registry guard must be released before any await.
    let (categories, descriptions) = {
        let registry = read_global();
        (
            annotate(config, &registry, table)?,
            describe(config, &registry),
        )
    };

    for c in &categories {
        info!(%run_id, category = %c.name, flagged = c.len(), "category extracted");
    }

    let exporters = build_exporters(config);
    let ctx = ExportContext::new(run_id, config, &categories, descriptions);
    let sink_failures = export_all(&exporters, &ctx).await;

    let now = chrono::Utc::now().timestamp().max(0);
    gauge!("sentinel_last_run_ts").set(now as f64);

    Ok(RunReport {
        run_id,
        rows_read,
        categories: categories
            .iter()
            .map(|c| CategorySummary {
                name: c.name.clone(),
                flagged: c.len(),
            })
            .collect(),
        sink_failures,
    })
}
