// src/export/mod.rs
//! Reporting sinks for flagged categories.
//!
//! Sinks run after the chain and never touch annotations. A failing sink is reported
//! on its own; other sinks (and other categories within a sink) still run.

pub mod csv;
pub mod slack;
pub mod store;
pub mod tog;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::category::CategoryResult;
use crate::config::{RunConfig, SinkConfig};
use crate::error::ExportError;
use crate::table::{
    RecordTable, Turn, ALTERNATIVES, CALL_UUID, CONVERSATION_UUID, PREDICTION, STATE,
    STATE_TRANSITIONS,
};

pub use self::csv::CsvExporter;
pub use self::slack::SlackExporter;
pub use self::store::{FsObjectStore, HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use self::tog::TogExporter;

/// `(name, description)` of every sink kind, for `list exporters`.
pub const EXPORTERS: &[(&str, &str)] = &[
    ("csv", "CSV files (or in-memory buffers) per category"),
    ("slack", "Slack thread with call links and uploaded CSVs"),
    ("tog", "Tog annotation job tasks"),
];

/// Everything a sink needs about one finished run.
#[derive(Debug, Clone)]
pub struct ExportContext<'a> {
    pub run_id: Uuid,
    pub config: &'a RunConfig,
    pub categories: &'a [CategoryResult],
    /// Registry description per category name.
    pub descriptions: BTreeMap<String, String>,
}

impl<'a> ExportContext<'a> {
    pub fn new(
        run_id: Uuid,
        config: &'a RunConfig,
        categories: &'a [CategoryResult],
        descriptions: BTreeMap<String, String>,
    ) -> Self {
        Self {
            run_id,
            config,
            categories,
            descriptions,
        }
    }

    /// Registry description, falling back to the category name itself.
    pub fn description<'b>(&'b self, category: &'b str) -> &'b str {
        self.descriptions
            .get(category)
            .map(String::as_str)
            .unwrap_or(category)
    }

    pub fn limit(&self, category: &str) -> usize {
        self.config.limit_for(category)
    }

    /// Kwargs of `category` rendered inline, e.g. `{confidence_threshold = 90}`.
    pub fn kwargs_display(&self, category: &str) -> String {
        match self.config.filter(category) {
            Some(f) if !f.kwargs.is_empty() => toml::Value::Table(f.kwargs.clone()).to_string(),
            _ => "{}".to_string(),
        }
    }

    /// Categories that flagged at least one row, in chain order.
    pub fn triggered(&self) -> impl Iterator<Item = &CategoryResult> {
        self.categories.iter().filter(|c| !c.is_empty())
    }
}

#[async_trait]
pub trait Exporter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn export(&self, ctx: &ExportContext<'_>) -> Result<(), ExportError>;
}

/// One exporter per configured sink, in declaration order.
pub fn build_exporters(config: &RunConfig) -> Vec<Box<dyn Exporter>> {
    config
        .export
        .iter()
        .map(|sink| -> Box<dyn Exporter> {
            match sink {
                SinkConfig::Csv(c) => Box::new(CsvExporter::new(c.output_dir.clone())),
                SinkConfig::Slack(c) => Box::new(SlackExporter::from_config(c)),
                SinkConfig::Tog(c) => Box::new(TogExporter::from_config(c)),
            }
        })
        .collect()
}

/// Output columns: the source schema, then annotation columns not already present.
pub fn output_columns(table: &RecordTable) -> Vec<String> {
    let mut cols: Vec<String> = table.columns().to_vec();
    for a in table.annotation_columns() {
        if !cols.contains(a) {
            cols.push(a.clone());
        }
    }
    cols
}

/// JSON-string encoding of the structured columns (the inverse of the reader).
pub fn encode_alternatives(turn: &Turn) -> Result<String, ExportError> {
    Ok(serde_json::to_string(&turn.alternatives)?)
}

pub fn encode_prediction(turn: &Turn) -> Result<String, ExportError> {
    if turn.prediction.is_empty() {
        return Ok(String::new());
    }
    Ok(serde_json::to_string(&turn.prediction)?)
}

/// Cell text for `column`, with structured values re-encoded as JSON strings.
pub fn cell(turn: &Turn, column: &str) -> Result<String, ExportError> {
    Ok(match column {
        CALL_UUID => turn.call_uuid.clone(),
        CONVERSATION_UUID => turn.conversation_uuid.clone(),
        STATE => turn.state.clone(),
        STATE_TRANSITIONS => turn.state_transitions.clone(),
        ALTERNATIVES => encode_alternatives(turn)?,
        PREDICTION => encode_prediction(turn)?,
        other => match turn.annotation(other) {
            Some(v) => serde_json::to_string(v)?,
            None => turn.extra.get(other).cloned().unwrap_or_default(),
        },
    })
}

/// A row as a JSON object with string-encoded structured columns.
pub fn row_object(turn: &Turn, columns: &[String]) -> Result<Map<String, Value>, ExportError> {
    let mut obj = Map::new();
    for c in columns {
        obj.insert(c.clone(), Value::String(cell(turn, c)?));
    }
    Ok(obj)
}
