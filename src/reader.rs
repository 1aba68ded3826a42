// src/reader.rs
//! CSV input. Structured columns arrive as JSON strings and are decoded here, so the
//! filter core never sees string-encoded `alternatives` or `prediction` values.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::table::{
    Alternative, Prediction, RecordTable, Turn, ALTERNATIVES, CALL_UUID, CONVERSATION_UUID,
    PREDICTION, STATE, STATE_TRANSITIONS,
};

/// Reads call/turn records from CSV.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReader;

impl CsvReader {
    /// Local path or `http(s)://` URL.
    pub async fn read_source(&self, source: &str) -> Result<RecordTable> {
        if source.starts_with("http://") || source.starts_with("https://") {
            let bytes = reqwest::get(source)
                .await
                .with_context(|| format!("fetching {source}"))?
                .error_for_status()
                .with_context(|| format!("fetching {source}"))?
                .bytes()
                .await
                .context("reading response body")?;
            self.read_bytes(&bytes)
        } else {
            self.read_path(Path::new(source))
        }
    }

    pub fn read_path(&self, path: &Path) -> Result<RecordTable> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let table = self
            .read_bytes(&bytes)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), rows = table.len(), "records loaded");
        Ok(table)
    }

    pub fn read_bytes(&self, bytes: &[u8]) -> Result<RecordTable> {
        self.read_from(bytes)
    }

    pub fn read_from<R: Read>(&self, input: R) -> Result<RecordTable> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
        let headers: Vec<String> = rdr
            .headers()
            .context("reading csv header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("reading csv record {}", line + 1))?;
            let mut turn = Turn::default();
            let mut extra = BTreeMap::new();
            for (column, cell) in headers.iter().zip(record.iter()) {
                match column.as_str() {
                    CALL_UUID => turn.call_uuid = cell.to_string(),
                    CONVERSATION_UUID => turn.conversation_uuid = cell.to_string(),
                    STATE => turn.state = cell.to_string(),
                    STATE_TRANSITIONS => turn.state_transitions = cell.to_string(),
                    ALTERNATIVES => turn.alternatives = decode_alternatives(cell),
                    PREDICTION => turn.prediction = decode_prediction(cell),
                    _ => {
                        extra.insert(column.clone(), cell.to_string());
                    }
                }
            }
            turn.extra = extra;
            rows.push(turn);
        }

        Ok(RecordTable::new(headers, rows))
    }
}

/// Cells a spreadsheet export writes for "no value".
fn is_blank(cell: &str) -> bool {
    let t = cell.trim();
    t.is_empty() || t.eq_ignore_ascii_case("nan") || t.eq_ignore_ascii_case("null")
}

/// Decode an `alternatives` cell. Accepts a list of groups or a flat list of
/// alternatives (one group). Anything else decodes to no alternatives.
pub fn decode_alternatives(cell: &str) -> Vec<Vec<Alternative>> {
    if is_blank(cell) {
        return Vec::new();
    }
    if let Ok(groups) = serde_json::from_str::<Vec<Vec<Alternative>>>(cell) {
        return groups;
    }
    match serde_json::from_str::<Vec<Alternative>>(cell) {
        Ok(flat) if flat.is_empty() => Vec::new(),
        Ok(flat) => vec![flat],
        Err(e) => {
            warn!(error = %e, "undecodable alternatives, treating as empty");
            Vec::new()
        }
    }
}

/// Decode a `prediction` cell; non-object or invalid JSON yields an empty prediction.
pub fn decode_prediction(cell: &str) -> Prediction {
    if is_blank(cell) {
        return Prediction::default();
    }
    match serde_json::from_str::<Value>(cell) {
        Ok(Value::Object(map)) => Prediction::from(map),
        Ok(_) => Prediction::default(),
        Err(e) => {
            warn!(error = %e, "undecodable prediction, treating as empty");
            Prediction::default()
        }
    }
}
