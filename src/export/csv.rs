// src/export/csv.rs
//! CSV sink: one CSV text per category, optionally written to `<dir>/<category>.csv`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use super::{cell, output_columns, ExportContext, Exporter};
use crate::category::{extract, CategoryResult};
use crate::error::ExportError;
use crate::table::RecordTable;

/// Serialize `table` as CSV text, structured columns JSON-encoded.
pub fn encode_table(table: &RecordTable) -> Result<String, ExportError> {
    let columns = output_columns(table);
    let mut wtr = ::csv::Writer::from_writer(Vec::new());
    wtr.write_record(&columns)?;
    for turn in table.rows() {
        let record = columns
            .iter()
            .map(|c| cell(turn, c))
            .collect::<Result<Vec<_>, _>>()?;
        wtr.write_record(&record)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// CSV text per category name, extracted from one annotated table.
pub fn export_categories(
    table: &RecordTable,
    categories: &[&str],
) -> Result<BTreeMap<String, String>, ExportError> {
    categories
        .iter()
        .map(|name| -> Result<(String, String), ExportError> {
            Ok((name.to_string(), encode_table(&extract(table, name))?))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct CsvExporter {
    output_dir: Option<PathBuf>,
}

impl CsvExporter {
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self { output_dir }
    }

    /// CSV text per category result.
    pub fn buffers(
        &self,
        categories: &[CategoryResult],
    ) -> Result<BTreeMap<String, String>, ExportError> {
        categories
            .iter()
            .map(|c| -> Result<(String, String), ExportError> {
                Ok((c.name.clone(), encode_table(&c.rows)?))
            })
            .collect()
    }
}

#[async_trait]
impl Exporter for CsvExporter {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn export(&self, ctx: &ExportContext<'_>) -> Result<(), ExportError> {
        let buffers = self.buffers(ctx.categories)?;
        let Some(dir) = &self.output_dir else {
            info!(categories = buffers.len(), "csv buffers built (no output_dir)");
            return Ok(());
        };
        tokio::fs::create_dir_all(dir).await?;
        for (name, body) in &buffers {
            let path = dir.join(format!("{name}.csv"));
            tokio::fs::write(&path, body).await?;
            info!(category = %name, path = %path.display(), "csv written");
        }
        Ok(())
    }
}
