// src/filters/mod.rs
//! Anomaly filters. Each filter adds exactly one annotation column, named after the
//! filter, to the table it is given.

pub mod alternatives;
pub mod confidence;
pub mod prediction;
pub mod registry;
pub mod state;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{ConfigError, FilterError, FilterResult};
use crate::table::RecordTable;

pub use alternatives::{NoAlternativesFilter, WordMatchFilter};
pub use confidence::AsrConfidenceFilter;
pub use prediction::PredictionConfidenceFilter;
pub use registry::{global_registry, FilterRegistry, FilterSpec, OptionDoc};
pub use state::{EndStateFilter, StateLoopFilter, StateStuckFilter};

/// Opaque per-filter keyword configuration, as written under `[filters.kwargs]`.
pub type FilterOptions = toml::Table;

/// A unit of anomaly detection over a record table.
pub trait Filter: Send + Sync {
    /// Registered name; also the annotation column this filter writes.
    fn name(&self) -> &'static str;

    /// Annotate `table` and hand it back. Row-reducing filters return fewer rows.
    fn process(&self, table: RecordTable) -> FilterResult<RecordTable>;

    /// Reserved extension point; no filter implements it yet.
    fn preprocess(&self, _table: &RecordTable) -> FilterResult<()> {
        Err(FilterError::NotImplemented {
            filter: self.name(),
            operation: "preprocess",
        })
    }
}

/// Deserialize the recognised subset of `options` into `T`.
/// Unknown keys are reported and dropped; type mismatches are configuration errors.
pub(crate) fn parse_options<T: DeserializeOwned>(
    filter: &str,
    options: &FilterOptions,
    known: &[OptionDoc],
) -> Result<T, ConfigError> {
    let mut recognised = toml::Table::new();
    for (key, value) in options {
        if known.iter().any(|o| o.name == key.as_str()) {
            recognised.insert(key.clone(), value.clone());
        } else {
            warn!(filter, option = %key, "ignoring unknown filter option");
        }
    }
    toml::Value::Table(recognised)
        .try_into::<T>()
        .map_err(|e| ConfigError::InvalidOptions {
            filter: filter.to_string(),
            reason: e.to_string(),
        })
}
