// src/chain.rs
//! Ordered filter pipeline.
//!
//! Filters run strictly in declaration order; each receives the previous filter's
//! output. The first failure aborts the rest of the chain.

use metrics::counter;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::{ChainError, ConfigError};
use crate::filters::{Filter, FilterOptions, FilterRegistry};
use crate::table::RecordTable;
use crate::telemetry::ensure_metrics_described;

#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter at the end of the chain.
    pub fn with(mut self, filter: Box<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Build from `(name, options)` pairs, resolving every name through `registry`.
    /// Unknown names and repeated names are fatal here.
    pub fn from_config<'a, I>(registry: &FilterRegistry, entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a FilterOptions)>,
    {
        let mut seen = HashSet::new();
        let mut chain = Self::new();
        for (name, options) in entries {
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateFilter(name.to_string()));
            }
            chain.push(registry.try_create(name, options)?);
        }
        Ok(chain)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter in order and return the final table.
    pub fn handle(&self, table: RecordTable) -> Result<RecordTable, ChainError> {
        self.run(table, |_, _| {})
    }

    /// Like [`handle`](Self::handle), but also keeps each filter's own output so every
    /// category can be extracted even after a later filter collapsed rows.
    pub fn handle_each(
        &self,
        table: RecordTable,
    ) -> Result<Vec<(&'static str, RecordTable)>, ChainError> {
        let mut snapshots = Vec::with_capacity(self.filters.len());
        self.run(table, |name, out| snapshots.push((name, out.clone())))?;
        Ok(snapshots)
    }

    fn run<F>(&self, table: RecordTable, mut on_output: F) -> Result<RecordTable, ChainError>
    where
        F: FnMut(&'static str, &RecordTable),
    {
        ensure_metrics_described();

        let mut current = table;
        for (index, filter) in self.filters.iter().enumerate() {
            let name = filter.name();
            let rows_in = current.len();
            current = filter.process(current).map_err(|source| ChainError::Filter {
                index,
                filter: name.to_string(),
                source,
            })?;

            let flagged = current.rows().iter().filter(|r| r.is_flagged(name)).count();
            counter!("sentinel_rows_processed_total", "filter" => name).increment(rows_in as u64);
            counter!("sentinel_rows_flagged_total", "filter" => name).increment(flagged as u64);
            info!(filter = name, rows_in, rows_out = current.len(), flagged, "filter done");

            on_output(name, &current);
        }
        debug!(filters = self.filters.len(), "chain finished");
        Ok(current)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FilterError, FilterResult, SchemaError};
    use crate::filters::{NoAlternativesFilter, StateLoopFilter};
    use crate::table::Turn;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Records the order in which it ran.
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Filter for Probe {
        fn name(&self) -> &'static str {
            self.name
        }
        fn process(&self, mut table: RecordTable) -> FilterResult<RecordTable> {
            self.log.lock().unwrap().push(self.name);
            table.annotate(self.name, |_| Some(json!(true)));
            Ok(table)
        }
    }

    struct Broken;

    impl Filter for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn process(&self, _table: RecordTable) -> FilterResult<RecordTable> {
            Err(SchemaError::MissingColumn {
                filter: "broken",
                column: "state",
            }
            .into())
        }
    }

    fn table() -> RecordTable {
        RecordTable::from_rows(vec![Turn::new("c1"), Turn::new("c2")])
    }

    #[test]
    fn empty_chain_is_identity() {
        let t = table();
        assert_eq!(FilterChain::new().handle(t.clone()).unwrap(), t);
    }

    #[test]
    fn runs_in_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new()
            .with(Box::new(Probe { name: "b", log: log.clone() }))
            .with(Box::new(Probe { name: "a", log: log.clone() }))
            .with(Box::new(Probe { name: "c", log: log.clone() }));
        let out = chain.handle(table()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["b", "a", "c"]);
        assert_eq!(out.annotation_columns(), &["b", "a", "c"]);
    }

    #[test]
    fn failure_aborts_remaining_filters() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new()
            .with(Box::new(Broken))
            .with(Box::new(Probe { name: "after", log: log.clone() }));
        let err = chain.handle(table()).unwrap_err();
        assert!(log.lock().unwrap().is_empty());
        match err {
            ChainError::Filter { index, filter, source } => {
                assert_eq!(index, 0);
                assert_eq!(filter, "broken");
                assert!(matches!(source, FilterError::Schema(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn snapshots_survive_row_reduction() {
        let chain = FilterChain::new()
            .with(Box::new(NoAlternativesFilter))
            .with(Box::new(StateLoopFilter));
        let rows = vec![Turn::new("c1"), Turn::new("c1"), Turn::new("c2")];
        let snaps = chain.handle_each(RecordTable::from_rows(rows)).unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].0, "no_alternatives");
        assert_eq!(snaps[0].1.len(), 3);
        assert_eq!(snaps[1].1.len(), 2);
        // Earlier annotations are carried into the reduced table.
        assert!(snaps[1].1.has_column("no_alternatives"));
    }

    #[test]
    fn from_config_rejects_unknown_and_duplicate_names() {
        let reg = FilterRegistry::with_builtin();
        let opts = FilterOptions::new();
        let err = FilterChain::from_config(&reg, [("missing", &opts)]).unwrap_err();
        assert_eq!(err, ConfigError::UnknownFilter("missing".into()));

        let err = FilterChain::from_config(&reg, [("state_loop", &opts), ("state_loop", &opts)])
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateFilter("state_loop".into()));

        let chain =
            FilterChain::from_config(&reg, [("state_loop", &opts), ("no_alternatives", &opts)])
                .unwrap();
        assert_eq!(chain.names(), vec!["state_loop", "no_alternatives"]);
    }
}
