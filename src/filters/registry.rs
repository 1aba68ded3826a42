// src/filters/registry.rs
//! Name-keyed catalog of filter constructors.
//!
//! Built-in filters register themselves once through [`FilterRegistry::with_builtin`];
//! the process-wide instance behind [`global_registry`] is created lazily from it.

use once_cell::sync::Lazy;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use super::{alternatives, confidence, prediction, state, Filter, FilterOptions};
use crate::error::ConfigError;

pub type FilterBuilder = fn(&FilterOptions) -> Result<Box<dyn Filter>, ConfigError>;

/// Documentation for one recognised option, shown by `list filters --verbose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDoc {
    pub name: &'static str,
    pub default: &'static str,
    pub help: &'static str,
}

#[derive(Clone)]
pub struct FilterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub options: &'static [OptionDoc],
    build: FilterBuilder,
}

impl FilterSpec {
    pub fn new(name: &'static str, description: &'static str, build: FilterBuilder) -> Self {
        Self {
            name,
            description,
            options: &[],
            build,
        }
    }

    pub fn with_options(mut self, options: &'static [OptionDoc]) -> Self {
        self.options = options;
        self
    }

    pub fn build(&self, options: &FilterOptions) -> Result<Box<dyn Filter>, ConfigError> {
        (self.build)(options)
    }
}

impl std::fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("options", &self.options)
            .finish()
    }
}

/// Registration order is kept so listings are stable.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    entries: Vec<FilterSpec>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in filter.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        alternatives::register(&mut reg);
        confidence::register(&mut reg);
        prediction::register(&mut reg);
        state::register(&mut reg);
        reg
    }

    /// Add `spec`; an existing entry with the same name is replaced (with a warning).
    pub fn register(&mut self, spec: FilterSpec) {
        match self.entries.iter_mut().find(|e| e.name == spec.name) {
            Some(existing) => {
                warn!(filter = spec.name, "filter already registered, replacing it");
                *existing = spec;
            }
            None => self.entries.push(spec),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FilterSpec> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn description(&self, name: &str) -> Option<&'static str> {
        self.get(name).map(|e| e.description)
    }

    /// Instantiate `name` with `options`; unknown names and bad options are errors.
    pub fn try_create(
        &self,
        name: &str,
        options: &FilterOptions,
    ) -> Result<Box<dyn Filter>, ConfigError> {
        let spec = self
            .get(name)
            .ok_or_else(|| ConfigError::UnknownFilter(name.to_string()))?;
        spec.build(options)
    }

    /// Lenient lookup: reports the problem and returns `None` instead of failing.
    pub fn create(&self, name: &str, options: &FilterOptions) -> Option<Box<dyn Filter>> {
        match self.try_create(name, options) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(filter = name, error = %e, "could not create filter");
                None
            }
        }
    }

    /// `(name, description)` pairs in registration order.
    pub fn list(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries.iter().map(|e| (e.name, e.description))
    }

    pub fn specs(&self) -> &[FilterSpec] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GLOBAL: Lazy<RwLock<FilterRegistry>> =
    Lazy::new(|| RwLock::new(FilterRegistry::with_builtin()));

/// Process-wide registry, seeded with the built-in filters on first use.
pub fn global_registry() -> &'static RwLock<FilterRegistry> {
    &GLOBAL
}

/// Shared read access to the global registry.
pub fn read_global() -> RwLockReadGuard<'static, FilterRegistry> {
    global_registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive access to the global registry, for registering extra filters.
pub fn write_global() -> RwLockWriteGuard<'static, FilterRegistry> {
    global_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterResult;
    use crate::table::RecordTable;

    struct Passthrough;

    impl Filter for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }
        fn process(&self, table: RecordTable) -> FilterResult<RecordTable> {
            Ok(table)
        }
    }

    fn build_passthrough(_: &FilterOptions) -> Result<Box<dyn Filter>, ConfigError> {
        Ok(Box::new(Passthrough))
    }

    #[test]
    fn builtin_names_are_registered_in_order() {
        let reg = FilterRegistry::with_builtin();
        let names: Vec<_> = reg.list().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "no_alternatives",
                "word_match",
                "low_asr_confidence",
                "prediction_low_confidence",
                "call_end_state",
                "state_stuck",
                "state_loop",
            ]
        );
    }

    #[test]
    fn reregistering_replaces_entry() {
        let mut reg = FilterRegistry::new();
        reg.register(FilterSpec::new("passthrough", "first", build_passthrough));
        reg.register(FilterSpec::new("passthrough", "second", build_passthrough));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.description("passthrough"), Some("second"));
    }

    #[test]
    fn unknown_name_is_absent_not_a_panic() {
        let reg = FilterRegistry::with_builtin();
        assert!(reg.create("nope", &FilterOptions::new()).is_none());
        assert_eq!(
            reg.try_create("nope", &FilterOptions::new()).err(),
            Some(ConfigError::UnknownFilter("nope".into()))
        );
    }

    #[test]
    fn created_filter_reports_its_name() {
        let reg = FilterRegistry::with_builtin();
        let f = reg.create("state_loop", &FilterOptions::new()).unwrap();
        assert_eq!(f.name(), "state_loop");
    }

    #[test]
    fn global_registry_is_one_seeded_instance() {
        assert!(std::ptr::eq(global_registry(), global_registry()));
        assert!(read_global().contains("call_end_state"));
    }
}
