// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod category;
pub mod chain;
pub mod config;
pub mod error;
pub mod filters;
pub mod reader;
pub mod sequence;
pub mod table;
pub mod telemetry;

// Reporting sinks and the end-to-end run
pub mod export;
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::category::{extract, CategoryResult};
pub use crate::chain::FilterChain;
pub use crate::config::RunConfig;
pub use crate::error::{ChainError, ConfigError, ExportError, FilterError, SchemaError};
pub use crate::filters::{Filter, FilterOptions, FilterRegistry};
pub use crate::pipeline::{run, RunReport};
pub use crate::table::{Alternative, Prediction, RecordTable, Turn};
