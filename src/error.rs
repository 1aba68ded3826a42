// src/error.rs
//! Typed errors for the filter core. Application glue wraps these in `anyhow`.

use thiserror::Error;

/// A table is missing a column some filter needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("filter `{filter}` requires column `{column}`, which the table does not have")]
    MissingColumn {
        filter: &'static str,
        column: &'static str,
    },
}

/// Problems assembling filters from configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("filter `{0}` does not exist in the registry")]
    UnknownFilter(String),
    #[error("invalid options for filter `{filter}`: {reason}")]
    InvalidOptions { filter: String, reason: String },
    #[error("filter `{0}` is configured more than once")]
    DuplicateFilter(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("`{operation}` is not implemented for filter `{filter}`")]
    NotImplemented {
        filter: &'static str,
        operation: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("filter #{index} (`{filter}`) failed: {source}")]
    Filter {
        index: usize,
        filter: String,
        #[source]
        source: FilterError,
    },
}

/// Failures inside a reporting sink. Never rolls back annotations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv serialization failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} rejected the request: {reason}")]
    Rejected { service: &'static str, reason: String },
    #[error("missing setting `{0}`")]
    MissingSetting(&'static str),
}

pub type FilterResult<T> = Result<T, FilterError>;
