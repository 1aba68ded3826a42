// src/config.rs
//! Run configuration (TOML): data source, ordered filters with their kwargs, and
//! ordered export sinks.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::category::DEFAULT_DISPLAY_LIMIT;
use crate::error::ConfigError;
use crate::filters::FilterOptions;

pub const DEFAULT_CONFIG_PATH: &str = "config/sentinel.toml";
pub const ENV_CONFIG_PATH: &str = "SENTINEL_CONFIG_PATH";

fn default_limit() -> usize {
    DEFAULT_DISPLAY_LIMIT
}

fn default_bucket() -> String {
    "sentinel".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Local path or http(s) URL of the records CSV.
    #[serde(default)]
    pub data_url: String,
    #[serde(default)]
    pub language_code: Option<String>,
    /// Declaration order is execution order.
    #[serde(default)]
    pub filters: Vec<FilterEntry>,
    #[serde(default)]
    pub export: Vec<SinkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterEntry {
    pub name: String,
    /// Max calls a notification sink shows for this category.
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub kwargs: FilterOptions,
}

impl FilterEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: DEFAULT_DISPLAY_LIMIT,
            kwargs: FilterOptions::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "sink", rename_all = "lowercase")]
pub enum SinkConfig {
    Csv(CsvSinkConfig),
    Slack(SlackSinkConfig),
    Tog(TogSinkConfig),
}

impl SinkConfig {
    pub fn name(&self) -> &'static str {
        match self {
            SinkConfig::Csv(_) => "csv",
            SinkConfig::Slack(_) => "slack",
            SinkConfig::Tog(_) => "tog",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CsvSinkConfig {
    /// Write `<category>.csv` files here; buffers only when unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlackSinkConfig {
    pub channel_name: String,
    /// Object-store bucket for the per-category CSV uploads.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Local fallback store when no `SENTINEL_STORE_URL` is set.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TogSinkConfig {
    pub job_id: String,
    /// Falls back to `SENTINEL_TOG_URL`.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: RunConfig = toml::from_str(s).context("parsing run config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Explicit path, then `$SENTINEL_CONFIG_PATH`, then `config/sentinel.toml`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from_file(p);
        }
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        Self::load_from_file(DEFAULT_CONFIG_PATH)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for f in &self.filters {
            if !seen.insert(f.name.as_str()) {
                return Err(ConfigError::DuplicateFilter(f.name.clone()));
            }
        }
        Ok(())
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn filter(&self, name: &str) -> Option<&FilterEntry> {
        self.filters.iter().find(|f| f.name == name)
    }

    pub fn limit_for(&self, name: &str) -> usize {
        self.filter(name).map_or(DEFAULT_DISPLAY_LIMIT, |f| f.limit)
    }

    /// `(name, kwargs)` pairs in declaration order, as the chain builder wants them.
    pub fn filter_specs(&self) -> impl Iterator<Item = (&str, &FilterOptions)> {
        self.filters.iter().map(|f| (f.name.as_str(), &f.kwargs))
    }
}
