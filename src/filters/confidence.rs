// src/filters/confidence.rs
//! Flags turns whose best ASR hypothesis is below a confidence threshold.

use serde::Deserialize;
use serde_json::json;

use super::registry::{FilterRegistry, FilterSpec, OptionDoc};
use super::{parse_options, Filter, FilterOptions};
use crate::error::{ConfigError, FilterResult};
use crate::table::{top_alternative, Alternative, RecordTable, ALTERNATIVES};

pub const LOW_ASR_CONFIDENCE: &str = "low_asr_confidence";

/// Same 0–100 scale as `Alternative::confidence`.
pub const DEFAULT_ASR_THRESHOLD: f64 = 95.0;

const OPTIONS: &[OptionDoc] = &[OptionDoc {
    name: "confidence_threshold",
    default: "95",
    help: "flag when the top alternative's confidence is strictly below this (0-100)",
}];

pub(super) fn register(reg: &mut FilterRegistry) {
    reg.register(
        FilterSpec::new(LOW_ASR_CONFIDENCE, "Low ASR confidence turns", |opts| {
            Ok(Box::new(AsrConfidenceFilter::from_options(opts)?))
        })
        .with_options(OPTIONS),
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AsrConfidenceOptions {
    pub confidence_threshold: f64,
}

impl Default for AsrConfidenceOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_ASR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AsrConfidenceFilter {
    opts: AsrConfidenceOptions,
}

impl AsrConfidenceFilter {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            opts: AsrConfidenceOptions {
                confidence_threshold,
            },
        }
    }

    pub fn from_options(options: &FilterOptions) -> Result<Self, ConfigError> {
        let opts = parse_options(LOW_ASR_CONFIDENCE, options, OPTIONS)?;
        Ok(Self { opts })
    }

    pub fn threshold(&self) -> f64 {
        self.opts.confidence_threshold
    }

    fn low_confidence(&self, alternatives: &[Vec<Alternative>]) -> Option<f64> {
        let top = top_alternative(alternatives)?;
        (top.confidence < self.opts.confidence_threshold).then_some(top.confidence)
    }
}

impl Filter for AsrConfidenceFilter {
    fn name(&self) -> &'static str {
        LOW_ASR_CONFIDENCE
    }

    fn process(&self, mut table: RecordTable) -> FilterResult<RecordTable> {
        table.require(LOW_ASR_CONFIDENCE, &[ALTERNATIVES])?;
        table.annotate(LOW_ASR_CONFIDENCE, |turn| {
            self.low_confidence(&turn.alternatives)
                .map(|score| json!({ "score": score }))
        });
        Ok(table)
    }
}
