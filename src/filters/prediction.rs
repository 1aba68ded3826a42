// src/filters/prediction.rs
//! Flags turns with SLU prediction confidence below a threshold.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::registry::{FilterRegistry, FilterSpec, OptionDoc};
use super::{parse_options, Filter, FilterOptions};
use crate::error::{ConfigError, FilterResult};
use crate::table::{RecordTable, PREDICTION};

pub const PREDICTION_LOW_CONFIDENCE: &str = "prediction_low_confidence";

/// Prediction scores are on a 0–1 scale.
pub const DEFAULT_PREDICTION_THRESHOLD: f64 = 0.95;

const OPTIONS: &[OptionDoc] = &[OptionDoc {
    name: "confidence_threshold",
    default: "0.95",
    help: "flag when prediction.score is strictly below this (0-1)",
}];

pub(super) fn register(reg: &mut FilterRegistry) {
    reg.register(
        FilterSpec::new(
            PREDICTION_LOW_CONFIDENCE,
            "Low prediction confidence turns",
            |opts| Ok(Box::new(PredictionConfidenceFilter::from_options(opts)?)),
        )
        .with_options(OPTIONS),
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PredictionConfidenceOptions {
    pub confidence_threshold: f64,
}

impl Default for PredictionConfidenceOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_PREDICTION_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionConfidenceFilter {
    opts: PredictionConfidenceOptions,
}

impl PredictionConfidenceFilter {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            opts: PredictionConfidenceOptions {
                confidence_threshold,
            },
        }
    }

    pub fn from_options(options: &FilterOptions) -> Result<Self, ConfigError> {
        let opts = parse_options(PREDICTION_LOW_CONFIDENCE, options, OPTIONS)?;
        Ok(Self { opts })
    }
}

impl Filter for PredictionConfidenceFilter {
    fn name(&self) -> &'static str {
        PREDICTION_LOW_CONFIDENCE
    }

    fn process(&self, mut table: RecordTable) -> FilterResult<RecordTable> {
        table.require(PREDICTION_LOW_CONFIDENCE, &[PREDICTION])?;
        let threshold = self.opts.confidence_threshold;
        table.annotate(PREDICTION_LOW_CONFIDENCE, |turn| {
            let raw = turn.prediction.raw_score()?;
            let Some(score) = turn.prediction.score() else {
                debug!(call_uuid = %turn.call_uuid, score = %raw, "non-numeric prediction score");
                return None;
            };
            (score < threshold).then(|| json!({ "score": raw }))
        });
        Ok(table)
    }
}
