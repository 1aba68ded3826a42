// src/filters/state.rs
//! Call-level filters over the dialogue state machine.
//!
//! All three reduce the table to one representative row per call before annotating,
//! because end states and transition histories only mean something at a call's end.

use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;

use super::registry::{FilterRegistry, FilterSpec, OptionDoc};
use super::{parse_options, Filter, FilterOptions};
use crate::error::{ConfigError, FilterResult};
use crate::sequence::{has_loop, max_state_count, parse_transitions};
use crate::table::{RecordTable, CALL_UUID, STATE, STATE_TRANSITIONS};

pub const CALL_END_STATE: &str = "call_end_state";
pub const STATE_STUCK: &str = "state_stuck";
pub const STATE_LOOP: &str = "state_loop";

pub const DEFAULT_END_STATE: &str = "COF";
pub const DEFAULT_MAX_STATE_COUNT: usize = 4;

const END_STATE_OPTIONS: &[OptionDoc] = &[OptionDoc {
    name: "end_state",
    default: r#"["COF"]"#,
    help: "terminal states to flag",
}];

const STUCK_OPTIONS: &[OptionDoc] = &[OptionDoc {
    name: "max_state_count",
    default: "4",
    help: "flag when any state occurs at least this many times in the history",
}];

pub(super) fn register(reg: &mut FilterRegistry) {
    reg.register(
        FilterSpec::new(CALL_END_STATE, "Calls with a particular end state", |opts| {
            Ok(Box::new(EndStateFilter::from_options(opts)?))
        })
        .with_options(END_STATE_OPTIONS),
    );
    reg.register(
        FilterSpec::new(STATE_STUCK, "Calls stuck on a state", |opts| {
            Ok(Box::new(StateStuckFilter::from_options(opts)?))
        })
        .with_options(STUCK_OPTIONS),
    );
    reg.register(FilterSpec::new(
        STATE_LOOP,
        "Calls that loop back to an earlier state",
        |_| Ok(Box::new(StateLoopFilter)),
    ));
}

// --- end state ---

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndStateOptions {
    pub end_state: BTreeSet<String>,
}

impl Default for EndStateOptions {
    fn default() -> Self {
        Self {
            end_state: BTreeSet::from([DEFAULT_END_STATE.to_string()]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EndStateFilter {
    opts: EndStateOptions,
}

impl EndStateFilter {
    pub fn new<I, S>(end_states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            opts: EndStateOptions {
                end_state: end_states.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn from_options(options: &FilterOptions) -> Result<Self, ConfigError> {
        let opts = parse_options(CALL_END_STATE, options, END_STATE_OPTIONS)?;
        Ok(Self { opts })
    }
}

impl Filter for EndStateFilter {
    fn name(&self) -> &'static str {
        CALL_END_STATE
    }

    fn process(&self, table: RecordTable) -> FilterResult<RecordTable> {
        table.require(CALL_END_STATE, &[CALL_UUID, STATE])?;
        let keep = table.terminal_state_rows();
        let mut reduced = table.retain_indices(&keep);
        reduced.annotate(CALL_END_STATE, |turn| {
            self.opts
                .end_state
                .contains(&turn.state)
                .then(|| json!({ "end_state": turn.state }))
        });
        Ok(reduced)
    }
}

// --- stuck ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StateStuckOptions {
    pub max_state_count: usize,
}

impl Default for StateStuckOptions {
    fn default() -> Self {
        Self {
            max_state_count: DEFAULT_MAX_STATE_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StateStuckFilter {
    opts: StateStuckOptions,
}

impl StateStuckFilter {
    pub fn new(max_state_count: usize) -> Self {
        Self {
            opts: StateStuckOptions { max_state_count },
        }
    }

    pub fn from_options(options: &FilterOptions) -> Result<Self, ConfigError> {
        let opts: StateStuckOptions = parse_options(STATE_STUCK, options, STUCK_OPTIONS)?;
        if opts.max_state_count == 0 {
            return Err(ConfigError::InvalidOptions {
                filter: STATE_STUCK.to_string(),
                reason: "max_state_count must be at least 1".to_string(),
            });
        }
        Ok(Self { opts })
    }
}

impl Filter for StateStuckFilter {
    fn name(&self) -> &'static str {
        STATE_STUCK
    }

    fn process(&self, table: RecordTable) -> FilterResult<RecordTable> {
        table.require(STATE_STUCK, &[CALL_UUID, STATE_TRANSITIONS])?;
        let keep = table.last_row_per_call();
        let mut reduced = table.retain_indices(&keep);
        let limit = self.opts.max_state_count;
        reduced.annotate(STATE_STUCK, |turn| {
            let states = parse_transitions(&turn.state_transitions);
            (max_state_count(&states) >= limit).then(|| json!({ "state_stuck": limit }))
        });
        Ok(reduced)
    }
}

// --- loop ---

#[derive(Debug, Clone, Copy, Default)]
pub struct StateLoopFilter;

impl Filter for StateLoopFilter {
    fn name(&self) -> &'static str {
        STATE_LOOP
    }

    fn process(&self, table: RecordTable) -> FilterResult<RecordTable> {
        table.require(STATE_LOOP, &[CALL_UUID, STATE_TRANSITIONS])?;
        let keep = table.last_row_per_call();
        let mut reduced = table.retain_indices(&keep);
        reduced.annotate(STATE_LOOP, |turn| {
            let states = parse_transitions(&turn.state_transitions);
            has_loop(&states).then(|| json!({ "state_loop": true }))
        });
        Ok(reduced)
    }
}
