// src/sequence.rs
//! State-transition history helpers shared by the state filters.
//!
//! A history looks like `"START -> MENU -> MENU -> END"`. Parsing never fails: blank or
//! delimiter-only input yields an empty sequence, so count-based checks simply stay quiet.

use std::collections::HashMap;

pub const TRANSITION_DELIMITER: &str = "->";

/// Split a transition history into trimmed state names, skipping empty segments.
pub fn parse_transitions(raw: &str) -> Vec<&str> {
    raw.trim()
        .split(TRANSITION_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Run-length reduction: `A A B B A` → `A B A`.
pub fn collapse_runs<'a>(states: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::with_capacity(states.len());
    for s in states {
        if out.last() != Some(s) {
            out.push(*s);
        }
    }
    out
}

/// Occurrences of each distinct state, keyed by name.
pub fn state_counts<'a>(states: &[&'a str]) -> HashMap<&'a str, usize> {
    let mut counts = HashMap::new();
    for s in states {
        *counts.entry(*s).or_insert(0) += 1;
    }
    counts
}

/// Highest occurrence count of any single state (0 for an empty history).
pub fn max_state_count(states: &[&str]) -> usize {
    state_counts(states).into_values().max().unwrap_or(0)
}

/// True when the call left some state and later came back to it.
/// Staying on one state for several turns is not a loop.
pub fn has_loop(states: &[&str]) -> bool {
    max_state_count(&collapse_runs(states)) >= 2
}
