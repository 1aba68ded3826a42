// src/category.rs
//! Category extraction: the rows a given filter flagged.

use std::collections::HashSet;

use crate::table::{RecordTable, Turn};

/// Per-category display limit used by notification sinks.
pub const DEFAULT_DISPLAY_LIMIT: usize = 50;

/// Rows whose `category` annotation is present and truthy, in table order.
/// Empty when the filter never flagged anything (or never ran).
pub fn extract(table: &RecordTable, category: &str) -> RecordTable {
    table.filtered(|turn| turn.is_flagged(category))
}

/// Flagged rows of one category, ready for a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryResult {
    pub name: String,
    pub rows: RecordTable,
}

impl CategoryResult {
    pub fn from_table(table: &RecordTable, name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: extract(table, name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// At most `limit` rows, one per conversation and one per call (first occurrence wins).
    pub fn display_rows(&self, limit: usize) -> Vec<&Turn> {
        let mut conversations = HashSet::new();
        let mut calls = HashSet::new();
        self.rows
            .rows()
            .iter()
            .filter(|t| conversations.insert(t.conversation_uuid.as_str()))
            .filter(|t| calls.insert(t.call_uuid.as_str()))
            .take(limit)
            .collect()
    }
}

/// Extract every category from its own table snapshot, keeping chain order.
pub fn extract_all(snapshots: &[(&str, RecordTable)]) -> Vec<CategoryResult> {
    snapshots
        .iter()
        .map(|(name, table)| CategoryResult::from_table(table, name))
        .collect()
}
