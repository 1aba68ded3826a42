// src/table.rs
//! In-memory record table: one `Turn` per row, grouped into calls by `call_uuid`.
//!
//! Structured columns (`alternatives`, `prediction`) are always held decoded; string
//! encoding is a reader/exporter concern. Annotation columns are appended by filters
//! and are never dropped by later filters.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::SchemaError;

pub const CALL_UUID: &str = "call_uuid";
pub const CONVERSATION_UUID: &str = "conversation_uuid";
pub const STATE: &str = "state";
pub const STATE_TRANSITIONS: &str = "state_transitions";
pub const ALTERNATIVES: &str = "alternatives";
pub const PREDICTION: &str = "prediction";

/// Columns every `Turn` has a typed field for, in canonical order.
pub const CORE_COLUMNS: [&str; 6] = [
    CALL_UUID,
    CONVERSATION_UUID,
    STATE,
    STATE_TRANSITIONS,
    ALTERNATIVES,
    PREDICTION,
];

/// One ASR hypothesis. Unknown keys are kept so export writes them back.
///
/// `confidence` and `transcript` decode leniently: a `null` or mistyped field degrades
/// that one entry (to `0.0` / `""`) instead of failing the whole alternatives cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transcript: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Alternative {
    pub fn new(confidence: f64, transcript: impl Into<String>) -> Self {
        Self {
            confidence,
            transcript: transcript.into(),
            extra: Map::new(),
        }
    }
}

/// Numbers and numeric strings; anything else is `0.0`.
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Highest-confidence entry of the first alternatives group.
/// Ties resolve to the earliest entry (stable descending sort).
pub fn top_alternative(alternatives: &[Vec<Alternative>]) -> Option<&Alternative> {
    let group = alternatives.first()?;
    group.iter().fold(None, |best: Option<&Alternative>, alt| match best {
        Some(b) if b.confidence >= alt.confidence => Some(b),
        _ => Some(alt),
    })
}

/// SLU prediction payload. An empty map means "no prediction".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction(pub Map<String, Value>);

impl Prediction {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `score` as a float; numeric strings are accepted, anything else is `None`.
    pub fn score(&self) -> Option<f64> {
        match self.0.get("score")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn raw_score(&self) -> Option<&Value> {
        self.0.get("score").filter(|v| !v.is_null())
    }
}

impl From<Map<String, Value>> for Prediction {
    fn from(m: Map<String, Value>) -> Self {
        Self(m)
    }
}

/// One conversation turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turn {
    pub call_uuid: String,
    pub conversation_uuid: String,
    pub state: String,
    pub state_transitions: String,
    pub alternatives: Vec<Vec<Alternative>>,
    pub prediction: Prediction,
    /// Pass-through columns the core does not interpret.
    pub extra: BTreeMap<String, String>,
    annotations: BTreeMap<String, Value>,
}

impl Turn {
    pub fn new(call_uuid: impl Into<String>) -> Self {
        Self {
            call_uuid: call_uuid.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation_uuid: impl Into<String>) -> Self {
        self.conversation_uuid = conversation_uuid.into();
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn with_transitions(mut self, transitions: impl Into<String>) -> Self {
        self.state_transitions = transitions.into();
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<Vec<Alternative>>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn with_prediction(mut self, prediction: Prediction) -> Self {
        self.prediction = prediction;
        self
    }

    /// Annotation value for `column`, if the row was flagged under it.
    pub fn annotation(&self, column: &str) -> Option<&Value> {
        self.annotations.get(column)
    }

    /// A row counts as flagged when its annotation is present and truthy.
    pub fn is_flagged(&self, column: &str) -> bool {
        self.annotation(column).is_some_and(is_truthy)
    }

    fn set_annotation(&mut self, column: &str, value: Option<Value>) {
        match value {
            Some(v) if !v.is_null() => {
                self.annotations.insert(column.to_string(), v);
            }
            _ => {
                self.annotations.remove(column);
            }
        }
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

/// Ordered rows plus the set of columns they were read with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    columns: Vec<String>,
    annotation_columns: Vec<String>,
    rows: Vec<Turn>,
}

impl RecordTable {
    /// Table with an explicit source schema (e.g. a CSV header).
    pub fn new(columns: Vec<String>, rows: Vec<Turn>) -> Self {
        Self {
            columns,
            annotation_columns: Vec::new(),
            rows,
        }
    }

    /// Table carrying all core columns.
    pub fn from_rows(rows: Vec<Turn>) -> Self {
        Self::new(CORE_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn annotation_columns(&self) -> &[String] {
        &self.annotation_columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name) || self.annotation_columns.iter().any(|c| c == name)
    }

    /// Fail with a schema error unless every column in `required` exists.
    pub fn require(&self, filter: &'static str, required: &[&'static str]) -> Result<(), SchemaError> {
        match required.iter().copied().find(|c| !self.has_column(c)) {
            Some(column) => Err(SchemaError::MissingColumn { filter, column }),
            None => Ok(()),
        }
    }

    pub fn rows(&self) -> &[Turn] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Turn> {
        self.rows
    }

    /// Add (or refresh) annotation column `column`, computing each row's value with `f`.
    /// `None` leaves the row unflagged.
    pub fn annotate<F>(&mut self, column: &str, mut f: F)
    where
        F: FnMut(&Turn) -> Option<Value>,
    {
        if !self.annotation_columns.iter().any(|c| c == column) {
            self.annotation_columns.push(column.to_string());
        }
        for row in &mut self.rows {
            let value = f(row);
            row.set_annotation(column, value);
        }
    }

    /// Keep only the rows at `indices` (ascending), preserving schema and annotations.
    pub fn retain_indices(self, indices: &[usize]) -> Self {
        let mut keep = indices.iter().copied().peekable();
        let rows = self
            .rows
            .into_iter()
            .enumerate()
            .filter_map(|(i, row)| {
                while keep.peek().is_some_and(|&k| k < i) {
                    keep.next();
                }
                (keep.peek() == Some(&i)).then_some(row)
            })
            .collect();
        Self {
            columns: self.columns,
            annotation_columns: self.annotation_columns,
            rows,
        }
    }

    /// Copy of this table restricted to rows matching `pred`, order preserved.
    pub fn filtered<P>(&self, mut pred: P) -> Self
    where
        P: FnMut(&Turn) -> bool,
    {
        Self {
            columns: self.columns.clone(),
            annotation_columns: self.annotation_columns.clone(),
            rows: self.rows.iter().filter(|r| pred(r)).cloned().collect(),
        }
    }

    /// Index of the last row of every call, in table order.
    pub fn last_row_per_call(&self) -> Vec<usize> {
        let mut last: HashMap<&str, usize> = HashMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            last.insert(row.call_uuid.as_str(), i);
        }
        let mut out: Vec<usize> = last.into_values().collect();
        out.sort_unstable();
        out
    }

    /// Terminal state row of every call.
    ///
    /// Rows are grouped by `(call_uuid, state)` keeping each group's first row; groups are
    /// ordered by first appearance and the last group of each call wins. A call that leaves
    /// its final state and returns to it therefore selects that state's *first* row.
    pub fn terminal_state_rows(&self) -> Vec<usize> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut last_group: HashMap<&str, usize> = HashMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            let key = (row.call_uuid.as_str(), row.state.as_str());
            if seen.insert(key) {
                last_group.insert(row.call_uuid.as_str(), i);
            }
        }
        let mut out: Vec<usize> = last_group.into_values().collect();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, states: &[&str]) -> Vec<Turn> {
        states
            .iter()
            .map(|s| Turn::new(id).with_state(*s))
            .collect()
    }

    #[test]
    fn top_alternative_prefers_highest_then_earliest() {
        let alts = vec![vec![
            Alternative::new(80.0, "a"),
            Alternative::new(92.0, "b"),
            Alternative::new(92.0, "c"),
        ]];
        assert_eq!(top_alternative(&alts).unwrap().transcript, "b");
        assert!(top_alternative(&[]).is_none());
        assert!(top_alternative(&[vec![]]).is_none());
    }

    #[test]
    fn prediction_score_accepts_numeric_strings() {
        let p = Prediction::from(json!({"score": "0.4"}).as_object().unwrap().clone());
        assert_eq!(p.score(), Some(0.4));
        let bad = Prediction::from(json!({"score": "high"}).as_object().unwrap().clone());
        assert_eq!(bad.score(), None);
        assert_eq!(Prediction::default().score(), None);
    }

    #[test]
    fn require_reports_first_missing_column() {
        let t = RecordTable::new(vec!["call_uuid".into()], vec![]);
        let err = t.require("x", &["call_uuid", "state"]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingColumn {
                filter: "x",
                column: "state"
            }
        );
    }

    #[test]
    fn annotate_adds_column_once_and_drops_nulls() {
        let mut t = RecordTable::from_rows(call("c1", &["A", "B"]));
        t.annotate("f", |r| (r.state == "A").then(|| json!({"hit": true})));
        t.annotate("f", |r| (r.state == "A").then(|| json!({"hit": true})));
        assert_eq!(t.annotation_columns(), &["f".to_string()]);
        assert!(t.rows()[0].is_flagged("f"));
        assert!(!t.rows()[1].is_flagged("f"));
        assert!(t.rows()[1].annotation("f").is_none());
    }

    #[test]
    fn last_row_per_call_keeps_table_order() {
        let mut rows = call("c1", &["A", "B"]);
        rows.extend(call("c2", &["A"]));
        rows.extend(call("c1", &["C"]));
        let t = RecordTable::from_rows(rows);
        assert_eq!(t.last_row_per_call(), vec![2, 3]);
    }

    #[test]
    fn terminal_state_rows_pick_last_distinct_state() {
        let t = RecordTable::from_rows(call("c1", &["START", "MID", "MID", "END"]));
        assert_eq!(t.terminal_state_rows(), vec![3]);

        // Revisiting an earlier state: the group of `A` already exists, so `B` stays last.
        let t = RecordTable::from_rows(call("c1", &["A", "B", "A"]));
        assert_eq!(t.terminal_state_rows(), vec![1]);
    }

    #[test]
    fn retain_indices_keeps_schema() {
        let mut t = RecordTable::from_rows(call("c1", &["A", "B", "C"]));
        t.annotate("f", |_| Some(json!(true)));
        let t = t.retain_indices(&[0, 2]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[1].state, "C");
        assert!(t.has_column("f"));
    }
}
