// src/filters/alternatives.rs
//! Filters over the ASR alternatives column.

use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;

use super::registry::{FilterRegistry, FilterSpec, OptionDoc};
use super::{parse_options, Filter, FilterOptions};
use crate::error::{ConfigError, FilterResult};
use crate::table::{top_alternative, RecordTable, ALTERNATIVES};

pub const NO_ALTERNATIVES: &str = "no_alternatives";
pub const WORD_MATCH: &str = "word_match";

pub(super) fn register(reg: &mut FilterRegistry) {
    reg.register(FilterSpec::new(
        NO_ALTERNATIVES,
        "Turns with no alternatives",
        |_| Ok(Box::new(NoAlternativesFilter)),
    ));
    reg.register(
        FilterSpec::new(
            WORD_MATCH,
            "Turns whose top transcript contains a watched word",
            |opts| Ok(Box::new(WordMatchFilter::from_options(opts)?)),
        )
        .with_options(WORD_MATCH_OPTIONS),
    );
}

/// Flags turns where ASR produced nothing at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlternativesFilter;

impl Filter for NoAlternativesFilter {
    fn name(&self) -> &'static str {
        NO_ALTERNATIVES
    }

    fn process(&self, mut table: RecordTable) -> FilterResult<RecordTable> {
        table.require(NO_ALTERNATIVES, &[ALTERNATIVES])?;
        table.annotate(NO_ALTERNATIVES, |turn| {
            turn.alternatives
                .is_empty()
                .then(|| json!({ "no_alternatives": true }))
        });
        Ok(table)
    }
}

const WORD_MATCH_OPTIONS: &[OptionDoc] = &[OptionDoc {
    name: "word_list",
    default: "[]",
    help: "words to look for (substring match) in the top transcript",
}];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WordMatchOptions {
    pub word_list: BTreeSet<String>,
}

/// Flags turns whose best transcript contains any configured word.
#[derive(Debug, Clone, Default)]
pub struct WordMatchFilter {
    opts: WordMatchOptions,
}

impl WordMatchFilter {
    pub fn new(opts: WordMatchOptions) -> Self {
        Self { opts }
    }

    pub fn from_options(options: &FilterOptions) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_options(
            WORD_MATCH,
            options,
            WORD_MATCH_OPTIONS,
        )?))
    }

    pub fn with_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(WordMatchOptions {
            word_list: words.into_iter().map(Into::into).collect(),
        })
    }

    fn matches(&self, transcript: &str) -> bool {
        self.opts
            .word_list
            .iter()
            .any(|w| !w.is_empty() && transcript.contains(w.as_str()))
    }
}

impl Filter for WordMatchFilter {
    fn name(&self) -> &'static str {
        WORD_MATCH
    }

    fn process(&self, mut table: RecordTable) -> FilterResult<RecordTable> {
        table.require(WORD_MATCH, &[ALTERNATIVES])?;
        let words: Vec<&String> = self.opts.word_list.iter().collect();
        table.annotate(WORD_MATCH, |turn| {
            let top = top_alternative(&turn.alternatives)?;
            self.matches(&top.transcript)
                .then(|| json!({ "word_match": words }))
        });
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Alternative, Turn};

    fn table() -> RecordTable {
        RecordTable::from_rows(vec![
            Turn::new("c1"),
            Turn::new("c2").with_alternatives(vec![vec![
                Alternative::new(60.0, "talk to an agent"),
                Alternative::new(99.0, "hello there"),
            ]]),
            Turn::new("c3").with_alternatives(vec![vec![Alternative::new(
                90.0,
                "i want to cancel",
            )]]),
        ])
    }

    #[test]
    fn no_alternatives_flags_only_empty_rows() {
        let out = NoAlternativesFilter.process(table()).unwrap();
        let flagged: Vec<_> = out
            .rows()
            .iter()
            .map(|r| r.is_flagged(NO_ALTERNATIVES))
            .collect();
        assert_eq!(flagged, vec![true, false, false]);
        assert_eq!(
            out.rows()[0].annotation(NO_ALTERNATIVES),
            Some(&json!({"no_alternatives": true}))
        );
    }

    #[test]
    fn word_match_inspects_only_the_top_alternative() {
        let f = WordMatchFilter::with_words(["agent", "cancel"]);
        let out = f.process(table()).unwrap();
        // c2's top entry is "hello there"; "agent" sits in a lower-ranked hypothesis.
        assert!(!out.rows()[1].is_flagged(WORD_MATCH));
        assert_eq!(
            out.rows()[2].annotation(WORD_MATCH),
            Some(&json!({"word_match": ["agent", "cancel"]}))
        );
        assert!(!out.rows()[0].is_flagged(WORD_MATCH));
    }

    #[test]
    fn empty_word_list_flags_nothing() {
        let out = WordMatchFilter::default().process(table()).unwrap();
        assert!(out.rows().iter().all(|r| !r.is_flagged(WORD_MATCH)));
        assert!(out.has_column(WORD_MATCH));
    }

    #[test]
    fn missing_alternatives_column_is_a_schema_error() {
        let t = RecordTable::new(vec!["call_uuid".into()], vec![Turn::new("c1")]);
        assert!(NoAlternativesFilter.process(t).is_err());
    }

    #[test]
    fn word_list_option_parses_from_toml() {
        let opts: FilterOptions = toml::from_str(r#"word_list = ["refund"]"#).unwrap();
        let f = WordMatchFilter::from_options(&opts).unwrap();
        assert!(f.matches("i need a refund"));
    }
}
