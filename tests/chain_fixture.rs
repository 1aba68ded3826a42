// tests/chain_fixture.rs
use call_sentinel::config::{CsvSinkConfig, FilterEntry, RunConfig, SinkConfig};
use call_sentinel::pipeline;
use call_sentinel::reader::CsvReader;
use call_sentinel::{FilterChain, FilterRegistry, RecordTable};
use std::path::PathBuf;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/records.csv")
}

fn fixture() -> RecordTable {
    CsvReader.read_path(&fixture_path()).expect("fixture loads")
}

/// Row-preserving filters first, then the per-call ones.
fn full_config() -> RunConfig {
    let mut word = FilterEntry::new("word_match");
    word.kwargs
        .insert("word_list".into(), toml::Value::Array(vec!["agent".into()]));
    let names = [
        "no_alternatives",
        "low_asr_confidence",
        "prediction_low_confidence",
        "state_stuck",
        "state_loop",
        "call_end_state",
    ];
    let mut filters: Vec<FilterEntry> = names.iter().map(|n| FilterEntry::new(*n)).collect();
    filters.insert(1, word);
    RunConfig {
        data_url: fixture_path().display().to_string(),
        filters,
        ..RunConfig::default()
    }
}

fn calls(table: &RecordTable) -> Vec<&str> {
    table.rows().iter().map(|r| r.call_uuid.as_str()).collect()
}

#[test]
fn fixture_decodes_structured_columns() {
    let t = fixture();
    assert_eq!(t.len(), 9);
    assert!(t.rows()[0].alternatives.is_empty());
    assert_eq!(t.rows()[2].alternatives[0].len(), 2);
    assert_eq!(t.rows()[3].prediction.score(), Some(0.97));
    assert_eq!(t.rows()[4].extra["language"], "hi");
}

#[test]
fn every_category_is_extracted_from_its_own_snapshot() {
    let cats = pipeline::annotate(&full_config(), &FilterRegistry::with_builtin(), fixture())
        .expect("chain runs");
    let by_name = |n: &str| {
        cats.iter()
            .find(|c| c.name == n)
            .unwrap_or_else(|| panic!("missing category {n}"))
    };

    assert_eq!(by_name("no_alternatives").len(), 6);
    assert_eq!(calls(&by_name("word_match").rows), vec!["c2"]);
    assert_eq!(by_name("word_match").rows.rows()[0].conversation_uuid, "t3");
    assert_eq!(calls(&by_name("low_asr_confidence").rows), vec!["c2"]);
    assert_eq!(calls(&by_name("prediction_low_confidence").rows), vec!["c2"]);
    assert_eq!(calls(&by_name("state_stuck").rows), vec!["c3"]);
    assert_eq!(calls(&by_name("state_loop").rows), vec!["c4"]);
    assert_eq!(calls(&by_name("call_end_state").rows), vec!["c2"]);
}

#[test]
fn final_table_has_one_row_per_call_and_all_annotations() {
    let cfg = full_config();
    let registry = FilterRegistry::with_builtin();
    let chain = FilterChain::from_config(&registry, cfg.filter_specs()).unwrap();
    let out = chain.handle(fixture()).unwrap();

    assert_eq!(calls(&out), vec!["c1", "c2", "c3", "c4"]);
    assert_eq!(out.annotation_columns().len(), 7);
    // earlier annotations survive the row reduction
    assert!(out.rows()[0].is_flagged("no_alternatives"));
    assert!(out.rows()[3].is_flagged("state_loop"));
}

#[test]
fn end_state_before_loop_sees_the_terminal_group_row() {
    // c4's last new (call, state) group is B at t8, so a loop check after it sees "A -> B".
    let cfg = RunConfig {
        filters: vec![FilterEntry::new("call_end_state"), FilterEntry::new("state_loop")],
        ..RunConfig::default()
    };
    let cats = pipeline::annotate(&cfg, &FilterRegistry::with_builtin(), fixture()).unwrap();
    assert_eq!(cats[0].rows.len(), 1);
    assert!(cats[1].is_empty());
}

#[tokio::test]
async fn full_run_writes_category_csvs() {
    let out = tempfile::tempdir().unwrap();
    let mut cfg = full_config();
    cfg.export.push(SinkConfig::Csv(CsvSinkConfig {
        output_dir: Some(out.path().to_path_buf()),
    }));

    let report = pipeline::run(&cfg).await.expect("run ok");
    assert!(report.is_success());
    assert_eq!(report.rows_read, 9);
    assert_eq!(report.flagged("state_stuck"), Some(1));
    assert_eq!(report.flagged("no_alternatives"), Some(6));

    let body = std::fs::read_to_string(out.path().join("state_stuck.csv")).unwrap();
    let mut lines = body.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("call_uuid,conversation_uuid,state,state_transitions"));
    assert!(header.contains(",language,"));
    assert!(header.ends_with(",state_stuck"));
    let row = lines.next().unwrap();
    assert!(row.starts_with("c3,t6,B,"));
    assert!(row.ends_with(r#""{""state_stuck"":4}""#));
    assert!(lines.next().is_none());

    let words = std::fs::read_to_string(out.path().join("word_match.csv")).unwrap();
    assert_eq!(words.lines().count(), 2);
    assert!(words.contains(r#""{""word_match"":[""agent""]}""#));
}

#[tokio::test]
async fn failing_sink_is_reported_not_raised() {
    let mut cfg = full_config();
    cfg.export.push(SinkConfig::Tog(call_sentinel::config::TogSinkConfig {
        job_id: "7".into(),
        // nothing listens on the discard port
        base_url: Some("http://127.0.0.1:9".into()),
    }));
    let report = pipeline::run(&cfg).await.expect("run itself succeeds");
    assert!(!report.is_success());
    assert_eq!(report.sink_failures[0].sink, "tog");
}

#[tokio::test]
async fn missing_data_source_names_the_stage() {
    let cfg = RunConfig {
        data_url: "/definitely/not/here.csv".into(),
        filters: vec![FilterEntry::new("no_alternatives")],
        ..RunConfig::default()
    };
    let err = pipeline::run(&cfg).await.unwrap_err();
    assert!(format!("{err:#}").starts_with("reading records"));
}
