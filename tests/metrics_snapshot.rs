// tests/metrics_snapshot.rs
use call_sentinel::filters::NoAlternativesFilter;
use call_sentinel::telemetry::{MetricsSnapshot, ENV_METRICS_PATH};
use call_sentinel::{Alternative, FilterChain, RecordTable, Turn};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs;

#[test]
fn chain_counters_land_in_the_snapshot_file() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let dir = tempfile::tempdir().unwrap();
    let snapshot = MetricsSnapshot::new(recorder.handle(), dir.path().join("sentinel.prom"));

    let table = RecordTable::from_rows(vec![
        Turn::new("c1"),
        Turn::new("c2").with_alternatives(vec![vec![Alternative::new(99.0, "hi")]]),
    ]);
    metrics::with_local_recorder(&recorder, || {
        FilterChain::new()
            .with(Box::new(NoAlternativesFilter))
            .handle(table)
            .unwrap();
    });

    snapshot.write().unwrap();
    let text = fs::read_to_string(snapshot.path()).unwrap();
    assert!(
        text.contains(r#"sentinel_rows_processed_total{filter="no_alternatives"} 2"#),
        "{text}"
    );
    assert!(
        text.contains(r#"sentinel_rows_flagged_total{filter="no_alternatives"} 1"#),
        "{text}"
    );
}

#[test]
#[serial_test::serial]
fn no_path_means_no_recorder() {
    std::env::remove_var(ENV_METRICS_PATH);
    assert!(MetricsSnapshot::install_from_env().is_none());

    std::env::set_var(ENV_METRICS_PATH, "  ");
    assert!(MetricsSnapshot::install_from_env().is_none());
    std::env::remove_var(ENV_METRICS_PATH);
}
