//! End-to-end pipeline tests: mock ISS server → wide file on disk.

use chrono::NaiveDate;
use mockito::{Matcher, Mock, ServerGuard};
use moexclose_core::{
    read_wide_csv, run_pipeline, DataError, IssClient, LoaderConfig, LogProgress,
};
use std::path::PathBuf;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn history_path(security: &str) -> String {
    format!("/iss/history/engines/stock/markets/shares/boards/TQTF/securities/{security}.json")
}

fn mock_history(server: &mut ServerGuard, security: &str, rows: &[(&str, Option<f64>)]) -> Mock {
    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|(date, close)| serde_json::json!(["TQTF", date, security, security, close]))
        .collect();
    let body = serde_json::json!({
        "history": {
            "columns": ["BOARDID", "TRADEDATE", "SHORTNAME", "SECID", "CLOSE"],
            "data": data,
        }
    });
    server
        .mock("GET", history_path(security).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create()
}

fn config(server: &ServerGuard, securities: &[&str], output: PathBuf) -> LoaderConfig {
    LoaderConfig {
        securities: securities.iter().map(|s| s.to_string()).collect(),
        start_date: d("2024-01-01"),
        end_date: d("2024-01-31"),
        window_days: 100,
        base_url: server.url(),
        output,
        ..LoaderConfig::default()
    }
}

#[test]
fn pipeline_writes_pivoted_file_and_skips_failed_pairing() {
    let mut server = mockito::Server::new();
    let aaa = mock_history(
        &mut server,
        "AAA",
        &[("2024-01-02", Some(10.5)), ("2024-01-03", Some(11.0))],
    );
    let bbb = mock_history(&mut server, "BBB", &[("2024-01-02", Some(20.0))]);
    let ccc = server
        .mock("GET", history_path("CCC").as_str())
        .match_query(Matcher::Any)
        .with_status(404)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("close_data.csv");
    let cfg = config(&server, &["CCC", "BBB", "AAA"], out.clone());
    let client = IssClient::new(&cfg).unwrap();

    let summary = run_pipeline(&cfg, &client, &LogProgress).unwrap();

    aaa.assert();
    bbb.assert();
    ccc.assert();
    assert_eq!(summary.pairings, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.securities, 2);
    assert_eq!(summary.output, out);

    let content = std::fs::read_to_string(&out).unwrap();
    assert_eq!(
        content,
        "DATE;AAA;BBB\n2024-01-02;10.5;20.0\n2024-01-03;11.0;\n"
    );

    // Re-reading inverts the write
    let table = read_wide_csv(&out, b';').unwrap();
    assert_eq!(table.securities, ["AAA", "BBB"]);
    assert_eq!(table.get(d("2024-01-02"), "BBB"), Some(20.0));
    assert_eq!(table.get(d("2024-01-03"), "BBB"), None);
}

#[test]
fn every_pairing_failing_is_fatal_and_keeps_previous_output() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(503)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("close_data.csv");
    std::fs::write(&out, "previous run").unwrap();

    let cfg = config(&server, &["AAA", "BBB"], out.clone());
    let client = IssClient::new(&cfg).unwrap();

    let err = run_pipeline(&cfg, &client, &LogProgress).unwrap_err();
    assert!(matches!(err, DataError::NoDataFetched));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "previous run");
}

#[test]
fn schema_change_stops_the_run() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", history_path("AAA").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"history": {"columns": ["TRADEDATE", "SECID", "LAST"], "data": []}}"#)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("close_data.csv");
    let cfg = config(&server, &["AAA"], out.clone());
    let client = IssClient::new(&cfg).unwrap();

    let err = run_pipeline(&cfg, &client, &LogProgress).unwrap_err();
    assert!(matches!(err, DataError::SchemaMismatch(_)));
    assert!(!out.exists());
}

#[test]
fn custom_delimiter_and_null_closes() {
    let mut server = mockito::Server::new();
    let _aaa = mock_history(
        &mut server,
        "AAA",
        &[("2024-01-02", None), ("2024-01-03", Some(7.25))],
    );

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("close_data.tsv");
    let cfg = LoaderConfig {
        delimiter: '\t',
        ..config(&server, &["AAA"], out.clone())
    };
    let client = IssClient::new(&cfg).unwrap();

    run_pipeline(&cfg, &client, &LogProgress).unwrap();

    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "DATE\tAAA\n2024-01-02\t\n2024-01-03\t7.25\n"
    );
}
