mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::{FakeProvider, Reply};
use predicates::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;
use uuid::Uuid;

fn orders(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "order_id, amount, ttl_ms").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

fn paygate(provider_host_port: &str) -> Command {
    let mut cmd = Command::new(cargo_bin!("paygate"));
    cmd.env("PAYGATE_PROVIDER__HOST_PORT", provider_host_port)
        .env("PAYGATE_PROVIDER__RETRY_AMOUNT", "1")
        .env("PAYGATE_ACCOUNT__AVERAGE_PROCESSING_TIME_MS", "100")
        .env("PAYGATE_DISPATCH__WORKERS", "4");
    cmd
}

fn closed_port() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Parses the output CSV into rows keyed by order id.
fn rows_by_order(stdout: &[u8]) -> HashMap<String, HashMap<String, String>> {
    let mut reader = csv::Reader::from_reader(stdout);
    reader
        .deserialize::<HashMap<String, String>>()
        .map(|row| {
            let row = row.unwrap();
            (row["order_id"].clone(), row)
        })
        .collect()
}

#[test]
fn test_cli_end_to_end() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let provider = runtime.block_on(FakeProvider::start(vec![Reply::Success]));
    let paid = Uuid::new_v4();
    let expired = Uuid::new_v4();
    let file = orders(&[&format!("{paid}, 100, 30000"), &format!("{expired}, 25, 0")]);

    let output = paygate(provider.host_port())
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    assert!(stdout.starts_with("payment_id,order_id,amount,submitted,transaction_id,success,reason"));
    let rows = rows_by_order(&output.stdout);
    assert_eq!(rows.len(), 2);

    let row = &rows[&paid.to_string()];
    assert_eq!(row["amount"], "100");
    assert_eq!(row["submitted"], "true");
    assert_eq!(row["success"], "true");
    assert!(Uuid::parse_str(&row["transaction_id"]).is_ok());

    let row = &rows[&expired.to_string()];
    assert_eq!(row["submitted"], "true");
    assert_eq!(row["success"], "false");
    assert!(row["reason"].contains("Not enough time"));

    assert_eq!(provider.hits(), 1);
}

#[test]
fn test_unreachable_provider_fails_payments() {
    let order_id = Uuid::new_v4();
    let file = orders(&[&format!("{order_id}, 100, 30000")]);

    let output = paygate(&closed_port()).arg(file.path()).output().unwrap();
    assert!(output.status.success());

    let rows = rows_by_order(&output.stdout);
    let row = &rows[&order_id.to_string()];
    assert_eq!(row["submitted"], "true");
    assert_eq!(row["success"], "false");
    assert!(row["reason"].starts_with("Transport error"));
}

#[test]
fn test_malformed_rows_are_reported() {
    let file = orders(&["not-a-uuid, 1, 1000", ", 0, 1000", ", 5", ", 7, 30000"]);

    paygate(&closed_port())
        .arg(file.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Error reading order"))
        .stdout(predicate::str::contains(",7,true,"));
}

#[test]
fn test_config_file_and_metrics() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "account:\n  account_name: acc-cli\nparallel_limiter:\n  kind: non_blocking").unwrap();
    let file = orders(&[", 10, 30000"]);

    paygate(&closed_port())
        .arg(file.path())
        .arg("--config")
        .arg(config.path())
        .arg("--metrics")
        .assert()
        .success()
        .stderr(predicate::str::contains(
            r#"payment_outcome_counter{outcome="ERROR",service="acc-cli"} 1"#,
        ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let file = orders(&[", 10, 30000"]);

    paygate(&closed_port())
        .env("PAYGATE_PROVIDER__RETRY_AMOUNT", "0")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("retry_amount"));
}
