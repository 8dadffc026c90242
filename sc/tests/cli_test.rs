//! CLI tests for the `sc` binary

use std::fs;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn sc() -> Command {
    Command::cargo_bin("sc").expect("sc binary not built")
}

fn unused_port() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

#[test]
fn test_help_lists_subcommands() {
    sc().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("unit"))
        .stdout(predicate::str::contains("demo"));
}

#[test]
fn test_missing_subcommand_fails() {
    sc().assert().failure();
}

#[test]
fn test_unit_reports_refused_connection() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("sc.yml");
    fs::write(&config, "{}\n").unwrap();

    sc().arg("-c")
        .arg(&config)
        .args(["unit", "north", "--server", &unused_port()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not connect"));
}

#[test]
fn test_missing_config_file_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("missing.yml");

    sc().arg("--config")
        .arg(&config)
        .args(["unit", "north"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_demo_units_reach_configured_coordinator() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("sc.yml");
    fs::write(
        &config,
        format!(
            "coordinator:\n  bind: {}\n  poll-interval-ms: 100\ndemo:\n  startup-delay-ms: 300\n  units: [north, south]\n",
            unused_port()
        ),
    )
    .unwrap();

    sc().arg("-c")
        .arg(&config)
        .args(["demo", "--duration-secs", "2"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .stderr(predicate::str::contains("Cycle complete"))
        .stderr(predicate::str::contains("Could not connect").not());
}
