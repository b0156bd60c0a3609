//! End-to-end sweeps against scripted client and server executables
//!
//! Shaping is disabled so these run unprivileged. Each test uses its own port
//! because the harness reclaims the server port before every trial.

#![cfg(unix)]

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const HEADER: &str = "delay,bandwidth,filesize,transmission_ms,error";

/// Scripted client/server pair in a scratch directory
struct Harness {
    dir: TempDir,
    port: u16,
}

impl Harness {
    fn new(port: u16, client_body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        write_script(&dir.path().join("client"), client_body);
        // Writes the output file it was given, like a real receiver
        write_script(&dir.path().join("server"), ": > \"$3\"\nexit 0");
        Self { dir, port }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("netsweep").unwrap();
        cmd.current_dir(self.dir.path())
            .env("NO_COLOR", "1")
            .env_remove("DELAYS")
            .env_remove("BANDWIDTHS")
            .env_remove("SIZES")
            .args(["--no-color", "--no-shaping"])
            .args(["--port", &self.port.to_string()])
            .args(["--settle-ms", "0", "--retry-sleep-ms", "0", "--reclaim-pause-ms", "0"])
            .args(["--server-exit-grace", "2"])
            .arg("--client").arg(self.path("client"))
            .arg("--server").arg(self.path("server"))
            .arg("--result-log").arg(self.path("results.csv"))
            .arg("--payload-dir").arg(self.path("payloads"))
            .arg("--server-output").arg(self.path("received.bin"));
        cmd
    }

    fn rows(&self) -> Vec<String> {
        fs::read_to_string(self.path("results.csv"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_successful_trial_is_logged() {
    let harness = Harness::new(47311, "echo connecting\necho \"Transmission took 42 ms\"");

    harness
        .cmd()
        .args(["--delays", "0ms", "--bandwidths", "1Mbps", "--sizes", "10K"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sweep complete"))
        .stdout(predicate::str::contains("Succeeded: 1 (100.0%)"));

    assert_eq!(harness.rows(), vec![HEADER.to_string(), "0ms,1Mbps,10K,42,".to_string()]);

    let payload = harness.path("payloads").join("payload_10K.bin");
    assert_eq!(fs::metadata(payload).unwrap().len(), 10 * 1024);
}

#[test]
fn test_every_cell_gets_a_row_in_grid_order() {
    let harness = Harness::new(47312, "echo \"Transmission took 7 ms\"");

    harness
        .cmd()
        .args(["--delays", "0ms,20ms", "--bandwidths", "1Mbps", "--sizes", "1K,2K"])
        .assert()
        .success();

    assert_eq!(
        harness.rows(),
        vec![
            HEADER,
            "0ms,1Mbps,1K,7,",
            "0ms,1Mbps,2K,7,",
            "20ms,1Mbps,1K,7,",
            "20ms,1Mbps,2K,7,",
        ]
    );
}

#[test]
fn test_rerun_appends_without_second_header() {
    let harness = Harness::new(47313, "echo \"Transmission took 5 ms\"");
    for _ in 0..2 {
        harness
            .cmd()
            .args(["--delays", "0ms", "--bandwidths", "1Mbps", "--sizes", "1K"])
            .assert()
            .success();
    }

    let rows = harness.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|r| r.as_str() == HEADER).count(), 1);
}

#[test]
fn test_client_that_always_times_out() {
    let harness = Harness::new(47314, "sleep 10");

    harness
        .cmd()
        .args(["--delays", "0ms", "--bandwidths", "1Mbps", "--sizes", "1K"])
        .args(["--timeout", "1", "--retries", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timeouts 1"));

    assert_eq!(harness.rows()[1], "0ms,1Mbps,1K,,TIMEOUT");
}

#[test]
fn test_missing_phrase_is_parse_failure() {
    let harness = Harness::new(47315, "echo \"sent, all good\"");

    harness
        .cmd()
        .args(["--delays", "0ms", "--bandwidths", "1Mbps", "--sizes", "1K"])
        .args(["--retries", "1"])
        .assert()
        .success();

    let row = &harness.rows()[1];
    assert!(row.starts_with("0ms,1Mbps,1K,,PARSE_FAIL:"), "{}", row);
    // Commas in client output never add columns
    assert_eq!(row.matches(',').count(), 4);
}

#[test]
fn test_nonzero_exit_is_recorded() {
    let harness = Harness::new(47316, "echo refused >&2\nexit 3");

    harness
        .cmd()
        .args(["--delays", "0ms", "--bandwidths", "1Mbps", "--sizes", "1K"])
        .args(["--retries", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("process errors 1"));

    let row = &harness.rows()[1];
    assert!(row.starts_with("0ms,1Mbps,1K,,EXIT_3:"), "{}", row);
    assert!(row.contains("refused"));
}

#[test]
fn test_summary_json_is_written() {
    let harness = Harness::new(47317, "echo \"Transmission took 11 ms\"");

    harness
        .cmd()
        .args(["--delays", "0ms", "--bandwidths", "1Mbps,2Mbps", "--sizes", "1K"])
        .arg("--summary-json")
        .arg(harness.path("summary.json"))
        .assert()
        .success();

    let summary: Value = serde_json::from_str(&fs::read_to_string(harness.path("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["planned"], 2);
    assert_eq!(summary["succeeded"], 2);
    assert_eq!(summary["fastest_ms"], 11);
    assert_eq!(summary["interrupted"], false);
}
