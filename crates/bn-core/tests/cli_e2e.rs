//! End-to-end tests for the `bnet` binary.
//!
//! Each test writes its inputs into a temp dir, runs one subcommand and checks
//! stdout JSON plus the exit code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const CHAIN: &str = r#"{
    "schema_version": "1.0.0",
    "nodes": [
        { "name": "A", "categories": ["no", "yes"], "cpt": [[0.3, 0.7]] },
        { "name": "B", "categories": ["no", "yes"], "parents": ["A"],
          "cpt": [[0.9, 0.1], [0.2, 0.8]] },
        { "name": "C", "categories": ["no", "yes"], "parents": ["B"],
          "cpt": [[0.6, 0.4], [0.1, 0.9]] }
    ]
}"#;

fn bnet() -> Command {
    let mut cmd = cargo_bin_cmd!("bnet");
    cmd.timeout(Duration::from_secs(60));
    cmd.env_remove("BNET_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn simulate_into(dir: &TempDir, network: &Path, samples: usize) -> PathBuf {
    let output = bnet()
        .args(["simulate", "--samples", &samples.to_string(), "--seed", "11"])
        .arg("--network")
        .arg(network)
        .output()
        .unwrap();
    assert!(output.status.success());
    let path = dir.path().join("data.json");
    std::fs::write(&path, &output.stdout).unwrap();
    path
}

fn marginal_of(report: &Value, node: &str) -> Vec<f64> {
    report["marginals"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["node"] == node)
        .unwrap()["marginal"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect()
}

#[test]
fn simulate_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    let run = || {
        stdout_json(
            bnet()
                .args(["simulate", "--samples", "25", "--seed", "5", "--network"])
                .arg(&network),
        )
    };
    let first = run();
    assert_eq!(first, run());
    assert_eq!(first["num_rows"], 25);
    assert_eq!(first["columns"].as_array().unwrap().len(), 3);
}

#[test]
fn marginals_with_observation() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    let report = stdout_json(
        bnet()
            .args(["marginals", "--evidence", "A=yes", "--prior", "--network"])
            .arg(&network),
    );
    let c = marginal_of(&report, "C");
    let expected = 0.2 * 0.4 + 0.8 * 0.9;
    assert!((c[1] - expected).abs() < 1e-9, "{c:?}");
    assert!((report["probability_of_evidence"].as_f64().unwrap() - 0.7).abs() < 1e-9);

    let prior_a = report["marginals"][0]["prior"][1].as_f64().unwrap();
    assert!((prior_a - 0.7).abs() < 1e-9);
}

#[test]
fn marginals_with_intervention() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    let report = stdout_json(
        bnet()
            .args([
                "marginals",
                "--evidence",
                "B=1",
                "--manipulate",
                "B",
                "--node",
                "A",
                "--network",
            ])
            .arg(&network),
    );
    assert_eq!(report["marginals"].as_array().unwrap().len(), 1);
    let a = marginal_of(&report, "A");
    assert!((a[1] - 0.7).abs() < 1e-9);
}

#[test]
fn table_output() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    bnet()
        .args(["--format", "table", "marginals", "--node", "A", "--network"])
        .arg(&network)
        .assert()
        .success()
        .stdout(predicate::str::contains("A\tyes\t0.700000"));
}

#[test]
fn score_and_estimate_from_simulated_data() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    let data = simulate_into(&dir, &network, 300);

    let report = stdout_json(
        bnet()
            .arg("score")
            .arg("--network")
            .arg(&network)
            .arg("--data")
            .arg(&data),
    );
    assert_eq!(report["families"].as_array().unwrap().len(), 3);
    let total = report["total"].as_f64().unwrap();
    assert!(total.is_finite() && total < 0.0);
    assert_eq!(report["cache"]["misses"], 3);

    let estimated = stdout_json(
        bnet()
            .args(["estimate", "--pseudo-count", "1"])
            .arg("--network")
            .arg(&network)
            .arg("--data")
            .arg(&data),
    );
    let b_rows = estimated["nodes"][1]["cpt"].as_array().unwrap();
    assert_eq!(b_rows.len(), 2);
    let p = b_rows[1][1].as_f64().unwrap();
    assert!((p - 0.8).abs() < 0.1, "P(B=yes | A=yes) = {p}");
}

#[test]
fn em_estimate_matches_ml_on_complete_data() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    let data = simulate_into(&dir, &network, 300);

    let estimate = |method: &str| {
        stdout_json(
            bnet()
                .args(["estimate", "--seed", "3", "--threshold", "1e-9", "--method", method])
                .arg("--network")
                .arg(&network)
                .arg("--data")
                .arg(&data),
        )
    };
    let ml = estimate("ml");
    let em = estimate("em");
    for node in 0..3 {
        let ml_rows = ml["nodes"][node]["cpt"].as_array().unwrap();
        let em_rows = em["nodes"][node]["cpt"].as_array().unwrap();
        for (m, e) in ml_rows.iter().zip(em_rows) {
            for (p, q) in m.as_array().unwrap().iter().zip(e.as_array().unwrap()) {
                assert!((p.as_f64().unwrap() - q.as_f64().unwrap()).abs() < 1e-9);
            }
        }
    }
}

#[test]
fn unnormalized_network_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let network = write(
        &dir,
        "net.json",
        r#"{ "nodes": [ { "name": "A", "categories": ["no", "yes"], "cpt": [[0.3, 0.3]] } ] }"#,
    );
    bnet()
        .args(["marginals", "--network"])
        .arg(&network)
        .assert()
        .code(10)
        .stderr(predicate::str::contains("sums to"));
}

#[test]
fn unknown_node_exits_with_lookup_code() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    bnet()
        .args(["marginals", "--evidence", "Z=1", "--network"])
        .arg(&network)
        .assert()
        .code(20)
        .stderr(predicate::str::contains("\"code\":20"));
}

#[test]
fn bad_config_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    let config = write(&dir, "config.json", r#"{"categories": {"low": 1, "high": 3}}"#);
    bnet()
        .arg("--config")
        .arg(&config)
        .args(["simulate", "--network"])
        .arg(&network)
        .assert()
        .code(10);
}

#[test]
fn config_from_environment() {
    let dir = TempDir::new().unwrap();
    let network = write(&dir, "net.json", CHAIN);
    let config = write(&dir, "config.json", r#"{"inference": {"max_joint_states": 0}}"#);
    bnet()
        .env("BNET_CONFIG", &config)
        .args(["marginals", "--network"])
        .arg(&network)
        .assert()
        .code(10);
}

#[test]
fn missing_network_is_io_error() {
    let dir = TempDir::new().unwrap();
    bnet()
        .args(["--format", "table", "simulate", "--network"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(60)
        .stderr(predicate::str::starts_with("error:"));
}
