// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end scenarios for the two CLI binaries, run as separate
//! processes the way a real caller would invoke them.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write as _;

fn write_task(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join("task.json");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, r#"{{"name": "{name}", "input": {{}}}}"#).unwrap();
    path
}

#[test]
fn nominal_simulated_run_succeeds_with_exit_zero() {
    let dir = tempfile::tempdir().unwrap();
    let task_path = write_task(&dir, "demo");

    Command::cargo_bin("engine-run")
        .unwrap()
        .args([
            "--task-file",
            task_path.to_str().unwrap(),
            "--repo-root",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\":true"));

    let proof_path = dir.path().join(".engine/last-proof.json");
    assert!(proof_path.exists());

    let artifact: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&proof_path).unwrap()).unwrap();
    assert_eq!(artifact["ok"], true);
    assert_eq!(artifact["contract_mode"], "local");
    assert_eq!(artifact["runtime_mode"], "simulated");
    assert_eq!(artifact["verification"]["depth3_proof_verified"], true);
    assert_eq!(
        artifact["verification"]["depth3_proofs"]
            .as_array()
            .unwrap()
            .len(),
        2
    );

    let trace = artifact["trace"].as_array().unwrap();
    let kind_count = |kind: &str| trace.iter().filter(|e| e["kind"] == kind).count();
    assert_eq!(kind_count("spawn"), 5);
    assert_eq!(kind_count("return"), 5);
    assert_eq!(kind_count("merge"), 1);
    assert!(trace.iter().any(|e| e["kind"] == "simulation_warning"));
}

#[test]
fn strict_mode_without_capability_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let task_path = write_task(&dir, "demo");

    Command::cargo_bin("engine-run")
        .unwrap()
        .args([
            "--task-file",
            task_path.to_str().unwrap(),
            "--repo-root",
            dir.path().to_str().unwrap(),
            "--strict",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("tool_missing_strict"));
}

#[test]
fn forced_sleep_exits_five() {
    let dir = tempfile::tempdir().unwrap();
    let task_path = write_task(&dir, "demo");

    Command::cargo_bin("engine-run")
        .unwrap()
        .args([
            "--task-file",
            task_path.to_str().unwrap(),
            "--repo-root",
            dir.path().to_str().unwrap(),
            "--force-sleep",
        ])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("\"engagement\":\"asleep\""));
}

#[test]
fn budget_enforcement_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let task_path = write_task(&dir, "demo");
    std::fs::create_dir_all(dir.path().join(".engine")).unwrap();
    std::fs::write(
        dir.path().join(".engine/config.json"),
        r#"{"max_spawns": 1}"#,
    )
    .unwrap();

    Command::cargo_bin("engine-run")
        .unwrap()
        .args([
            "--task-file",
            task_path.to_str().unwrap(),
            "--repo-root",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("spawn_limit"));
}

#[test]
fn guard_reports_proof_missing_when_absent() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("engine-guard")
        .unwrap()
        .args(["--repo-root", dir.path().to_str().unwrap()])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("proof_missing"));
}

#[test]
fn guard_reports_stale_proof() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".engine")).unwrap();
    std::fs::write(
        dir.path().join(".engine/last-proof.json"),
        r#"{"ok": true, "timestamp_ms": 0}"#,
    )
    .unwrap();

    Command::cargo_bin("engine-guard")
        .unwrap()
        .args([
            "--repo-root",
            dir.path().to_str().unwrap(),
            "--max-age-min",
            "1",
        ])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("proof_stale"));
}

#[test]
fn guard_passes_after_a_real_run() {
    let dir = tempfile::tempdir().unwrap();
    let task_path = write_task(&dir, "demo");

    Command::cargo_bin("engine-run")
        .unwrap()
        .args([
            "--task-file",
            task_path.to_str().unwrap(),
            "--repo-root",
            dir.path().to_str().unwrap(),
        ])
        .assert()
        .success();

    Command::cargo_bin("engine-guard")
        .unwrap()
        .args(["--repo-root", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\":true"));
}
