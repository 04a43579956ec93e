// SPDX-License-Identifier: MIT OR Apache-2.0
//! Guard logic: decide whether a persisted proof artifact is trustworthy
//! enough for a downstream caller to proceed.

use chrono::Utc;
use std::path::Path;

/// Evaluate the proof artifact at `path` against the freshness and
/// contract rules. `require_agentic` is `strict_mode` OR the
/// `ENGINE_AGENTIC` environment variable. `now_ms` is injected so tests
/// don't depend on wall-clock timing.
///
/// Returns `Ok(())` when the guard passes, or one of the exact error
/// strings (`proof_missing`, `proof_invalid_json`, `missing_timestamp`,
/// `proof_timestamp_invalid`, `proof_stale`, `proof_failed`,
/// `agentic_contract_violated_runtime`,
/// `agentic_contract_violated_engagement`) on failure.
pub fn check_guard(
    path: &Path,
    max_age_min: i64,
    require_agentic: bool,
    now_ms: i64,
) -> Result<(), &'static str> {
    let contents = std::fs::read_to_string(path).map_err(|_| "proof_missing")?;
    let artifact: serde_json::Value =
        serde_json::from_str(&contents).map_err(|_| "proof_invalid_json")?;

    let timestamp_ms = artifact
        .get("timestamp_ms")
        .ok_or("missing_timestamp")?
        .as_i64()
        .ok_or("proof_timestamp_invalid")?;

    let age_ms = now_ms - timestamp_ms;
    if age_ms < 0 {
        return Err("proof_timestamp_invalid");
    }
    if age_ms > max_age_min.max(0) * 60_000 {
        return Err("proof_stale");
    }

    let ok = artifact.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
    if !ok {
        return Err("proof_failed");
    }

    if require_agentic {
        let runtime_mode = artifact
            .get("runtime_mode")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if runtime_mode != "real" {
            return Err("agentic_contract_violated_runtime");
        }

        const REQUIRED_FLAGS: &[&str] = &[
            "has_preflight_ok",
            "has_plan_created",
            "has_spawn_or_request",
            "has_proof_verified",
        ];
        let engagement = artifact.get("engagement");
        let all_set = engagement
            .map(|e| {
                REQUIRED_FLAGS
                    .iter()
                    .all(|k| e.get(k).and_then(|v| v.as_bool()).unwrap_or(false))
            })
            .unwrap_or(false);
        if !all_set {
            return Err("agentic_contract_violated_engagement");
        }
    }

    Ok(())
}

/// Convenience wrapper using the current wall-clock time.
pub fn check_guard_now(path: &Path, max_age_min: i64, require_agentic: bool) -> Result<(), &'static str> {
    check_guard(path, max_age_min, require_agentic, Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &tempfile::TempDir, value: &serde_json::Value) -> std::path::PathBuf {
        let path = dir.path().join("last-proof.json");
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn missing_file_is_proof_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert_eq!(check_guard(&path, 10, false, 0), Err("proof_missing"));
    }

    #[test]
    fn invalid_json_is_proof_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last-proof.json");
        std::fs::write(&path, b"not json").unwrap();
        assert_eq!(check_guard(&path, 10, false, 0), Err("proof_invalid_json"));
    }

    #[test]
    fn missing_timestamp_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &json!({"ok": true}));
        assert_eq!(check_guard(&path, 10, false, 0), Err("missing_timestamp"));
    }

    #[test]
    fn stale_proof_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &json!({"ok": true, "timestamp_ms": 0}));
        let now = 11 * 60_000;
        assert_eq!(check_guard(&path, 10, false, now), Err("proof_stale"));
    }

    #[test]
    fn fresh_successful_proof_passes_non_agentic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &json!({"ok": true, "timestamp_ms": 1000}));
        assert_eq!(check_guard(&path, 10, false, 1000), Ok(()));
    }

    #[test]
    fn failed_run_is_proof_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &json!({"ok": false, "timestamp_ms": 1000}));
        assert_eq!(check_guard(&path, 10, false, 1000), Err("proof_failed"));
    }

    #[test]
    fn agentic_requires_real_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            &json!({"ok": true, "timestamp_ms": 1000, "runtime_mode": "simulated"}),
        );
        assert_eq!(
            check_guard(&path, 10, true, 1000),
            Err("agentic_contract_violated_runtime")
        );
    }

    #[test]
    fn agentic_requires_all_engagement_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            &json!({
                "ok": true,
                "timestamp_ms": 1000,
                "runtime_mode": "real",
                "engagement": {
                    "has_preflight_ok": true,
                    "has_plan_created": true,
                    "has_proof_verified": false,
                    "has_spawn_or_request": true,
                    "has_quality_gate_pass": true
                }
            }),
        );
        assert_eq!(
            check_guard(&path, 10, true, 1000),
            Err("agentic_contract_violated_engagement")
        );
    }

    #[test]
    fn agentic_passes_with_all_flags_and_real_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            &json!({
                "ok": true,
                "timestamp_ms": 1000,
                "runtime_mode": "real",
                "engagement": {
                    "has_preflight_ok": true,
                    "has_plan_created": true,
                    "has_proof_verified": true,
                    "has_spawn_or_request": true,
                    "has_quality_gate_pass": true
                }
            }),
        );
        assert_eq!(check_guard(&path, 10, true, 1000), Ok(()));
    }
}
