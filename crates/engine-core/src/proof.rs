// SPDX-License-Identifier: MIT OR Apache-2.0
//! The proof artifact: a persisted, JSON record of a run that downstream
//! tooling (the guard) consults before trusting that a run was genuinely
//! agentic.

use chrono::Utc;
use engine_asleep::{EngagementFlags, EngagementMode};
use engine_config::ContractMode;
use engine_orchestrator::FrontierProof;
use engine_trace::{RuntimeMode, TraceEvent};
use std::path::Path;

use crate::CoreError;

/// Summary of frontier (depth-`max_depth - 1`) proofs observed during a run,
/// independently re-verified rather than merely copied from the orchestrator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrontierVerification {
    pub depth3_proof_verified: bool,
    pub depth3_proofs: Vec<FrontierProof>,
}

/// A persisted record of one run, written to `.engine/last-proof.json`
/// (or a configured override path) after every run, success or failure.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProofArtifact {
    pub ok: bool,
    pub contract_mode: ContractMode,
    pub runtime_mode: RuntimeMode,
    pub strict_mode: bool,
    pub force_sleep: bool,
    pub engagement: EngagementFlags,
    pub engagement_mode: EngagementMode,
    pub verification_ok: bool,
    pub verification: FrontierVerification,
    pub trace: Vec<TraceEvent>,
    /// Canonical freshness field the guard checks against; never the
    /// artifact file's mtime.
    pub timestamp_ms: i64,
    pub timestamp: String,
    /// A hash of the trace, so a guard can notice the proof artifact was
    /// edited independently of the trace it claims to describe.
    pub trace_marker: String,
}

impl ProofArtifact {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ok: bool,
        contract_mode: ContractMode,
        runtime_mode: RuntimeMode,
        strict_mode: bool,
        force_sleep: bool,
        engagement: EngagementFlags,
        engagement_mode: EngagementMode,
        verification_ok: bool,
        frontier_proofs: Vec<FrontierProof>,
        trace: Vec<TraceEvent>,
    ) -> Self {
        let now = Utc::now();
        let trace_marker = trace_marker(&trace);
        let depth3_proof_verified = !frontier_proofs.is_empty()
            && frontier_proofs.iter().all(FrontierProof::verify);
        Self {
            ok,
            contract_mode,
            runtime_mode,
            strict_mode,
            force_sleep,
            engagement,
            engagement_mode,
            verification_ok,
            verification: FrontierVerification {
                depth3_proof_verified,
                depth3_proofs: frontier_proofs,
            },
            trace,
            timestamp_ms: now.timestamp_millis(),
            timestamp: now.to_rfc3339(),
            trace_marker,
        }
    }
}

fn trace_marker(trace: &[TraceEvent]) -> String {
    serde_json::to_value(trace)
        .ok()
        .and_then(|v| engine_crypto::hash_value(&v).ok())
        .unwrap_or_else(|| "unhashable".to_string())
}

/// Write `bytes` to `path` atomically: write to a sibling temp file, then
/// rename over the final path, so a process cancelled mid-write never
/// leaves a partially-written proof artifact behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = sibling_tmp_path(path);
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn sibling_tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize and atomically persist a proof artifact.
pub fn write_proof_artifact(path: &Path, artifact: &ProofArtifact) -> Result<(), CoreError> {
    let bytes = serde_json::to_vec_pretty(artifact)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_produces_no_leftover_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last-proof.json");
        write_atomic(&path, b"{}").unwrap();
        assert!(path.exists());
        assert!(!sibling_tmp_path(&path).exists());
    }

    #[test]
    fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".engine").join("last-proof.json");
        write_atomic(&path, b"{}").unwrap();
        assert!(path.exists());
    }
}
