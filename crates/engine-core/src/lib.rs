// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "The single entrypoint: preflight, the supervised fan-out program, and the proof artifact."]
#![deny(unsafe_code)]

mod guard;
mod preflight;
mod proof;
mod task;

pub use guard::{check_guard, check_guard_now};
pub use preflight::{AlwaysCapable, CapabilityProbe, NoCapability, resolve_strict_mode};
pub use proof::{ProofArtifact, write_atomic, write_proof_artifact};
pub use task::Task;

pub use engine_config::{
    CONFIG_FILE_RELATIVE_PATH, Configuration, ContractMode, PROOF_ARTIFACT_RELATIVE_PATH,
    load_config,
};

use engine_adapter::SpawnAdapter;
pub use engine_asleep::EngagementMode;
use engine_asleep::{EngagementFlags, classify};
use engine_crypto::Secret;
use engine_orchestrator::{Orchestrator, OrchestratorError};
use engine_trace::{RuntimeMode, TraceEvent};
use engine_validator::validate_trace;
use std::sync::Arc;

/// Errors the engine's entrypoint can fail with, independent of whatever
/// `reason` string ends up in [`EngineResult`].
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("tool_missing_strict")]
    ToolMissingStrict,
    #[error("invalid_supervisor_secret: {0}")]
    InvalidSecret(#[from] engine_crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The result of a run, independent of the process exit code the CLI
/// derives from it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineResult {
    pub ok: bool,
    pub reason: Option<String>,
    pub engagement: EngagementMode,
    pub trace: Vec<TraceEvent>,
    pub result: Option<serde_json::Value>,
    pub contract_mode: ContractMode,
    pub runtime_mode: RuntimeMode,
}

/// Run a task through preflight, the supervised fan-out program, engagement
/// detection, and proof artifact persistence. This is the only entrypoint
/// callers should use; nothing else in this workspace touches the
/// registry, trace, or proof artifact directly.
pub async fn run(
    task: Task,
    config: Configuration,
    probe: &dyn CapabilityProbe,
    adapter: Option<Arc<dyn SpawnAdapter>>,
) -> Result<EngineResult, CoreError> {
    let (secret, ephemeral_secret) = Secret::load()?;
    if ephemeral_secret {
        tracing::warn!(
            target: "engine.core",
            "running with an ephemeral supervisor secret; set SUPERVISOR_SECRET to persist trust across processes"
        );
    }

    let capable = probe.probe();
    let strict_mode = resolve_strict_mode(config.strict_mode, capable);
    let mut orch = Orchestrator::new(
        secret.clone(),
        config.max_depth,
        config.max_spawns,
        strict_mode,
        adapter,
        config.use_worker,
    );

    if let Err(e) = preflight::preflight(&mut orch, capable, strict_mode) {
        return Ok(finish(&config, &mut orch, &secret, false, Some(e.to_string()), None, strict_mode)?);
    }

    if config.force_sleep {
        tracing::warn!(target: "engine.core", "force_sleep configured; refusing to claim agentic engagement");
        return Ok(finish(
            &config,
            &mut orch,
            &secret,
            false,
            Some("forced_sleep".to_string()),
            None,
            strict_mode,
        )?);
    }

    match orch.run_fanout_program(&task.name, task.input.clone()).await {
        Ok(fanout) => {
            let result = serde_json::json!({
                "depth1": {"run_id": fanout.depth1.run_id, "output": fanout.depth1.output},
                "depth2": fanout.depth2.iter().map(|r| serde_json::json!({"run_id": r.run_id, "output": r.output})).collect::<Vec<_>>(),
                "depth3": fanout.depth3.iter().map(|r| serde_json::json!({"run_id": r.run_id, "output": r.output})).collect::<Vec<_>>(),
            });
            Ok(finish(&config, &mut orch, &secret, true, None, Some(result), strict_mode)?)
        }
        Err(e) => {
            let reason = orchestrator_error_reason(&e);
            Ok(finish(&config, &mut orch, &secret, false, Some(reason), None, strict_mode)?)
        }
    }
}

fn orchestrator_error_reason(e: &OrchestratorError) -> String {
    e.to_string()
}

fn finish(
    config: &Configuration,
    orch: &mut Orchestrator,
    secret: &Secret,
    ok: bool,
    reason: Option<String>,
    result: Option<serde_json::Value>,
    strict_mode: bool,
) -> Result<EngineResult, CoreError> {
    let trace = orch.trace_snapshot();
    let validation = validate_trace(&trace, orch.registry(), secret);
    let flags = EngagementFlags::from_trace(&trace);
    let runtime_mode = orch.runtime_mode();
    let engagement = if config.force_sleep {
        EngagementMode::Asleep
    } else {
        classify(&flags, validation.ok, runtime_mode, &trace)
    };
    let overall_ok = ok && validation.ok && !config.force_sleep;
    let frontier_proofs = orch.frontier_proofs().to_vec();

    let artifact = ProofArtifact::new(
        overall_ok,
        config.contract_mode(strict_mode),
        runtime_mode,
        strict_mode,
        config.force_sleep,
        flags,
        engagement,
        validation.ok,
        frontier_proofs,
        trace.clone(),
    );
    write_proof_artifact(&config.proof_path(), &artifact)?;

    Ok(EngineResult {
        ok: overall_ok,
        reason: if overall_ok { None } else { reason.or(Some("validation_failed".to_string())) },
        engagement,
        trace,
        result,
        contract_mode: config.contract_mode(strict_mode),
        runtime_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nominal_simulated_run_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Configuration::default();
        config.proof_path = Some(dir.path().join("last-proof.json"));

        let result = run(Task::new("demo", serde_json::json!({})), config, &NoCapability, None)
            .await
            .unwrap();

        assert!(result.ok, "{:?}", result.reason);
        assert_eq!(result.runtime_mode, RuntimeMode::Simulated);
        assert!(dir.path().join("last-proof.json").exists());
    }

    #[tokio::test]
    async fn strict_mode_without_capability_fails_with_tool_missing_strict() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Configuration::default();
        config.proof_path = Some(dir.path().join("last-proof.json"));
        config.strict_mode = Some(true);

        let result = run(Task::new("demo", serde_json::json!({})), config, &NoCapability, None)
            .await
            .unwrap();

        assert!(!result.ok);
        assert_eq!(result.reason.as_deref(), Some("tool_missing_strict"));
    }

    #[tokio::test]
    async fn force_sleep_always_reports_asleep() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Configuration::default();
        config.proof_path = Some(dir.path().join("last-proof.json"));
        config.force_sleep = true;

        let result = run(Task::new("demo", serde_json::json!({})), config, &NoCapability, None)
            .await
            .unwrap();

        assert!(!result.ok);
        assert_eq!(result.engagement, EngagementMode::Asleep);
        assert_eq!(result.reason.as_deref(), Some("forced_sleep"));
    }

    #[tokio::test]
    async fn budget_enforcement_reports_limit_reason() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Configuration::default();
        config.proof_path = Some(dir.path().join("last-proof.json"));
        config.max_spawns = 1;

        let result = run(Task::new("demo", serde_json::json!({})), config, &NoCapability, None)
            .await
            .unwrap();

        assert!(!result.ok);
        assert_eq!(result.reason.as_deref(), Some("spawn_limit"));
    }
}
