// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "The supervised recursion orchestrator: bounded, signed, gated subagent spawning."]
#![deny(unsafe_code)]

//! The heart of the engine. Every subagent call goes through
//! [`Orchestrator::supervised_spawn`], which enforces the depth and spawn
//! budgets, mints and registers a run, signs a `spawn` trace event, drives
//! the call through the quality gate with bounded retry, and signs a
//! `return` event once the registry agrees the run completed.

use engine_adapter::{AdapterError, SpawnAdapter, SpawnArgs};
use engine_crypto::Secret;
use engine_gate::{GateVerdict, quality_gate};
use engine_registry::RunRegistry;
use engine_trace::{NewEvent, RuntimeMode, SignedTrace, TraceEventKind};
use engine_worker::{HostMessage, WorkerMessage, run_task_to_completion, spawn_worker};
use std::sync::Arc;

/// Why a spawn was rejected before it ever reached the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReason {
    DepthLimit,
    SpawnLimit,
}

/// Hard failures from the orchestrator. These either abort the whole run
/// (strict-mode dispatch failure) or are recorded as a failed spawn
/// (budget/gate exhaustion) depending on call site.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("depth_limit")]
    DepthLimit,
    #[error("spawn_limit")]
    SpawnLimit,
    #[error("duplicate_run_id")]
    DuplicateRunId,
    #[error("unknown_run_id")]
    UnknownRunId,
    #[error("no_adapter_available_strict_mode")]
    NoAdapterStrict,
    #[error("quality_gate_failed_all_attempts")]
    QualityGateFailedAllAttempts,
}

impl From<engine_registry::RegistryError> for OrchestratorError {
    fn from(e: engine_registry::RegistryError) -> Self {
        match e {
            engine_registry::RegistryError::DuplicateRunId => OrchestratorError::DuplicateRunId,
            engine_registry::RegistryError::UnknownRunId => OrchestratorError::UnknownRunId,
        }
    }
}

/// The frontier proof recorded when a spawn lands at depth `max_depth - 1`:
/// a nonce plus a verifiable `sha256(nonce + ":" + run_id)`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrontierProof {
    pub run_id: String,
    pub nonce: String,
    pub hash_proof: String,
}

impl FrontierProof {
    fn compute(run_id: &str) -> Self {
        let nonce = engine_crypto::pseudo_random_hex(16);
        let hash_proof = engine_crypto::sha256_hex(format!("{nonce}:{run_id}").as_bytes());
        Self {
            run_id: run_id.to_string(),
            nonce,
            hash_proof,
        }
    }

    pub fn verify(&self) -> bool {
        engine_crypto::sha256_hex(format!("{}:{}", self.nonce, self.run_id).as_bytes())
            == self.hash_proof
    }
}

/// The result of one supervised spawn.
#[derive(Debug, Clone)]
pub struct SpawnReturn {
    pub run_id: String,
    pub output: serde_json::Value,
    pub ok: bool,
}

/// Result of running the canonical fan-out program.
#[derive(Debug, Clone)]
pub struct FanoutResult {
    pub depth1: SpawnReturn,
    pub depth2: Vec<SpawnReturn>,
    pub depth3: Vec<SpawnReturn>,
}

/// The orchestrator: owns the run registry, the signed trace, the
/// supervisor secret, and (optionally) a spawn adapter wired in by the
/// host. With no adapter and outside strict mode, every dispatch falls
/// back to a deterministic simulation so the engine's own invariants can
/// still be exercised without a live model backend.
pub struct Orchestrator {
    secret: Secret,
    registry: RunRegistry,
    trace: SignedTrace,
    adapter: Option<Arc<dyn SpawnAdapter>>,
    strict_mode: bool,
    use_worker: bool,
    max_depth: u32,
    max_spawns: u32,
    spawn_count: u32,
    frontier_proofs: Vec<FrontierProof>,
    runtime_mode: RuntimeMode,
}

impl Orchestrator {
    pub fn new(
        secret: Secret,
        max_depth: u32,
        max_spawns: u32,
        strict_mode: bool,
        adapter: Option<Arc<dyn SpawnAdapter>>,
        use_worker: bool,
    ) -> Self {
        let runtime_mode = if adapter.is_some() {
            RuntimeMode::Real
        } else {
            RuntimeMode::Simulated
        };
        Self {
            secret,
            registry: RunRegistry::new(),
            trace: SignedTrace::new(),
            adapter,
            strict_mode,
            use_worker,
            max_depth,
            max_spawns,
            spawn_count: 0,
            frontier_proofs: Vec::new(),
            runtime_mode,
        }
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn trace_snapshot(&self) -> Vec<engine_trace::TraceEvent> {
        self.trace.export()
    }

    pub fn frontier_proofs(&self) -> &[FrontierProof] {
        &self.frontier_proofs
    }

    pub fn runtime_mode(&self) -> RuntimeMode {
        self.runtime_mode
    }

    /// Record a trace event directly; used by the preflight stage to
    /// merge its own events ahead of the orchestrator's.
    pub fn record_event(&mut self, new_event: NewEvent) {
        self.trace.add_event(&self.secret, new_event);
    }

    fn check_depth_limit(&mut self, depth: u32) -> Result<(), OrchestratorError> {
        if depth >= self.max_depth {
            self.record_event(
                NewEvent::default()
                    .kind(TraceEventKind::Limit)
                    .depth(depth)
                    .note("depth_limit"),
            );
            tracing::warn!(target: "engine.orchestrator", depth, "depth limit reached");
            return Err(OrchestratorError::DepthLimit);
        }
        Ok(())
    }

    fn check_spawn_limit(&mut self) -> Result<(), OrchestratorError> {
        if self.spawn_count >= self.max_spawns {
            self.record_event(
                NewEvent::default()
                    .kind(TraceEventKind::Limit)
                    .note("spawn_limit"),
            );
            tracing::warn!(target: "engine.orchestrator", count = self.spawn_count, "spawn limit reached");
            return Err(OrchestratorError::SpawnLimit);
        }
        Ok(())
    }

    /// Dispatch one subagent call: adapter if present, otherwise a
    /// deterministic simulation. Strict mode with no adapter is a fatal
    /// error rather than a silent fallback.
    async fn dispatch(
        &mut self,
        agent_name: &str,
        run_id: &str,
        prompt: &str,
        input: serde_json::Value,
        depth: u32,
    ) -> Result<serde_json::Value, OrchestratorError> {
        if let Some(adapter) = self.adapter.clone() {
            if self.use_worker {
                return Ok(dispatch_via_worker(adapter, agent_name, run_id, prompt, input).await);
            }
            let outcome = adapter
                .spawn(SpawnArgs {
                    agent_name: agent_name.to_string(),
                    prompt: prompt.to_string(),
                    run_id: run_id.to_string(),
                    input,
                })
                .await;
            return match outcome {
                Ok(result) => Ok(result.output),
                Err(AdapterError::Other(reason)) => {
                    tracing::warn!(target: "engine.orchestrator", %reason, "adapter call failed");
                    Ok(serde_json::json!({"summary": "adapter_error", "reason": reason}))
                }
            };
        }

        if self.strict_mode {
            return Err(OrchestratorError::NoAdapterStrict);
        }

        self.record_event(
            NewEvent::default()
                .kind(TraceEventKind::SimulationWarning)
                .depth(depth)
                .agent_name(agent_name)
                .note("no spawn adapter available; using deterministic simulation"),
        );
        Ok(simulate_output(agent_name, run_id, depth, &input))
    }

    /// Run a single supervised spawn: budget checks, mint+register, a
    /// signed `spawn` event, dispatch through the quality gate with
    /// bounded retry, then a signed `return` event.
    pub async fn supervised_spawn(
        &mut self,
        parent_run_id: Option<&str>,
        agent_name: &str,
        depth: u32,
        prompt: &str,
        mut input: serde_json::Value,
    ) -> Result<SpawnReturn, OrchestratorError> {
        self.check_spawn_limit()?;
        self.check_depth_limit(depth)?;

        let run_id = self.registry.mint_run_id(agent_name);

        let at_frontier = depth == self.max_depth.saturating_sub(1);
        let nonce = if at_frontier {
            let nonce = engine_crypto::pseudo_random_hex(16);
            if let serde_json::Value::Object(map) = &mut input {
                map.insert(
                    "_frontier_nonce".to_string(),
                    serde_json::Value::String(nonce.clone()),
                );
                map.insert(
                    "run_id".to_string(),
                    serde_json::Value::String(run_id.clone()),
                );
            }
            Some(nonce)
        } else {
            None
        };

        let input_hash =
            engine_crypto::hash_value(&input).unwrap_or_else(|_| "unhashable".to_string());

        self.registry.register_spawn(
            run_id.clone(),
            parent_run_id.map(str::to_string),
            agent_name,
            depth,
            input_hash.clone(),
            nonce.clone(),
        )?;
        self.spawn_count += 1;

        let mut spawn_event = NewEvent::default()
            .kind(TraceEventKind::Spawn)
            .depth(depth)
            .agent_name(agent_name)
            .child_run_id(run_id.clone())
            .input_hash(input_hash);
        if let Some(parent) = parent_run_id {
            spawn_event = spawn_event.parent_run_id(parent);
        }
        self.record_event(spawn_event);

        // `run_with_retry`'s attempt closure can't hold a mutable borrow of
        // `self` across `.await` (dispatch needs `&mut self`), so the gate
        // loop is driven explicitly here instead of through its generic form.
        let mut attempts = 0u32;
        let max_attempts = 3u32;
        let mut last_output = serde_json::json!({});
        let mut passed = false;
        let mut current_prompt = prompt.to_string();

        while attempts < max_attempts {
            attempts += 1;
            let output = self
                .dispatch(agent_name, &run_id, &current_prompt, input.clone(), depth)
                .await?;

            let verdict = if at_frontier {
                gate_with_frontier(&output, nonce.as_deref(), &run_id)
            } else {
                quality_gate(&output, &[], 0)
            };

            last_output = output;
            if verdict.is_pass() {
                passed = true;
                self.record_event(
                    NewEvent::default()
                        .kind(TraceEventKind::QualityGatePass)
                        .depth(depth)
                        .agent_name(agent_name)
                        .child_run_id(run_id.clone()),
                );
                break;
            } else if attempts < max_attempts {
                current_prompt = format!("{current_prompt}\n\nBe more specific and show your work.");
            }
        }

        if !passed {
            self.record_event(
                NewEvent::default()
                    .kind(TraceEventKind::QualityGateFail)
                    .depth(depth)
                    .agent_name(agent_name)
                    .child_run_id(run_id.clone())
                    .note("quality_gate_failed_all_attempts"),
            );
            return Err(OrchestratorError::QualityGateFailedAllAttempts);
        }

        if at_frontier {
            if let Some(nonce) = &nonce {
                self.frontier_proofs.push(FrontierProof {
                    run_id: run_id.clone(),
                    nonce: nonce.clone(),
                    hash_proof: engine_crypto::sha256_hex(format!("{nonce}:{run_id}").as_bytes()),
                });
            }
        }

        let output_hash =
            engine_crypto::hash_value(&last_output).unwrap_or_else(|_| "unhashable".to_string());
        self.registry.register_return(&run_id, output_hash.clone())?;
        self.record_event(
            NewEvent::default()
                .kind(TraceEventKind::Return)
                .depth(depth)
                .agent_name(agent_name)
                .child_run_id(run_id.clone())
                .output_hash(output_hash),
        );

        Ok(SpawnReturn {
            run_id,
            output: last_output,
            ok: true,
        })
    }

    /// Run the canonical fan-out program: one depth-1 orchestrator spawn,
    /// two depth-2 worker spawns under it, one depth-3 micro (frontier)
    /// spawn under each worker, then a merge event. Exactly five spawns.
    pub async fn run_fanout_program(
        &mut self,
        root_prompt: &str,
        root_input: serde_json::Value,
    ) -> Result<FanoutResult, OrchestratorError> {
        self.record_event(
            NewEvent::default()
                .kind(TraceEventKind::PlanCreated)
                .note("fanout_plan_created"),
        );

        let depth1 = self
            .supervised_spawn(None, "depth1_orchestrator", 1, root_prompt, root_input)
            .await?;

        let mut depth2_runs = Vec::new();
        let mut depth3_runs = Vec::new();

        for i in 0..2 {
            let depth2 = self
                .supervised_spawn(
                    Some(&depth1.run_id),
                    "depth2_worker",
                    2,
                    &format!("analyze partition {i}"),
                    serde_json::json!({"partition": i}),
                )
                .await?;

            let depth3 = self
                .supervised_spawn(
                    Some(&depth2.run_id),
                    "depth3_micro",
                    3,
                    "produce frontier proof",
                    serde_json::json!({}),
                )
                .await?;

            depth3_runs.push(depth3);
            depth2_runs.push(depth2);
        }

        self.record_event(
            NewEvent::default()
                .kind(TraceEventKind::Merge)
                .depth(2)
                .note("merged_depth2_depth3_results"),
        );

        Ok(FanoutResult {
            depth1,
            depth2: depth2_runs,
            depth3: depth3_runs,
        })
    }
}

/// Run a single subagent call through worker isolation: a one-shot worker
/// task owns the adapter call, the host drives it to completion over
/// `engine_worker`'s message channels rather than awaiting the adapter
/// directly. A worker failure (cancellation, channel closure) is reported
/// as a failed spawn rather than propagated, matching the adapter-error
/// path above.
async fn dispatch_via_worker(
    adapter: Arc<dyn SpawnAdapter>,
    agent_name: &str,
    run_id: &str,
    prompt: &str,
    input: serde_json::Value,
) -> serde_json::Value {
    let run_id = run_id.to_string();
    let mut handle = spawn_worker(move |mut inbox, outbox| async move {
        while let Some(msg) = inbox.recv().await {
            if let HostMessage::RunTask {
                correlation_id,
                agent_name,
                prompt,
                input,
            } = msg
            {
                let outcome = adapter
                    .spawn(SpawnArgs {
                        agent_name,
                        prompt,
                        run_id: run_id.clone(),
                        input,
                    })
                    .await;
                let response = match outcome {
                    Ok(result) => WorkerMessage::Done {
                        correlation_id,
                        output: result.output,
                    },
                    Err(AdapterError::Other(reason)) => WorkerMessage::Fail {
                        correlation_id,
                        reason,
                    },
                };
                if outbox.send(response).await.is_err() {
                    return;
                }
            }
        }
    });

    match run_task_to_completion(&mut handle, 0, agent_name, prompt, input, |_, _, _| {
        serde_json::json!({})
    })
    .await
    {
        Ok(output) => output,
        Err(_) => {
            tracing::warn!(target: "engine.orchestrator", "worker reported failure");
            serde_json::json!({"summary": "adapter_error", "reason": "worker_error"})
        }
    }
}

fn gate_with_frontier(
    output: &serde_json::Value,
    nonce: Option<&str>,
    run_id: &str,
) -> GateVerdict {
    let Some(nonce) = nonce else {
        return quality_gate(output, &[], 0);
    };
    let expected = engine_crypto::sha256_hex(format!("{nonce}:{run_id}").as_bytes());
    match output.get("hash_proof").and_then(|v| v.as_str()) {
        Some(actual) if actual == expected => quality_gate(output, &["hash_proof"], 0),
        _ => GateVerdict::Fail {
            reasons: vec!["frontier_hash_proof_mismatch".to_string()],
        },
    }
}

/// Deterministic per-depth simulation used when no spawn adapter is wired
/// in and strict mode is not set.
fn simulate_output(
    agent_name: &str,
    run_id: &str,
    depth: u32,
    input: &serde_json::Value,
) -> serde_json::Value {
    match depth {
        1 => serde_json::json!({
            "summary": "depth1_orchestrator plan",
            "spawn_requests": [
                {"agent_name": "depth2_worker", "partition": 0},
                {"agent_name": "depth2_worker", "partition": 1},
            ],
            "plan_steps": 2,
        }),
        2 => serde_json::json!({
            "summary": "depth2_worker analysis",
            "metric": 42,
            "computation": "contrast_analysis",
            "spawn_request": {"agent_name": "depth3_micro"},
        }),
        3 => {
            let nonce = input
                .get("_frontier_nonce")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let hash_proof = engine_crypto::sha256_hex(format!("{nonce}:{run_id}").as_bytes());
            serde_json::json!({
                "summary": "depth3_micro frontier proof",
                "hash_proof": hash_proof,
                "metric": 1,
            })
        }
        _ => serde_json::json!({"summary": "simulated", "metric": 0}),
    }
}
