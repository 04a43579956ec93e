// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "The single seam between the orchestrator and whatever actually runs a subagent."]
#![deny(unsafe_code)]

//! `SpawnAdapter` is the only contract a host needs to satisfy to plug a
//! real subagent backend into the orchestrator. No concrete adapter ships
//! here; this crate is the interface only, matching the host-specific
//! model adapters named as out of scope.

use async_trait::async_trait;

/// Arguments passed to a spawn adapter for a single subagent invocation.
#[derive(Debug, Clone)]
pub struct SpawnArgs {
    pub agent_name: String,
    pub prompt: String,
    pub run_id: String,
    pub input: serde_json::Value,
}

/// What a spawn adapter hands back on success.
#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub run_id: String,
    pub output: serde_json::Value,
}

/// Errors a spawn adapter may report. Anything else should be surfaced as
/// `AdapterError::Other` rather than panicking; the orchestrator treats an
/// adapter error as a failed spawn, not a process-ending fault.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("spawn adapter reported: {0}")]
    Other(String),
}

/// Implemented by hosts that want to hand real subagent execution to the
/// orchestrator. A call must be idempotent with respect to the engine's
/// own state: the adapter may call out to the world however it likes, but
/// it must not mutate the registry, trace, or proof artifact directly;
/// only the orchestrator does that, using the adapter's return value.
#[async_trait]
pub trait SpawnAdapter: Send + Sync {
    async fn spawn(&self, args: SpawnArgs) -> Result<SpawnOutcome, AdapterError>;
}
