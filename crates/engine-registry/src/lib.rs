// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "In-memory registry of spawned subagent runs."]
#![deny(unsafe_code)]

//! Tracks every run that has been spawned and, eventually, returned. The
//! orchestrator consults this registry to enforce the single-owner and
//! run-uniqueness invariants, and the trace validator consults it to check
//! that a trace's `return` events match what actually happened.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a registered run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run has been spawned but has not yet returned.
    Spawned,
    /// The run completed and returned a result.
    Returned,
}

/// A single tracked run, from spawn through (eventually) return.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub parent_run_id: Option<String>,
    pub agent_name: String,
    pub depth: u32,
    pub input_hash: String,
    pub output_hash: Option<String>,
    pub nonce: Option<String>,
    pub status: RunStatus,
    pub spawned_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// Aggregate counts over the registry's current contents.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub spawned: usize,
    pub returned: usize,
    pub deepest_depth: u32,
}

/// Errors raised by registry mutation.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate_run_id")]
    DuplicateRunId,
    #[error("unknown_run_id")]
    UnknownRunId,
}

/// The run registry. Not `Send`/`Sync` on its own; the orchestrator wraps
/// it in a `tokio::sync::Mutex` when shared across suspension points.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: HashMap<String, RunRecord>,
    mint_seq: AtomicU64,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh run ID of the form `"{agent_name}_{ts_millis}_{8 hex chars}"`.
    ///
    /// The 8 hex characters are derived from a process-local monotonic
    /// counter mixed with the wall clock, not a cryptographic RNG: run IDs
    /// need to be unique, not unpredictable, and uniqueness here is load
    /// bearing (see [`Self::register_spawn`]'s `duplicate_run_id` check),
    /// unpredictability is not.
    pub fn mint_run_id(&self, agent_name: &str) -> String {
        let ts_millis = Utc::now().timestamp_millis();
        let seq = self.mint_seq.fetch_add(1, Ordering::SeqCst);
        let mixed = (ts_millis as u64) ^ seq.wrapping_mul(0x9E37_79B9);
        format!("{agent_name}_{ts_millis}_{:08x}", mixed as u32)
    }

    /// Register a newly spawned run. Fails with `DuplicateRunId` if the
    /// run ID is already present, regardless of its status.
    pub fn register_spawn(
        &mut self,
        run_id: impl Into<String>,
        parent_run_id: Option<String>,
        agent_name: impl Into<String>,
        depth: u32,
        input_hash: impl Into<String>,
        nonce: Option<String>,
    ) -> Result<(), RegistryError> {
        let run_id = run_id.into();
        if self.runs.contains_key(&run_id) {
            return Err(RegistryError::DuplicateRunId);
        }
        tracing::debug!(target: "engine.registry", %run_id, depth, "spawn registered");
        self.runs.insert(
            run_id.clone(),
            RunRecord {
                run_id,
                parent_run_id,
                agent_name: agent_name.into(),
                depth,
                input_hash: input_hash.into(),
                output_hash: None,
                nonce,
                status: RunStatus::Spawned,
                spawned_at: Utc::now(),
                returned_at: None,
            },
        );
        Ok(())
    }

    /// Mark a run as returned with the given output hash. Fails with
    /// `UnknownRunId` if the run was never spawned.
    pub fn register_return(
        &mut self,
        run_id: &str,
        output_hash: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let record = self
            .runs
            .get_mut(run_id)
            .ok_or(RegistryError::UnknownRunId)?;
        record.output_hash = Some(output_hash.into());
        record.status = RunStatus::Returned;
        record.returned_at = Some(Utc::now());
        tracing::debug!(target: "engine.registry", %run_id, "return registered");
        Ok(())
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.runs.contains_key(run_id)
    }

    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    pub fn get_all_runs(&self) -> Vec<&RunRecord> {
        self.runs.values().collect()
    }

    pub fn get_stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.runs.len(),
            ..Default::default()
        };
        for run in self.runs.values() {
            match run.status {
                RunStatus::Spawned => stats.spawned += 1,
                RunStatus::Returned => stats.returned += 1,
            }
            stats.deepest_depth = stats.deepest_depth.max(run.depth);
        }
        stats
    }
}
