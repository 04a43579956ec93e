// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "An append-only, HMAC-signed trace of everything the orchestrator does."]
#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use engine_crypto::{Secret, sign_event};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// The kind of event recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    Spawn,
    Return,
    Merge,
    Limit,
    PreflightOk,
    PlanCreated,
    QualityGatePass,
    QualityGateFail,
    ToolMissingStrict,
    SimulationWarning,
}

/// Whether subagent calls in a run actually happened against a real
/// adapter/host capability, or were simulated because none was available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    Real,
    Simulated,
}

/// A single signed entry in the trace.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TraceEvent {
    pub event_id: u64,
    pub ts: DateTime<Utc>,
    pub kind: TraceEventKind,
    pub depth: u32,
    pub agent_name: Option<String>,
    pub parent_run_id: Option<String>,
    pub child_run_id: Option<String>,
    pub input_hash: Option<String>,
    pub output_hash: Option<String>,
    pub note: Option<String>,
    pub supervisor_sig: String,
}

impl TraceEvent {
    /// The event's payload with `supervisor_sig` nulled, the exact bytes
    /// that were (or should be) signed.
    fn signable_payload(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).expect("TraceEvent always serializes");
        if let serde_json::Value::Object(map) = &mut v {
            map.insert("supervisor_sig".to_string(), serde_json::Value::Null);
        }
        v
    }

    /// Recompute this event's signature against `secret` and compare it to
    /// the stored `supervisor_sig`.
    pub fn verify_signature(&self, secret: &Secret) -> bool {
        engine_crypto::verify_event_sig(secret, &self.signable_payload(), &self.supervisor_sig)
    }
}

/// Parameters for appending a new event, grouped since `add_event` otherwise
/// takes an unwieldy number of positional arguments.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub kind: Option<TraceEventKind>,
    pub depth: u32,
    pub agent_name: Option<String>,
    pub parent_run_id: Option<String>,
    pub child_run_id: Option<String>,
    pub input_hash: Option<String>,
    pub output_hash: Option<String>,
    pub note: Option<String>,
}

impl NewEvent {
    pub fn kind(mut self, kind: TraceEventKind) -> Self {
        self.kind = Some(kind);
        self
    }
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }
    pub fn parent_run_id(mut self, id: impl Into<String>) -> Self {
        self.parent_run_id = Some(id.into());
        self
    }
    pub fn child_run_id(mut self, id: impl Into<String>) -> Self {
        self.child_run_id = Some(id.into());
        self
    }
    pub fn input_hash(mut self, hash: impl Into<String>) -> Self {
        self.input_hash = Some(hash.into());
        self
    }
    pub fn output_hash(mut self, hash: impl Into<String>) -> Self {
        self.output_hash = Some(hash.into());
        self
    }
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Aggregate statistics over a trace.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceStats {
    pub counts_by_kind: BTreeMap<TraceEventKind, usize>,
    pub deepest_depth: u32,
}

/// The append-only, HMAC-signed trace. Event IDs are assigned from a
/// monotonic counter so the trace is totally ordered by construction.
#[derive(Debug)]
pub struct SignedTrace {
    events: Vec<TraceEvent>,
    seq: AtomicU64,
}

impl Default for SignedTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl SignedTrace {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Append a new, signed event and return a clone of it.
    pub fn add_event(&mut self, secret: &Secret, new_event: NewEvent) -> TraceEvent {
        let event_id = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let kind = new_event
            .kind
            .expect("NewEvent::kind must be set before add_event");
        let mut event = TraceEvent {
            event_id,
            ts: Utc::now(),
            kind,
            depth: new_event.depth,
            agent_name: new_event.agent_name,
            parent_run_id: new_event.parent_run_id,
            child_run_id: new_event.child_run_id,
            input_hash: new_event.input_hash,
            output_hash: new_event.output_hash,
            note: new_event.note,
            supervisor_sig: String::new(),
        };
        let sig = sign_event(secret, &event.signable_payload())
            .expect("trace event payloads are always canonicalizable");
        event.supervisor_sig = sig;
        tracing::debug!(
            target: "engine.trace",
            event_id,
            kind = ?event.kind,
            depth = event.depth,
            "trace event recorded"
        );
        self.events.push(event.clone());
        event
    }

    /// A defensive copy of the full trace in append order.
    pub fn export(&self) -> Vec<TraceEvent> {
        self.events.clone()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn stats(&self) -> TraceStats {
        let mut counts_by_kind: BTreeMap<TraceEventKind, usize> = BTreeMap::new();
        let mut deepest_depth = 0;
        for event in &self.events {
            *counts_by_kind.entry(event.kind).or_insert(0) += 1;
            deepest_depth = deepest_depth.max(event.depth);
        }
        TraceStats {
            counts_by_kind,
            deepest_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> Secret {
        Secret::from_bytes(vec![3u8; 32]).unwrap()
    }

    #[test]
    fn event_ids_are_monotonic() {
        let secret = secret();
        let mut trace = SignedTrace::new();
        let e1 = trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Spawn));
        let e2 = trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Return));
        assert_eq!(e1.event_id, 1);
        assert_eq!(e2.event_id, 2);
    }

    #[test]
    fn signature_verifies() {
        let secret = secret();
        let mut trace = SignedTrace::new();
        let event = trace.add_event(
            &secret,
            NewEvent::default()
                .kind(TraceEventKind::Spawn)
                .depth(1)
                .agent_name("worker"),
        );
        assert!(event.verify_signature(&secret));
    }

    #[test]
    fn tampered_event_fails_verification() {
        let secret = secret();
        let mut trace = SignedTrace::new();
        let mut event = trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Spawn));
        event.depth = 99;
        assert!(!event.verify_signature(&secret));
    }

    #[test]
    fn export_is_a_defensive_copy() {
        let secret = secret();
        let mut trace = SignedTrace::new();
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Spawn));
        let mut exported = trace.export();
        exported.clear();
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn stats_count_kinds_and_deepest_depth() {
        let secret = secret();
        let mut trace = SignedTrace::new();
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Spawn).depth(1));
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Spawn).depth(3));
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Return).depth(3));
        let stats = trace.stats();
        assert_eq!(stats.counts_by_kind[&TraceEventKind::Spawn], 2);
        assert_eq!(stats.counts_by_kind[&TraceEventKind::Return], 1);
        assert_eq!(stats.deepest_depth, 3);
    }
}
