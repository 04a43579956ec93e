// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Classifies a run's trace as agentic, merely local, or asleep."]
#![deny(unsafe_code)]

use engine_trace::{TraceEvent, TraceEventKind};
pub use engine_trace::RuntimeMode;

/// Which engagement markers were observed in a trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EngagementFlags {
    pub has_preflight_ok: bool,
    pub has_plan_created: bool,
    pub has_proof_verified: bool,
    pub has_spawn_or_request: bool,
    pub has_quality_gate_pass: bool,
}

impl EngagementFlags {
    /// Scan a trace and set every flag that trace demonstrates.
    ///
    /// `has_proof_verified` is a marker the orchestrator records as `note`
    /// text on an existing event kind rather than a dedicated trace event
    /// kind of its own, so this scan recognizes it by `note` rather than
    /// `kind`.
    pub fn from_trace(trace: &[TraceEvent]) -> Self {
        let mut flags = EngagementFlags::default();
        for event in trace {
            match event.kind {
                TraceEventKind::PreflightOk => flags.has_preflight_ok = true,
                TraceEventKind::PlanCreated => flags.has_plan_created = true,
                TraceEventKind::Spawn => flags.has_spawn_or_request = true,
                TraceEventKind::QualityGatePass => flags.has_quality_gate_pass = true,
                _ => {}
            }
            if event
                .note
                .as_deref()
                .is_some_and(|n| n.contains("proof_verified"))
            {
                flags.has_proof_verified = true;
            }
        }
        flags
    }
}

/// The engagement classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementMode {
    /// Every agentic marker is present and verification succeeded against
    /// a real runtime.
    Agentic,
    /// The trace shows some genuine work but does not meet the full
    /// agentic bar.
    Local,
    /// Neither bar is met: the run produced an empty or inert trace.
    Asleep,
}

/// Classify a run from its engagement flags, trace verification result,
/// runtime mode, and whether the trace is non-empty.
///
/// - **Agentic** requires all of: preflight_ok, plan_created,
///   spawn_or_request, verification_ok, and `runtime_mode == Real`.
/// - **Local** requires a non-empty trace and at least one of: spawn,
///   merge, return, or quality_gate_pass.
/// - Anything else is **Asleep**.
pub fn classify(
    flags: &EngagementFlags,
    verification_ok: bool,
    runtime_mode: RuntimeMode,
    trace: &[TraceEvent],
) -> EngagementMode {
    if flags.has_preflight_ok
        && flags.has_plan_created
        && flags.has_spawn_or_request
        && verification_ok
        && runtime_mode == RuntimeMode::Real
    {
        return EngagementMode::Agentic;
    }

    let has_local_marker = trace.iter().any(|e| {
        matches!(
            e.kind,
            TraceEventKind::Spawn
                | TraceEventKind::Merge
                | TraceEventKind::Return
                | TraceEventKind::QualityGatePass
        )
    });
    if !trace.is_empty() && has_local_marker {
        return EngagementMode::Local;
    }

    EngagementMode::Asleep
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_crypto::Secret;
    use engine_trace::{NewEvent, SignedTrace};

    fn secret() -> Secret {
        Secret::from_bytes(vec![1u8; 32]).unwrap()
    }

    #[test]
    fn empty_trace_is_asleep() {
        let flags = EngagementFlags::default();
        let mode = classify(&flags, false, RuntimeMode::Simulated, &[]);
        assert_eq!(mode, EngagementMode::Asleep);
    }

    #[test]
    fn spawn_only_trace_is_local() {
        let secret = secret();
        let mut trace = SignedTrace::new();
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Spawn));
        let events = trace.export();
        let flags = EngagementFlags::from_trace(&events);
        let mode = classify(&flags, false, RuntimeMode::Simulated, &events);
        assert_eq!(mode, EngagementMode::Local);
    }

    #[test]
    fn full_flags_with_real_runtime_is_agentic() {
        let secret = secret();
        let mut trace = SignedTrace::new();
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::PreflightOk));
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::PlanCreated));
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Spawn));
        let events = trace.export();
        let flags = EngagementFlags::from_trace(&events);
        let mode = classify(&flags, true, RuntimeMode::Real, &events);
        assert_eq!(mode, EngagementMode::Agentic);
    }

    #[test]
    fn full_flags_but_simulated_runtime_is_not_agentic() {
        let secret = secret();
        let mut trace = SignedTrace::new();
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::PreflightOk));
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::PlanCreated));
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::Spawn));
        let events = trace.export();
        let flags = EngagementFlags::from_trace(&events);
        let mode = classify(&flags, true, RuntimeMode::Simulated, &events);
        assert_ne!(mode, EngagementMode::Agentic);
        assert_eq!(mode, EngagementMode::Local);
    }
}
