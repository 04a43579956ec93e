// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Re-verifies a signed trace against the run registry and the supervisor secret."]
#![deny(unsafe_code)]

use engine_crypto::Secret;
use engine_registry::{RunRegistry, RunStatus};
use engine_trace::{TraceEvent, TraceEventKind};

/// Why a single event failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    BadSignature,
    ChildRunMissingInRegistry,
    OutputHashMismatch,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::BadSignature => "bad_signature",
            FailureReason::ChildRunMissingInRegistry => "child_run_missing_in_registry",
            FailureReason::OutputHashMismatch => "output_hash_mismatch",
        }
    }
}

/// A single validation failure, tied to the event that triggered it.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub event_id: u64,
    pub reason: FailureReason,
}

/// The outcome of validating a full trace.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub ok: bool,
    pub failures: Vec<ValidationFailure>,
}

/// Re-verify every event in `trace`:
///
/// - its signature must recompute correctly against `secret`
/// - if it carries a `child_run_id`, that run must exist in `registry`
/// - if it is a `return` event, its `output_hash` must match the
///   registry's recorded output hash for that run
pub fn validate_trace(
    trace: &[TraceEvent],
    registry: &RunRegistry,
    secret: &Secret,
) -> ValidationReport {
    let mut failures = Vec::new();

    for event in trace {
        if !event.verify_signature(secret) {
            failures.push(ValidationFailure {
                event_id: event.event_id,
                reason: FailureReason::BadSignature,
            });
            continue;
        }

        if let Some(child_run_id) = &event.child_run_id {
            match registry.get_run(child_run_id) {
                None => {
                    failures.push(ValidationFailure {
                        event_id: event.event_id,
                        reason: FailureReason::ChildRunMissingInRegistry,
                    });
                    continue;
                }
                Some(record) => {
                    if event.kind == TraceEventKind::Return {
                        if record.status != RunStatus::Returned
                            || event.output_hash != record.output_hash
                        {
                            failures.push(ValidationFailure {
                                event_id: event.event_id,
                                reason: FailureReason::OutputHashMismatch,
                            });
                        }
                    }
                }
            }
        }
    }

    let ok = failures.is_empty();
    if !ok {
        tracing::warn!(target: "engine.validator", failures = failures.len(), "trace validation failed");
    }
    ValidationReport { ok, failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_trace::{NewEvent, SignedTrace};

    fn secret() -> Secret {
        Secret::from_bytes(vec![5u8; 32]).unwrap()
    }

    #[test]
    fn clean_trace_validates() {
        let secret = secret();
        let mut registry = RunRegistry::new();
        let mut trace = SignedTrace::new();

        registry
            .register_spawn("child_1", Some("root".into()), "worker", 1, "in", None)
            .unwrap();
        trace.add_event(
            &secret,
            NewEvent::default()
                .kind(TraceEventKind::Spawn)
                .child_run_id("child_1")
                .input_hash("in"),
        );
        registry.register_return("child_1", "out").unwrap();
        trace.add_event(
            &secret,
            NewEvent::default()
                .kind(TraceEventKind::Return)
                .child_run_id("child_1")
                .output_hash("out"),
        );

        let report = validate_trace(&trace.export(), &registry, &secret);
        assert!(report.ok, "{:?}", report.failures);
    }

    #[test]
    fn tampered_signature_is_caught() {
        let secret = secret();
        let registry = RunRegistry::new();
        let mut trace = SignedTrace::new();
        trace.add_event(&secret, NewEvent::default().kind(TraceEventKind::PreflightOk));
        let mut events = trace.export();
        events[0].depth = 7;

        let report = validate_trace(&events, &registry, &secret);
        assert!(!report.ok);
        assert_eq!(report.failures[0].reason, FailureReason::BadSignature);
    }

    #[test]
    fn missing_child_run_is_caught() {
        let secret = secret();
        let registry = RunRegistry::new();
        let mut trace = SignedTrace::new();
        trace.add_event(
            &secret,
            NewEvent::default()
                .kind(TraceEventKind::Spawn)
                .child_run_id("ghost"),
        );

        let report = validate_trace(&trace.export(), &registry, &secret);
        assert!(!report.ok);
        assert_eq!(
            report.failures[0].reason,
            FailureReason::ChildRunMissingInRegistry
        );
    }

    #[test]
    fn output_hash_mismatch_is_caught() {
        let secret = secret();
        let mut registry = RunRegistry::new();
        registry
            .register_spawn("child_1", None, "worker", 1, "in", None)
            .unwrap();
        registry.register_return("child_1", "real_out").unwrap();

        let mut trace = SignedTrace::new();
        trace.add_event(
            &secret,
            NewEvent::default()
                .kind(TraceEventKind::Return)
                .child_run_id("child_1")
                .output_hash("wrong_out"),
        );

        let report = validate_trace(&trace.export(), &registry, &secret);
        assert!(!report.ok);
        assert_eq!(report.failures[0].reason, FailureReason::OutputHashMismatch);
    }
}
