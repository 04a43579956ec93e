// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability probing and the preflight stage that runs before the
//! orchestrator's fan-out program.

use engine_orchestrator::Orchestrator;
use engine_trace::{NewEvent, TraceEventKind};

use crate::CoreError;

/// Probes whether a real subagent-running capability is available to the
/// host (a wired [`engine_adapter::SpawnAdapter`] or an equivalent host
/// facility). No concrete probe ships here, the same way no concrete
/// spawn adapter does.
pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> bool;
}

/// Always reports no capability; the common case in a library/test
/// context with no adapter wired in.
pub struct NoCapability;
impl CapabilityProbe for NoCapability {
    fn probe(&self) -> bool {
        false
    }
}

/// Always reports a capability is present.
pub struct AlwaysCapable;
impl CapabilityProbe for AlwaysCapable {
    fn probe(&self) -> bool {
        true
    }
}

/// Resolve `strict_mode`: an explicit configuration value wins, otherwise
/// it is auto-detected from whether a capability is available.
pub fn resolve_strict_mode(configured: Option<bool>, capable: bool) -> bool {
    configured.unwrap_or(capable)
}

/// Run the preflight stage: if `strict_mode` is set and no capability is
/// available, this is fatal (`tool_missing_strict`, mapped to exit code 2
/// at the CLI boundary). Otherwise it records `preflight_ok` ahead of
/// anything the fan-out program appends, which is what makes "preflight
/// events are merged ahead of the orchestrator's trace" true by
/// construction rather than by a later reordering pass. `plan_created` is
/// recorded later, by the fan-out program itself, once a plan actually
/// exists; recording it here would mark every run that merely reaches
/// preflight as having a plan, even one that never spawns anything.
pub fn preflight(
    orch: &mut Orchestrator,
    capable: bool,
    strict_mode: bool,
) -> Result<(), CoreError> {
    if strict_mode && !capable {
        orch.record_event(
            NewEvent::default()
                .kind(TraceEventKind::ToolMissingStrict)
                .note("tool_missing_strict"),
        );
        tracing::error!(target: "engine.core", "strict mode requires a capability that is not available");
        return Err(CoreError::ToolMissingStrict);
    }

    orch.record_event(NewEvent::default().kind(TraceEventKind::PreflightOk));
    Ok(())
}
