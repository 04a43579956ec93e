// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Shared exit-code protocol and logging setup for the CLI binaries."]

/// The run completed and produced a genuinely agentic (or, outside
/// strict/agentic contexts, merely successful) result.
pub const EXIT_SUCCESS: i32 = 0;
/// The orchestrator failed to complete the run (budget exhaustion, quality
/// gate exhaustion, worker error, etc).
pub const EXIT_ORCHESTRATION_FAILED: i32 = 1;
/// Strict mode was requested or auto-detected but no capability to run a
/// real subagent was available.
pub const EXIT_TOOL_MISSING_STRICT: i32 = 2;
/// The run was classified as asleep, violated the agentic contract, or
/// `force_sleep` was set. `force_sleep` always wins this code.
pub const EXIT_ASLEEP_OR_CONTRACT_VIOLATED: i32 = 5;

/// Install a `tracing-subscriber` that writes to stderr only, so stdout
/// stays reserved for the single JSON object each binary emits.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Derive the process exit code for an `engine-run` invocation from its
/// result.
pub fn exit_code_for_result(result: &engine_core::EngineResult) -> i32 {
    if result.ok {
        return EXIT_SUCCESS;
    }
    match result.reason.as_deref() {
        Some("tool_missing_strict") => EXIT_TOOL_MISSING_STRICT,
        _ => {
            if result.engagement == engine_core::EngagementMode::Asleep {
                EXIT_ASLEEP_OR_CONTRACT_VIOLATED
            } else {
                EXIT_ORCHESTRATION_FAILED
            }
        }
    }
}
