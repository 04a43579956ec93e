// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Quality gate for subagent output, and a bounded retry loop driven by it."]
#![deny(unsafe_code)]

use std::time::Duration;

/// Case-insensitive substrings that mark an output as hand-waved rather
/// than actually produced.
pub const HANDWAVE_PHRASES: &[&str] = &[
    "i guess",
    "seems like",
    "looks like",
    "probably",
    "maybe",
    "not sure",
    "cannot access",
    "no access",
    "i did not",
    "i didn't",
    "placeholder",
    "todo",
    "tbd",
    "coming soon",
    "not implemented",
];

/// Outcome of running the quality gate over a single attempt's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Pass,
    Fail { reasons: Vec<String> },
}

impl GateVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateVerdict::Pass)
    }
}

/// Evaluate `output` against the quality gate:
///
/// - must be a JSON object
/// - must contain every key in `required_keys`
/// - must contain at least `min_numeric_count` numeric leaf values
/// - must not contain any [`HANDWAVE_PHRASES`] substring (case-insensitive)
///   in any string leaf value
pub fn quality_gate(
    output: &serde_json::Value,
    required_keys: &[&str],
    min_numeric_count: usize,
) -> GateVerdict {
    let mut reasons = Vec::new();

    let Some(map) = output.as_object() else {
        return GateVerdict::Fail {
            reasons: vec!["output_not_object".to_string()],
        };
    };

    for key in required_keys {
        if !map.contains_key(*key) {
            reasons.push(format!("missing_required_key:{key}"));
        }
    }

    let numeric_count = count_numeric_leaves(output);
    if numeric_count < min_numeric_count {
        reasons.push(format!(
            "insufficient_numeric_values:{numeric_count}<{min_numeric_count}"
        ));
    }

    if let Some(phrase) = find_handwave_phrase(output) {
        reasons.push(format!("handwave_phrase:{phrase}"));
    }

    if reasons.is_empty() {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail { reasons }
    }
}

fn count_numeric_leaves(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Number(_) => 1,
        serde_json::Value::Array(items) => items.iter().map(count_numeric_leaves).sum(),
        serde_json::Value::Object(map) => map.values().map(count_numeric_leaves).sum(),
        _ => 0,
    }
}

fn find_handwave_phrase(value: &serde_json::Value) -> Option<&'static str> {
    match value {
        serde_json::Value::String(s) => {
            let lower = s.to_lowercase();
            HANDWAVE_PHRASES.iter().find(|p| lower.contains(*p)).copied()
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_handwave_phrase),
        serde_json::Value::Object(map) => map.values().find_map(find_handwave_phrase),
        _ => None,
    }
}

/// Backoff parameters for [`run_with_retry`]. Delay defaults to zero so
/// tests and simulated runs do not pay real wall-clock time; callers that
/// want the exponential-backoff-with-jitter behavior set a non-zero
/// `base_delay`.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryBackoff {
    /// Exponential delay for `attempt` (1-based) with up to 20% jitter,
    /// seeded from the wall clock rather than a `rand` dependency, the
    /// same approach this is grounded on uses for its own retry backoff.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter_nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let jitter_frac = (jitter_nanos % 1000) as f64 / 1000.0 * 0.2;
        capped.mul_f64(1.0 + jitter_frac)
    }
}

/// Result of [`run_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub reason: Option<String>,
    pub attempts: u32,
}

/// Run `attempt_fn` up to `max_attempts` times, gating each attempt's
/// output through `gate_fn`. On the first passing attempt, returns
/// `ok: true` immediately. If every attempt fails the gate, returns
/// `ok: false` with `reason: "quality_gate_failed_all_attempts"` and the
/// last attempt's result. `tighten_prompt_fn`, if given, rewrites the
/// prompt before each retry.
pub async fn run_with_retry<T, F, Fut>(
    initial_prompt: &str,
    max_attempts: u32,
    backoff: &RetryBackoff,
    mut attempt_fn: F,
    gate_fn: impl Fn(&T) -> GateVerdict,
    tighten_prompt_fn: Option<impl Fn(&str) -> String>,
) -> RetryOutcome<T>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let mut prompt = initial_prompt.to_string();
    let mut last: Option<T> = None;

    for attempt in 1..=max_attempts.max(1) {
        let result = attempt_fn(prompt.clone()).await;
        match gate_fn(&result) {
            GateVerdict::Pass => {
                tracing::debug!(target: "engine.gate", attempt, "quality gate passed");
                return RetryOutcome {
                    ok: true,
                    result: Some(result),
                    reason: None,
                    attempts: attempt,
                };
            }
            GateVerdict::Fail { reasons } => {
                tracing::warn!(target: "engine.gate", attempt, ?reasons, "quality gate failed");
                last = Some(result);
                if attempt < max_attempts {
                    if let Some(tighten) = &tighten_prompt_fn {
                        prompt = tighten(&prompt);
                    }
                    let delay = backoff.compute_delay(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    RetryOutcome {
        ok: false,
        result: last,
        reason: Some("quality_gate_failed_all_attempts".to_string()),
        attempts: max_attempts.max(1),
    }
}
