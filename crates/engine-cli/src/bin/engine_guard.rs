// SPDX-License-Identifier: MIT OR Apache-2.0
//! `engine-guard`: checks a persisted proof artifact before a downstream
//! caller trusts that a run was genuinely agentic.

use anyhow::Result;
use clap::Parser;
use engine_cli::{EXIT_ASLEEP_OR_CONTRACT_VIOLATED, EXIT_SUCCESS, init_tracing};
use engine_core::{PROOF_ARTIFACT_RELATIVE_PATH, check_guard_now};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "engine-guard", about = "Check a supervised-engine proof artifact")]
struct Args {
    /// Path to the proof artifact. Defaults to `.engine/last-proof.json`
    /// under `--repo-root`.
    #[arg(long)]
    proof: Option<PathBuf>,

    #[arg(long)]
    repo_root: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    max_age_min: i64,

    /// Require the agentic contract (all engagement flags plus a real
    /// runtime) rather than just a fresh, successful proof.
    #[arg(long)]
    strict: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let repo_root = args.repo_root.unwrap_or_else(|| PathBuf::from("."));
    let proof_path = args
        .proof
        .unwrap_or_else(|| repo_root.join(PROOF_ARTIFACT_RELATIVE_PATH));

    let require_agentic = args.strict
        || std::env::var("ENGINE_AGENTIC")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

    let result = check_guard_now(&proof_path, args.max_age_min, require_agentic);
    match result {
        Ok(()) => {
            println!("{}", serde_json::json!({"ok": true}));
            std::process::exit(EXIT_SUCCESS);
        }
        Err(reason) => {
            println!("{}", serde_json::json!({"ok": false, "error": reason}));
            std::process::exit(EXIT_ASLEEP_OR_CONTRACT_VIOLATED);
        }
    }
}
