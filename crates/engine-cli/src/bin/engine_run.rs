// SPDX-License-Identifier: MIT OR Apache-2.0
//! `engine-run`: the single entrypoint binary. Reads a task, runs it
//! through the supervised engine, prints one JSON object, exits per the
//! 0/1/2/5 protocol.

use anyhow::{Context, Result};
use clap::Parser;
use engine_cli::{exit_code_for_result, init_tracing};
use engine_core::{Configuration, NoCapability, Task, load_config};
use std::io::Read as _;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "engine-run", about = "Run a task through the supervised recursion engine")]
struct Args {
    /// Path to a JSON-encoded Task. Reads from stdin if omitted.
    #[arg(long)]
    task_file: Option<PathBuf>,

    /// Repository root to load `.engine/config.json` from. Defaults to the
    /// current directory.
    #[arg(long)]
    repo_root: Option<PathBuf>,

    /// Force strict mode regardless of capability auto-detection.
    #[arg(long)]
    strict: bool,

    /// Force the run to report asleep regardless of what it did.
    #[arg(long)]
    force_sleep: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn read_task(args: &Args) -> Result<Task> {
    let raw = match &args.task_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading task file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading task JSON from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("parsing task JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let task = read_task(&args)?;
    let repo_root = args.repo_root.unwrap_or_else(|| PathBuf::from("."));
    let (mut config, warnings): (Configuration, _) = load_config(&repo_root);
    for w in warnings {
        tracing::warn!(target: "engine.cli", "{w}");
    }
    if args.strict {
        config.strict_mode = Some(true);
    }
    if args.force_sleep {
        config.force_sleep = true;
    }
    if args.verbose {
        config.verbose = true;
    }
    if config.proof_path.is_none() {
        config.proof_path = Some(repo_root.join(engine_core::PROOF_ARTIFACT_RELATIVE_PATH));
    }

    let result = engine_core::run(task, config, &NoCapability, None).await?;

    println!("{}", serde_json::to_string(&result)?);
    std::process::exit(exit_code_for_result(&result));
}
