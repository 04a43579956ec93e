// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Configuration for a supervised run: defaults, file overrides, environment overrides."]
#![deny(unsafe_code)]

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable that forces agentic-contract enforcement even
/// when `strict_mode` would otherwise auto-detect to standard.
pub const ENGINE_AGENTIC_ENV: &str = "ENGINE_AGENTIC";

/// Default relative path, under the repository root, for file-based
/// configuration.
pub const CONFIG_FILE_RELATIVE_PATH: &str = ".engine/config.json";

/// Default relative path, under the repository root, for the proof
/// artifact.
pub const PROOF_ARTIFACT_RELATIVE_PATH: &str = ".engine/last-proof.json";

/// Whether a run operates under the agentic contract (full engagement
/// required) or the local contract. This is *derived*, never set
/// directly by a caller: it falls out of `strict_mode` and the
/// `ENGINE_AGENTIC` environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractMode {
    Local,
    Agentic,
}

/// Engine configuration. `strict_mode` of `None` means "auto-detect from
/// capability probing" rather than a fixed value.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct Configuration {
    /// `None` auto-detects from whether a host subagent capability/adapter
    /// is available; `Some(true)`/`Some(false)` pin the value.
    pub strict_mode: Option<bool>,
    pub use_worker: bool,
    pub max_depth: u32,
    pub max_spawns: u32,
    pub proof_max_age_min: i64,
    pub force_sleep: bool,
    pub verbose: bool,
    /// Override for the proof artifact path; defaults to
    /// [`PROOF_ARTIFACT_RELATIVE_PATH`] under the current directory when unset.
    #[schemars(skip)]
    pub proof_path: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            strict_mode: None,
            use_worker: true,
            max_depth: 4,
            max_spawns: 10,
            proof_max_age_min: 10,
            force_sleep: false,
            verbose: false,
            proof_path: None,
        }
    }
}

impl Configuration {
    pub fn proof_path(&self) -> PathBuf {
        self.proof_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(PROOF_ARTIFACT_RELATIVE_PATH))
    }

    /// Derive the contract mode from this configuration's `strict_mode`
    /// (once resolved to a concrete bool by preflight) and the
    /// `ENGINE_AGENTIC` environment variable.
    pub fn contract_mode(&self, resolved_strict_mode: bool) -> ContractMode {
        let env_agentic = env::var(ENGINE_AGENTIC_ENV)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if resolved_strict_mode || env_agentic {
            ContractMode::Agentic
        } else {
            ContractMode::Local
        }
    }
}

/// A non-fatal problem encountered while loading configuration. Loading
/// never hard-fails: a malformed file or env value is warned about and
/// the default for that field is kept.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ConfigWarning(pub String);

/// Load configuration by layering, in order: built-in defaults, the
/// repository's `.engine/config.json` if present and parseable, then
/// environment variable overrides. Returns the resolved configuration
/// plus any warnings raised along the way.
pub fn load_config(repo_root: &Path) -> (Configuration, Vec<ConfigWarning>) {
    let mut warnings = Vec::new();
    let mut config = Configuration::default();

    let file_path = repo_root.join(CONFIG_FILE_RELATIVE_PATH);
    if let Ok(contents) = std::fs::read_to_string(&file_path) {
        match serde_json::from_str::<Configuration>(&contents) {
            Ok(file_config) => config = file_config,
            Err(e) => {
                warnings.push(ConfigWarning(format!(
                    "failed to parse {}: {e}; using defaults",
                    file_path.display()
                )));
            }
        }
    }

    apply_env_overrides(&mut config, &mut warnings);

    if !warnings.is_empty() {
        for w in &warnings {
            tracing::warn!(target: "engine.config", "{w}");
        }
    }

    (config, warnings)
}

fn apply_env_overrides(config: &mut Configuration, warnings: &mut Vec<ConfigWarning>) {
    if let Ok(v) = env::var("STRICT_MODE") {
        match v.parse::<bool>() {
            Ok(b) => config.strict_mode = Some(b),
            Err(_) => warnings.push(ConfigWarning(format!("invalid STRICT_MODE={v:?}"))),
        }
    }
    if let Ok(v) = env::var("USE_WORKER") {
        match v.parse::<bool>() {
            Ok(b) => config.use_worker = b,
            Err(_) => warnings.push(ConfigWarning(format!("invalid USE_WORKER={v:?}"))),
        }
    }
    if let Ok(v) = env::var("MAX_DEPTH") {
        match v.parse::<u32>() {
            Ok(n) => config.max_depth = n,
            Err(_) => warnings.push(ConfigWarning(format!("invalid MAX_DEPTH={v:?}"))),
        }
    }
    if let Ok(v) = env::var("MAX_SPAWNS") {
        match v.parse::<u32>() {
            Ok(n) => config.max_spawns = n,
            Err(_) => warnings.push(ConfigWarning(format!("invalid MAX_SPAWNS={v:?}"))),
        }
    }
    if let Ok(v) = env::var("PROOF_MAX_AGE_MIN") {
        match v.parse::<i64>() {
            Ok(n) => config.proof_max_age_min = n,
            Err(_) => warnings.push(ConfigWarning(format!("invalid PROOF_MAX_AGE_MIN={v:?}"))),
        }
    }
    if let Ok(v) = env::var("FORCE_SLEEP") {
        match v.parse::<bool>() {
            Ok(b) => config.force_sleep = b,
            Err(_) => warnings.push(ConfigWarning(format!("invalid FORCE_SLEEP={v:?}"))),
        }
    }
    if let Ok(v) = env::var("VERBOSE") {
        match v.parse::<bool>() {
            Ok(b) => config.verbose = b,
            Err(_) => warnings.push(ConfigWarning(format!("invalid VERBOSE={v:?}"))),
        }
    }
}
