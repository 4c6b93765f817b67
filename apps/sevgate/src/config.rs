//! Configuration discovery and effective settings resolution.
//!
//! Sevgate reads `sevgate.toml|yaml|yml` from the repository root (or the
//! closest ancestor) and merges it with CLI flags to produce an `Effective`
//! config. Defaults:
//! - `output`: `human`
//! - `timeout_secs`: none
//! - `jobs`: number of available processing units
//! - `major_threshold`: 0
//! - `unknown_is_blocking`: false
//! - `include`: common C/C++ source globs
//! - `max_findings_per_target`: 500
//! - `tools`: clang-format (dry run) and clang-tidy
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::error::{ConfigError, Result};
use crate::gate::GatePolicy;
use crate::runner::ToolSpec;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_INCLUDE: &[&str] = &["**/*.c", "**/*.h", "**/*.cc", "**/*.cpp", "**/*.hpp"];
pub const DEFAULT_MAX_FINDINGS_PER_TARGET: usize = 500;

#[derive(Debug, Default, Deserialize, Clone)]
/// A `[[tools]]` entry. `{file}` in `command` is replaced by the target path.
pub struct ToolCfg {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub accept_exit_codes: Option<Vec<i32>>,
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Root configuration loaded from `sevgate.toml|yaml`.
pub struct SevgateConfig {
    pub policy: Option<String>,
    pub output: Option<String>,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub major_threshold: Option<usize>,
    pub unknown_is_blocking: Option<bool>,
    #[serde(default)]
    pub include: Option<Vec<String>>,
    pub max_findings_per_target: Option<usize>,
    #[serde(default)]
    pub tools: Option<Vec<ToolCfg>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl FromStr for OutputMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "human" | "text" => Ok(OutputMode::Human),
            "json" | "structured" => Ok(OutputMode::Json),
            other => Err(ConfigError::Settings(format!(
                "unknown output mode '{}' (expected human|json)",
                other
            ))),
        }
    }
}

/// CLI-provided values; `None` defers to the config file, then defaults.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub repo_root: Option<String>,
    pub policy: Option<String>,
    pub output: Option<String>,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub major_threshold: Option<usize>,
    pub unknown_is_blocking: Option<bool>,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub repo_root: PathBuf,
    pub config_found: bool,
    pub policy: Option<PathBuf>,
    pub output: OutputMode,
    pub timeout: Option<Duration>,
    /// 0 means one worker per available processing unit.
    pub jobs: usize,
    pub gate: GatePolicy,
    pub include: Vec<String>,
    pub max_findings_per_target: usize,
    pub tools: Vec<ToolSpec>,
}

impl Effective {
    /// Policy path, or a settings error when neither CLI nor config set one.
    pub fn require_policy(&self) -> Result<&Path> {
        self.policy.as_deref().ok_or_else(|| {
            ConfigError::Settings(
                "policy is not configured. Pass --policy or set `policy` in sevgate.toml.".into(),
            )
        })
    }
}

/// Walk upward from `start` to detect the repository root.
///
/// Stops when a `sevgate.toml|yaml|yml` or a `.git` directory is found.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if cur.join("sevgate.toml").exists()
            || cur.join("sevgate.yaml").exists()
            || cur.join("sevgate.yml").exists()
        {
            return cur.to_path_buf();
        }
        if cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

/// Load `SevgateConfig` from `sevgate.toml` or `sevgate.yaml|yml` if present.
///
/// A config file that exists but does not parse is an error.
pub fn load_config(root: &Path) -> Result<Option<SevgateConfig>> {
    let toml_path = root.join("sevgate.toml");
    if toml_path.exists() {
        let s = read(&toml_path)?;
        let cfg = toml::from_str(&s).map_err(|e| ConfigError::Parse {
            path: toml_path.clone(),
            message: e.to_string(),
        })?;
        return Ok(Some(cfg));
    }
    for yml in ["sevgate.yaml", "sevgate.yml"] {
        let p = root.join(yml);
        if p.exists() {
            let s = read(&p)?;
            let cfg = serde_yaml::from_str(&s).map_err(|e| ConfigError::Parse {
                path: p.clone(),
                message: e.to_string(),
            })?;
            return Ok(Some(cfg));
        }
    }
    Ok(None)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve `Effective` by merging CLI flags, discovered config, and defaults.
pub fn resolve_effective(cli: &Overrides) -> Result<Effective> {
    let start = PathBuf::from(cli.repo_root.as_deref().unwrap_or("."));
    let repo_root = detect_repo_root(&start);
    let loaded = load_config(&repo_root)?;
    let config_found = loaded.is_some();
    let cfg = loaded.unwrap_or_default();

    // CLI paths are taken as given; config paths are relative to the repo root.
    let policy = cli
        .policy
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| cfg.policy.as_ref().map(|p| repo_root.join(p)));

    let output = cli
        .output
        .as_deref()
        .or(cfg.output.as_deref())
        .unwrap_or("human")
        .parse::<OutputMode>()?;

    let timeout = cli
        .timeout_secs
        .or(cfg.timeout_secs)
        .filter(|s| *s > 0)
        .map(Duration::from_secs);

    let jobs = cli.jobs.or(cfg.jobs).unwrap_or(0);

    let gate = GatePolicy {
        major_threshold: cli.major_threshold.or(cfg.major_threshold).unwrap_or(0),
        unknown_is_blocking: cli
            .unknown_is_blocking
            .or(cfg.unknown_is_blocking)
            .unwrap_or(false),
    };

    let include = cfg
        .include
        .unwrap_or_else(|| DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect());

    let max_findings_per_target = cfg
        .max_findings_per_target
        .unwrap_or(DEFAULT_MAX_FINDINGS_PER_TARGET);

    let tools = match cfg.tools {
        Some(list) if !list.is_empty() => list
            .into_iter()
            .map(ToolSpec::try_from)
            .collect::<Result<Vec<_>>>()?,
        _ => ToolSpec::defaults(),
    };

    Ok(Effective {
        repo_root,
        config_found,
        policy,
        output,
        timeout,
        jobs,
        gate,
        include,
        max_findings_per_target,
        tools,
    })
}
