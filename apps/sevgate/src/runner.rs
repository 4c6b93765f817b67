//! Fan-out of tool invocations over targets, fan-in of local summaries.
//!
//! One worker per (target, tool) pair runs on a bounded rayon pool. Each
//! worker owns its parsers and classifiers and returns a `TargetReport`;
//! the catalog is shared read-only. Merging is left to `GateRun`.
//!
//! A global timeout sets one deadline for the whole run. Invocations still
//! running at the deadline are killed together with every process they
//! started (on unix each tool leads its own process group); those not yet
//! started are reported as timed out without being spawned.

use crate::catalog::RuleCatalog;
use crate::classify::{Classifier, ScanSummary};
use crate::config::ToolCfg;
use crate::diagnostics::DiagnosticParser;
use crate::error::{ConfigError, ToolInvocationError};
use crate::gate::{GatePolicy, TargetOutcome, TargetReport};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Clone, PartialEq, Eq)]
/// An external tool run once per target.
pub struct ToolSpec {
    pub name: String,
    pub command: Vec<String>,
    pub accept_exit_codes: Vec<i32>,
}

impl ToolSpec {
    /// clang-format in dry-run mode and clang-tidy. Both may exit 1 while
    /// still producing a well-formed report.
    pub fn defaults() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: "clang-format".into(),
                command: vec!["clang-format".into(), "--dry-run".into(), FILE_PLACEHOLDER.into()],
                accept_exit_codes: vec![0, 1],
            },
            ToolSpec {
                name: "clang-tidy".into(),
                command: vec![
                    "clang-tidy".into(),
                    "--quiet".into(),
                    FILE_PLACEHOLDER.into(),
                    "--".into(),
                ],
                accept_exit_codes: vec![0, 1],
            },
        ]
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    fn args_for(&self, target: &Path) -> Vec<String> {
        let file = target.to_string_lossy();
        self.command
            .iter()
            .skip(1)
            .map(|a| a.replace(FILE_PLACEHOLDER, &file))
            .collect()
    }
}

impl TryFrom<ToolCfg> for ToolSpec {
    type Error = ConfigError;

    fn try_from(cfg: ToolCfg) -> Result<Self, Self::Error> {
        if cfg.name.trim().is_empty() {
            return Err(ConfigError::Settings("tool entry has an empty name".into()));
        }
        if cfg.command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigError::Settings(format!(
                "tool '{}' has an empty command",
                cfg.name
            )));
        }
        Ok(ToolSpec {
            name: cfg.name,
            command: cfg.command,
            accept_exit_codes: cfg.accept_exit_codes.unwrap_or_else(|| vec![0]),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker count; 0 uses one per available processing unit.
    pub jobs: usize,
    pub timeout: Option<Duration>,
    /// Findings kept for display per invocation.
    pub retain: usize,
    /// Must be the policy of the `GateRun` that records the reports.
    pub policy: GatePolicy,
}

#[derive(Clone, Copy)]
struct Budget {
    deadline: Instant,
    timeout: Duration,
}

fn build_pool(jobs: usize) -> Result<rayon::ThreadPool, ConfigError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("sevgate-worker-{}", i))
        .build()
        .map_err(|e| ConfigError::Settings(format!("cannot start worker pool: {}", e)))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
/// Result of target expansion.
pub struct ExpandedTargets {
    /// Source files to run the tools over, sorted and de-duplicated.
    pub files: Vec<PathBuf>,
    /// Named targets that do not exist.
    pub missing: Vec<PathBuf>,
}

impl ExpandedTargets {
    /// One failed report per missing target, so the rest still get gated.
    pub fn missing_reports(&self) -> Vec<TargetReport> {
        self.missing
            .iter()
            .map(|path| TargetReport {
                target: path.clone(),
                tool: "target".into(),
                outcome: TargetOutcome::ToolError(ToolInvocationError::Read {
                    path: path.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
                }),
            })
            .collect()
    }
}

/// Expand target paths: files are kept, directories are searched with the
/// `include` globs. Only a malformed include pattern is an error.
pub fn expand_targets(paths: &[PathBuf], include: &[String]) -> Result<ExpandedTargets, ConfigError> {
    let mut out = ExpandedTargets::default();
    for path in paths {
        if path.is_file() {
            out.files.push(path.clone());
        } else if path.is_dir() {
            for pat in include {
                let pattern = path.join(pat).to_string_lossy().to_string();
                let entries = glob::glob(&pattern).map_err(|e| {
                    ConfigError::Settings(format!("bad include pattern '{}': {}", pat, e))
                })?;
                out.files.extend(entries.flatten().filter(|p| p.is_file()));
            }
        } else {
            tracing::warn!(path = %path.display(), "target not found");
            out.missing.push(path.clone());
        }
    }
    out.files.sort();
    out.files.dedup();
    out.missing.sort();
    out.missing.dedup();
    Ok(out)
}

/// Run every tool over every target on a bounded pool.
pub fn run_tools(
    catalog: &RuleCatalog,
    targets: &[PathBuf],
    tools: &[ToolSpec],
    opts: &RunOptions,
) -> Result<Vec<TargetReport>, ConfigError> {
    let pool = build_pool(opts.jobs)?;
    let budget = opts.timeout.map(|timeout| Budget {
        deadline: Instant::now() + timeout,
        timeout,
    });
    let work: Vec<(&PathBuf, &ToolSpec)> = targets
        .iter()
        .flat_map(|t| tools.iter().map(move |tool| (t, tool)))
        .collect();
    tracing::info!(
        targets = targets.len(),
        invocations = work.len(),
        workers = pool.current_num_threads(),
        "scanning"
    );
    Ok(pool.install(|| {
        work.par_iter()
            .map(|(target, tool)| invoke(catalog, target, tool, budget, opts))
            .collect()
    }))
}

fn invoke(
    catalog: &RuleCatalog,
    target: &Path,
    tool: &ToolSpec,
    budget: Option<Budget>,
    opts: &RunOptions,
) -> TargetReport {
    let report = |outcome| TargetReport {
        target: target.to_path_buf(),
        tool: tool.name.clone(),
        outcome,
    };
    if let Some(b) = budget {
        if Instant::now() >= b.deadline {
            return report(TargetOutcome::timed_out(
                b.timeout,
                tool.program(),
                ScanSummary::new(opts.retain),
            ));
        }
    }

    tracing::debug!(path = %target.display(), tool = %tool.name, "invoking");
    let mut cmd = Command::new(tool.program());
    cmd.args(tool.args_for(target))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let spawned = cmd.spawn();
    let mut child = match spawned {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return report(TargetOutcome::ToolError(ToolInvocationError::NotFound {
                program: tool.program().to_string(),
            }))
        }
        Err(source) => {
            return report(TargetOutcome::ToolError(ToolInvocationError::Spawn {
                program: tool.program().to_string(),
                source,
            }))
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (waited, summary) = thread::scope(|s| {
        let out = s.spawn(|| scan_stream(catalog, stdout, opts));
        let err = s.spawn(|| scan_stream(catalog, stderr, opts));
        let waited = supervise(&mut child, budget, || out.is_finished() && err.is_finished());
        let mut summary = out.join().unwrap_or_else(|_| ScanSummary::new(opts.retain));
        summary.absorb(err.join().unwrap_or_else(|_| ScanSummary::new(opts.retain)));
        (waited, summary)
    });

    let outcome = match waited {
        Waited::Exited(status) => {
            let code = status.code();
            if code.is_some_and(|c| tool.accept_exit_codes.contains(&c)) {
                TargetOutcome::Completed(summary)
            } else {
                TargetOutcome::ToolError(ToolInvocationError::UnexpectedExit {
                    program: tool.program().to_string(),
                    code,
                })
            }
        }
        Waited::Killed(timeout) => TargetOutcome::timed_out(timeout, tool.program(), summary),
        Waited::Failed(source) => TargetOutcome::ToolError(ToolInvocationError::Spawn {
            program: tool.program().to_string(),
            source,
        }),
    };
    report(outcome)
}

enum Waited {
    Exited(ExitStatus),
    Killed(Duration),
    Failed(io::Error),
}

/// Block until the child has exited and both output streams are drained.
///
/// Descendants of the tool may hold the pipes open after it exits, so the
/// deadline applies to the drain as well. Passing it kills the whole group.
fn supervise(
    child: &mut Child,
    budget: Option<Budget>,
    streams_done: impl Fn() -> bool,
) -> Waited {
    let mut status = None;
    loop {
        if status.is_none() {
            match child.try_wait() {
                Ok(s) => status = s,
                Err(e) => {
                    terminate(child);
                    return Waited::Failed(e);
                }
            }
        }
        if let Some(s) = status {
            if streams_done() {
                return Waited::Exited(s);
            }
        }
        if let Some(b) = budget {
            if Instant::now() >= b.deadline {
                terminate(child);
                return Waited::Killed(b.timeout);
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal. The group was created for
            // this child by `process_group(0)`, so its id equals the pid.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn scan_stream<R: Read>(catalog: &RuleCatalog, pipe: Option<R>, opts: &RunOptions) -> ScanSummary {
    let mut summary = ScanSummary::new(opts.retain);
    if let Some(pipe) = pipe {
        let mut classifier = Classifier::new(catalog, opts.policy.unknown_is_blocking);
        classifier.scan(DiagnosticParser::new(BufReader::new(pipe)), &mut summary);
    }
    summary
}

/// Gate pre-captured tool output. `-` reads standard input and may appear
/// at most once.
pub fn scan_files(
    catalog: &RuleCatalog,
    inputs: &[PathBuf],
    opts: &RunOptions,
) -> Result<Vec<TargetReport>, ConfigError> {
    if inputs.iter().filter(|p| p.as_os_str() == "-").count() > 1 {
        return Err(ConfigError::Settings(
            "standard input ('-') can only be scanned once".into(),
        ));
    }
    let pool = build_pool(opts.jobs)?;
    Ok(pool.install(|| {
        inputs
            .par_iter()
            .map(|input| {
                let outcome = if input.as_os_str() == "-" {
                    TargetOutcome::Completed(scan_stream(catalog, Some(io::stdin().lock()), opts))
                } else {
                    match File::open(input) {
                        Ok(f) => TargetOutcome::Completed(scan_stream(catalog, Some(f), opts)),
                        Err(source) => TargetOutcome::ToolError(ToolInvocationError::Read {
                            path: input.clone(),
                            source,
                        }),
                    }
                };
                TargetReport {
                    target: input.clone(),
                    tool: "diagnostics".into(),
                    outcome,
                }
            })
            .collect()
    }))
}
