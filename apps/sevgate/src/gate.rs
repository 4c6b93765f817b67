//! Gate decision: folds per-target reports into a single verdict.
//!
//! Lifecycle: `Uninitialized -> CatalogLoaded -> Scanning -> Decided`, with
//! `ConfigFailed` as the terminal state when the catalog cannot be loaded.
//! Only counts feed the verdict, so the order in which worker reports arrive
//! does not matter. Reports are merged here by a single owner; workers never
//! touch shared counters.

use crate::catalog::RuleCatalog;
use crate::classify::ScanSummary;
use crate::error::{ConfigError, GateError, ToolInvocationError};
use crate::models::{ClassifiedFinding, SeverityCounts};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
/// Configurable decision thresholds. Defaults: threshold 0, unknown not blocking.
pub struct GatePolicy {
    /// Fail when the major count is strictly greater than this.
    pub major_threshold: usize,
    /// Count unknown findings as minor and fail the gate on any of them.
    pub unknown_is_blocking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    Pass = 0,
    PolicyViolation = 1,
    ConfigError = 2,
    ToolFailure = 3,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Uninitialized,
    CatalogLoaded,
    ConfigFailed,
    Scanning,
    Decided,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateState::Uninitialized => "uninitialized",
            GateState::CatalogLoaded => "catalog-loaded",
            GateState::ConfigFailed => "config-failed",
            GateState::Scanning => "scanning",
            GateState::Decided => "decided",
        };
        f.write_str(s)
    }
}

/// Result of one tool invocation (or one diagnostics file) for one target.
#[derive(Debug)]
pub struct TargetReport {
    pub target: PathBuf,
    pub tool: String,
    pub outcome: TargetOutcome,
}

#[derive(Debug)]
pub enum TargetOutcome {
    Completed(ScanSummary),
    ToolError(ToolInvocationError),
    /// Killed at the deadline; `partial` holds what it emitted before that.
    TimedOut {
        error: ToolInvocationError,
        partial: ScanSummary,
    },
}

impl TargetOutcome {
    pub fn timed_out(after: Duration, program: &str, partial: ScanSummary) -> Self {
        TargetOutcome::TimedOut {
            error: ToolInvocationError::TimedOut {
                program: program.to_string(),
                after,
            },
            partial,
        }
    }

    pub fn summary(&self) -> Option<&ScanSummary> {
        match self {
            TargetOutcome::Completed(s) => Some(s),
            TargetOutcome::TimedOut { partial, .. } => Some(partial),
            TargetOutcome::ToolError(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ToolInvocationError> {
        match self {
            TargetOutcome::Completed(_) => None,
            TargetOutcome::TimedOut { error, .. } | TargetOutcome::ToolError(error) => Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    pub target: PathBuf,
    pub tool: String,
    pub timed_out: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunMetadata {
    /// Some invocation was cut short by the global timeout.
    pub partial: bool,
    pub targets: usize,
    pub invocations: usize,
    pub lines: usize,
    pub unparsed_lines: usize,
    pub elided_findings: usize,
    pub tool_failures: Vec<ToolFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Final, immutable outcome of a gate run.
pub struct GateVerdict {
    pub counts: SeverityCounts,
    pub unknown_count: usize,
    pub pass: bool,
    pub exit_code: i32,
    /// Human-readable reasons the policy failed; empty unless exit code is 1.
    pub violations: Vec<String>,
    pub metadata: RunMetadata,
}

impl GateVerdict {
    pub fn exit(&self) -> ExitCode {
        match self.exit_code {
            0 => ExitCode::Pass,
            1 => ExitCode::PolicyViolation,
            2 => ExitCode::ConfigError,
            _ => ExitCode::ToolFailure,
        }
    }
}

/// One gate run, owned by the coordinating thread.
pub struct GateRun {
    policy: GatePolicy,
    state: GateState,
    catalog: Option<Arc<RuleCatalog>>,
    counts: SeverityCounts,
    unknown: usize,
    targets: BTreeSet<PathBuf>,
    metadata: RunMetadata,
    findings: Vec<ClassifiedFinding>,
    verdict: Option<GateVerdict>,
}

impl GateRun {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            state: GateState::Uninitialized,
            catalog: None,
            counts: SeverityCounts::default(),
            unknown: 0,
            targets: BTreeSet::new(),
            metadata: RunMetadata::default(),
            findings: Vec::new(),
            verdict: None,
        }
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn catalog(&self) -> Option<&Arc<RuleCatalog>> {
        self.catalog.as_ref()
    }

    /// Load the catalog. Allowed once; any error is terminal (`ConfigFailed`).
    pub fn load_catalog<F>(&mut self, load: F) -> Result<Arc<RuleCatalog>, GateError>
    where
        F: FnOnce() -> Result<RuleCatalog, ConfigError>,
    {
        self.expect_state(&[GateState::Uninitialized], "load the catalog")?;
        match load() {
            Ok(catalog) => {
                let catalog = Arc::new(catalog);
                self.catalog = Some(Arc::clone(&catalog));
                self.state = GateState::CatalogLoaded;
                Ok(catalog)
            }
            Err(e) => {
                tracing::error!(error = %e, "policy rejected; no scanning will run");
                self.state = GateState::ConfigFailed;
                Err(e.into())
            }
        }
    }

    /// Merge one worker's report. The first report carrying a finding moves
    /// the run into `Scanning`.
    pub fn record(&mut self, report: TargetReport) -> Result<(), GateError> {
        self.expect_state(
            &[GateState::CatalogLoaded, GateState::Scanning],
            "record a report",
        )?;
        let TargetReport {
            target,
            tool,
            outcome,
        } = report;
        self.metadata.invocations += 1;
        self.targets.insert(target.clone());

        if let Some(error) = outcome.error() {
            tracing::warn!(path = %target.display(), %tool, error = %error, "tool invocation failed");
            self.metadata.partial |= error.is_timeout();
            self.metadata.tool_failures.push(ToolFailure {
                target: target.clone(),
                tool: tool.clone(),
                timed_out: error.is_timeout(),
                message: error.to_string(),
            });
        }

        let summary = match outcome {
            TargetOutcome::Completed(s) | TargetOutcome::TimedOut { partial: s, .. } => s,
            TargetOutcome::ToolError(_) => return Ok(()),
        };
        if summary.total_findings() > 0 && self.state == GateState::CatalogLoaded {
            self.state = GateState::Scanning;
        }
        self.counts.merge(&summary.counts);
        self.unknown += summary.unknown_count;
        self.metadata.lines += summary.lines;
        self.metadata.unparsed_lines += summary.unparsed_lines;
        self.metadata.elided_findings += summary.elided;
        self.findings.extend(summary.findings);
        Ok(())
    }

    /// Produce the verdict. Terminal: a second call is an error.
    pub fn decide(&mut self) -> Result<&GateVerdict, GateError> {
        self.expect_state(&[GateState::CatalogLoaded, GateState::Scanning], "decide")?;

        let mut violations = Vec::new();
        if self.counts.critical > 0 {
            violations.push(format!("{} critical finding(s)", self.counts.critical));
        }
        if self.counts.major > self.policy.major_threshold {
            violations.push(format!(
                "{} major finding(s) exceed threshold {}",
                self.counts.major, self.policy.major_threshold
            ));
        }
        if self.policy.unknown_is_blocking && self.unknown > 0 {
            violations.push(format!(
                "{} finding(s) with checks absent from the policy",
                self.unknown
            ));
        }

        let exit = if !violations.is_empty() {
            ExitCode::PolicyViolation
        } else if !self.metadata.tool_failures.is_empty() {
            ExitCode::ToolFailure
        } else {
            ExitCode::Pass
        };

        let mut metadata = std::mem::take(&mut self.metadata);
        metadata.targets = self.targets.len();
        tracing::info!(
            critical = self.counts.critical,
            major = self.counts.major,
            minor = self.counts.minor,
            unknown = self.unknown,
            exit = exit.code(),
            "gate decided"
        );
        self.state = GateState::Decided;
        Ok(self.verdict.insert(GateVerdict {
            counts: self.counts,
            unknown_count: self.unknown,
            pass: exit == ExitCode::Pass,
            exit_code: exit.code(),
            violations,
            metadata,
        }))
    }

    pub fn verdict(&self) -> Option<&GateVerdict> {
        self.verdict.as_ref()
    }

    /// Retained findings from all reports, sorted by location for display.
    pub fn findings(&self) -> Vec<&ClassifiedFinding> {
        let mut out: Vec<&ClassifiedFinding> = self.findings.iter().collect();
        out.sort_by(|a, b| {
            (&a.finding.file, a.finding.line, a.finding.column)
                .cmp(&(&b.finding.file, b.finding.line, b.finding.column))
                .then(a.finding.check_id.cmp(&b.finding.check_id))
        });
        out
    }

    fn expect_state(&self, allowed: &[GateState], action: &'static str) -> Result<(), GateError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(GateError::InvalidTransition {
                from: self.state.to_string(),
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DocumentFormat;
    use crate::classify::Classifier;
    use crate::diagnostics::DiagnosticParser;
    use std::io::Cursor;

    const POLICY: &str = r#"
severity_levels:
  critical:
    - rule_id: Rule 21
      checks: [bugprone-use-after-move]
  major:
    - rule_id: Rule 30
      checks: [bugprone-narrowing-conversions]
  minor:
    - rule_id: Rule 44
      checks: [readability-else-after-return]
"#;

    fn loaded(policy: GatePolicy) -> (GateRun, Arc<RuleCatalog>) {
        let mut run = GateRun::new(policy);
        let catalog = run
            .load_catalog(|| RuleCatalog::parse(POLICY, DocumentFormat::Yaml))
            .unwrap();
        (run, catalog)
    }

    fn report(catalog: &RuleCatalog, policy: GatePolicy, target: &str, output: &str) -> TargetReport {
        let mut classifier = Classifier::new(catalog, policy.unknown_is_blocking);
        let mut summary = ScanSummary::new(100);
        classifier.scan(DiagnosticParser::new(Cursor::new(output.to_string())), &mut summary);
        TargetReport {
            target: PathBuf::from(target),
            tool: "clang-tidy".into(),
            outcome: TargetOutcome::Completed(summary),
        }
    }

    #[test]
    fn test_critical_finding_fails_with_exit_1() {
        let policy = GatePolicy::default();
        let (mut run, catalog) = loaded(policy);
        run.record(report(
            &catalog,
            policy,
            "a.c",
            "a.c:4:2: warning: moved [bugprone-use-after-move]\n",
        ))
        .unwrap();
        assert_eq!(run.state(), GateState::Scanning);
        let v = run.decide().unwrap();
        assert_eq!(v.counts.critical, 1);
        assert!(!v.pass);
        assert_eq!(v.exit_code, 1);
        assert_eq!(run.findings()[0].matched_rule_id.as_deref(), Some("Rule 21"));
    }

    #[test]
    fn test_unknown_check_passes_when_not_blocking() {
        let policy = GatePolicy::default();
        let (mut run, catalog) = loaded(policy);
        run.record(report(&catalog, policy, "a.c", "a.c:1:1: warning: x [readability-foo]\n"))
            .unwrap();
        let v = run.decide().unwrap();
        assert_eq!(v.unknown_count, 1);
        assert_eq!(v.counts.total(), 0);
        assert!(v.pass);
        assert_eq!(v.exit_code, 0);
    }

    #[test]
    fn test_unknown_check_fails_when_blocking() {
        let policy = GatePolicy {
            unknown_is_blocking: true,
            ..GatePolicy::default()
        };
        let (mut run, catalog) = loaded(policy);
        run.record(report(&catalog, policy, "a.c", "a.c:1:1: warning: x [readability-foo]\n"))
            .unwrap();
        let v = run.decide().unwrap();
        assert_eq!(v.counts.minor, 1);
        assert_eq!(v.exit(), ExitCode::PolicyViolation);
    }

    #[test]
    fn test_zero_findings_pass() {
        let (mut run, _) = loaded(GatePolicy::default());
        assert_eq!(run.state(), GateState::CatalogLoaded);
        let v = run.decide().unwrap();
        assert_eq!(v.counts, SeverityCounts::default());
        assert_eq!(v.unknown_count, 0);
        assert!(v.pass);
        assert_eq!(v.exit_code, 0);
        assert_eq!(run.state(), GateState::Decided);
    }

    #[test]
    fn test_major_threshold_is_strict() {
        let policy = GatePolicy {
            major_threshold: 2,
            ..GatePolicy::default()
        };
        let two = "a.c:1:1: warning: n [bugprone-narrowing-conversions]\n\
a.c:2:1: warning: n [bugprone-narrowing-conversions]\n";
        let (mut run, catalog) = loaded(policy);
        run.record(report(&catalog, policy, "a.c", two)).unwrap();
        assert!(run.decide().unwrap().pass);

        let (mut run, catalog) = loaded(policy);
        run.record(report(&catalog, policy, "a.c", two)).unwrap();
        run.record(report(
            &catalog,
            policy,
            "b.c",
            "b.c:9:9: warning: n [bugprone-narrowing-conversions]\n",
        ))
        .unwrap();
        let v = run.decide().unwrap();
        assert_eq!(v.exit_code, 1);
        assert!(v.violations[0].contains("exceed threshold 2"));
    }

    #[test]
    fn test_minor_findings_never_fail() {
        let policy = GatePolicy::default();
        let (mut run, catalog) = loaded(policy);
        let many = "a.c:1:1: warning: r [readability-else-after-return]\n".repeat(50);
        run.record(report(&catalog, policy, "a.c", &many)).unwrap();
        let v = run.decide().unwrap();
        assert_eq!(v.counts.minor, 50);
        assert!(v.pass);
    }

    #[test]
    fn test_timeout_plus_critical_reports_both() {
        let policy = GatePolicy::default();
        let (mut run, catalog) = loaded(policy);
        run.record(TargetReport {
            target: PathBuf::from("slow.c"),
            tool: "clang-tidy".into(),
            outcome: TargetOutcome::timed_out(Duration::from_secs(5), "clang-tidy", ScanSummary::new(10)),
        })
        .unwrap();
        run.record(report(
            &catalog,
            policy,
            "bad.c",
            "bad.c:4:2: warning: moved [bugprone-use-after-move]\n",
        ))
        .unwrap();
        let v = run.decide().unwrap();
        assert_eq!(v.exit_code, 1);
        assert!(v.metadata.partial);
        assert_eq!(v.metadata.targets, 2);
        assert_eq!(v.metadata.tool_failures.len(), 1);
        assert!(v.metadata.tool_failures[0].timed_out);
        assert_eq!(v.counts.critical, 1);
    }

    #[test]
    fn test_tool_failure_alone_exits_3() {
        let (mut run, _) = loaded(GatePolicy::default());
        run.record(TargetReport {
            target: PathBuf::from("a.c"),
            tool: "clang-tidy".into(),
            outcome: TargetOutcome::ToolError(ToolInvocationError::NotFound {
                program: "clang-tidy".into(),
            }),
        })
        .unwrap();
        let v = run.decide().unwrap();
        assert!(!v.pass);
        assert_eq!(v.exit(), ExitCode::ToolFailure);
        assert!(!v.metadata.partial);
    }

    #[test]
    fn test_config_failure_is_terminal() {
        let mut run = GateRun::new(GatePolicy::default());
        let err = run
            .load_catalog(|| RuleCatalog::parse("nothing: here\n", DocumentFormat::Yaml))
            .unwrap_err();
        assert!(matches!(err, GateError::Config(ConfigError::Invalid(_))));
        assert_eq!(run.state(), GateState::ConfigFailed);
        assert!(run.decide().is_err());
        assert!(run
            .load_catalog(|| RuleCatalog::parse(POLICY, DocumentFormat::Yaml))
            .is_err());
        let rec = run.record(TargetReport {
            target: PathBuf::from("a.c"),
            tool: "t".into(),
            outcome: TargetOutcome::Completed(ScanSummary::new(1)),
        });
        assert!(matches!(rec, Err(GateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_verdict_is_produced_once() {
        let (mut run, _) = loaded(GatePolicy::default());
        let first = run.decide().unwrap().clone();
        assert!(run.decide().is_err());
        assert_eq!(run.verdict(), Some(&first));
        assert!(run
            .record(TargetReport {
                target: PathBuf::from("late.c"),
                tool: "t".into(),
                outcome: TargetOutcome::Completed(ScanSummary::new(1)),
            })
            .is_err());
    }

    #[test]
    fn test_catalog_loads_once() {
        let (mut run, _) = loaded(GatePolicy::default());
        assert!(run
            .load_catalog(|| RuleCatalog::parse(POLICY, DocumentFormat::Yaml))
            .is_err());
        assert!(run.catalog().is_some());
    }

    #[test]
    fn test_verdict_json_shape() {
        let (mut run, _) = loaded(GatePolicy::default());
        let v = serde_json::to_value(run.decide().unwrap()).unwrap();
        assert_eq!(v["counts"]["critical"], 0);
        assert_eq!(v["pass"], true);
        assert_eq!(v["exit_code"], 0);
        assert_eq!(v["metadata"]["partial"], false);
    }
}
