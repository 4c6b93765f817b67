//! Output rendering for check, validate, and lookup commands.
//!
//! Supports `human` (default) and `json` outputs. The JSON form carries the
//! verdict fields at the top level plus the retained findings.

use crate::catalog::RuleCatalog;
use crate::config::OutputMode;
use crate::error::ConfigError;
use crate::gate::GateVerdict;
use crate::models::{ClassifiedFinding, Severity, SeverityLevel};
use crate::utils::display_path;
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;
use std::path::Path;

fn use_colors(output: OutputMode) -> bool {
    output != OutputMode::Json && crate::utils::use_colors()
}

fn print_json(v: &JsonVal) {
    match serde_json::to_string_pretty(v) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("{} cannot render JSON: {}", crate::utils::error_prefix(), e),
    }
}

fn tag(severity: Severity, color: bool) -> (String, String) {
    let label = format!("⟦{}⟧", severity);
    if !color {
        let icon = match severity {
            Severity::Critical => "✖",
            Severity::Major => "▲",
            Severity::Minor => "◆",
            Severity::Unknown => "?",
        };
        return (icon.to_string(), label);
    }
    match severity {
        Severity::Critical => ("✖".red().to_string(), label.red().bold().to_string()),
        Severity::Major => ("▲".yellow().to_string(), label.yellow().bold().to_string()),
        Severity::Minor => ("◆".blue().to_string(), label.blue().bold().to_string()),
        Severity::Unknown => (
            "?".bright_black().to_string(),
            label.bright_black().to_string(),
        ),
    }
}

/// Print the findings and the verdict of a gate run.
pub fn print_verdict(
    findings: &[&ClassifiedFinding],
    verdict: &GateVerdict,
    output: OutputMode,
    root: &Path,
) {
    if output == OutputMode::Json {
        print_json(&compose_verdict_json(findings, verdict, root));
        return;
    }
    let color = use_colors(output);
    for cf in findings {
        let (icon, sev) = tag(cf.severity, color);
        let f = &cf.finding;
        let loc = format!("{}:{}:{}", display_path(&f.file, root), f.line, f.column);
        let loc = if color { loc.bold().to_string() } else { loc };
        let check = match &cf.matched_rule_id {
            Some(rule) => format!("{} → {}", f.check_id, rule),
            None => f.check_id.clone(),
        };
        println!("{} {} {} ❲{}❳ — {}", icon, sev, loc, check, f.message);
    }

    let meta = &verdict.metadata;
    for failure in &meta.tool_failures {
        let what = if failure.timed_out { "timed out" } else { "failed" };
        eprintln!(
            "{} {} on {} {}: {}",
            crate::utils::note_prefix(),
            failure.tool,
            display_path(&failure.target, root),
            what,
            failure.message
        );
    }
    if meta.elided_findings > 0 {
        eprintln!(
            "{} {} finding(s) counted but not listed",
            crate::utils::info_prefix(),
            meta.elided_findings
        );
    }
    if meta.partial {
        eprintln!(
            "{} run hit the timeout; results are partial",
            crate::utils::note_prefix()
        );
    }

    let c = &verdict.counts;
    let summary = format!(
        "— Summary — critical={} major={} minor={} unknown={} targets={}",
        c.critical, c.major, c.minor, verdict.unknown_count, meta.targets
    );
    let result = if verdict.pass { "PASS" } else { "FAIL" };
    if color {
        let result = if verdict.pass {
            result.green().bold().to_string()
        } else {
            result.red().bold().to_string()
        };
        println!("{} {}", summary.bold(), result);
    } else {
        println!("{} {}", summary, result);
    }
    for reason in &verdict.violations {
        println!("  - {}", reason);
    }
}

/// Compose the verdict JSON object (pure) for testing/snapshot purposes.
pub fn compose_verdict_json(
    findings: &[&ClassifiedFinding],
    verdict: &GateVerdict,
    root: &Path,
) -> JsonVal {
    let items: Vec<_> = findings
        .iter()
        .map(|cf| {
            json!({
                "file": display_path(&cf.finding.file, root),
                "line": cf.finding.line,
                "column": cf.finding.column,
                "tool_severity": cf.finding.tool_severity,
                "check_id": cf.finding.check_id,
                "message": cf.finding.message,
                "severity": cf.severity,
                "matched_rule_id": cf.matched_rule_id,
            })
        })
        .collect();
    json!({
        "counts": verdict.counts,
        "unknown_count": verdict.unknown_count,
        "pass": verdict.pass,
        "exit_code": verdict.exit_code,
        "violations": verdict.violations,
        "metadata": verdict.metadata,
        "findings": items,
    })
}

/// Print the outcome of validating a policy document.
pub fn print_validation(result: &Result<RuleCatalog, ConfigError>, output: OutputMode) {
    if output == OutputMode::Json {
        print_json(&compose_validation_json(result));
        return;
    }
    match result {
        Ok(catalog) => {
            let per_level: Vec<String> = SeverityLevel::ALL
                .iter()
                .map(|l| format!("{}={}", l, catalog.rules(*l).len()))
                .collect();
            println!(
                "{} policy is valid: {} rule(s), {} check(s) [{}]",
                crate::utils::info_prefix(),
                catalog.len(),
                catalog.check_count(),
                per_level.join(" ")
            );
        }
        Err(ConfigError::Invalid(violations)) => {
            for v in violations {
                eprintln!("{} {}", crate::utils::error_prefix(), v);
            }
            eprintln!("{} defect(s) found", violations.len());
        }
        Err(e) => eprintln!("{} {}", crate::utils::error_prefix(), e),
    }
}

pub fn compose_validation_json(result: &Result<RuleCatalog, ConfigError>) -> JsonVal {
    match result {
        Ok(catalog) => {
            let levels: serde_json::Map<String, JsonVal> = SeverityLevel::ALL
                .iter()
                .map(|l| (l.to_string(), json!(catalog.rules(*l).len())))
                .collect();
            json!({
                "valid": true,
                "rules": catalog.len(),
                "checks": catalog.check_count(),
                "levels": levels,
            })
        }
        Err(e) => json!({
            "valid": false,
            "error": e.to_string(),
            "violations": e.violations(),
        }),
    }
}

/// Print the classification of each check id against the catalog.
pub fn print_lookup(catalog: &RuleCatalog, checks: &[String], output: OutputMode) {
    if output == OutputMode::Json {
        print_json(&compose_lookup_json(catalog, checks));
        return;
    }
    let color = use_colors(output);
    for check in checks {
        let (severity, rule) = match catalog.lookup(check) {
            Some((level, rule)) => (Severity::from(level), rule),
            None => (Severity::Unknown, "-"),
        };
        let (icon, sev) = tag(severity, color);
        println!("{} {} {} ❲{}❳", icon, sev, check, rule);
    }
}

pub fn compose_lookup_json(catalog: &RuleCatalog, checks: &[String]) -> JsonVal {
    let items: Vec<_> = checks
        .iter()
        .map(|check| match catalog.lookup(check) {
            Some((level, rule)) => json!({
                "check_id": check,
                "severity": Severity::from(level),
                "matched_rule_id": rule,
            }),
            None => json!({
                "check_id": check,
                "severity": Severity::Unknown,
                "matched_rule_id": JsonVal::Null,
            }),
        })
        .collect();
    JsonVal::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DocumentFormat;
    use crate::gate::{GatePolicy, GateRun, TargetOutcome, TargetReport};
    use crate::classify::{Classifier, ScanSummary};
    use crate::diagnostics::DiagnosticParser;
    use std::io::Cursor;
    use std::path::PathBuf;

    const POLICY: &str = r#"
severity_levels:
  critical:
    - rule_id: Rule 21
      checks: [bugprone-use-after-move]
  major: []
  minor: []
"#;

    fn catalog() -> RuleCatalog {
        RuleCatalog::parse(POLICY, DocumentFormat::Yaml).unwrap()
    }

    #[test]
    fn test_compose_verdict_json_shape() {
        let mut run = GateRun::new(GatePolicy::default());
        let c = run.load_catalog(|| Ok(catalog())).unwrap();
        let mut summary = ScanSummary::new(10);
        Classifier::new(&c, false).scan(
            DiagnosticParser::new(Cursor::new(
                "/repo/src/a.c:4:2: warning: moved [bugprone-use-after-move]\n\
/repo/src/a.c:5:1: warning: other [readability-foo]\n",
            )),
            &mut summary,
        );
        run.record(TargetReport {
            target: PathBuf::from("/repo/src/a.c"),
            tool: "clang-tidy".into(),
            outcome: TargetOutcome::Completed(summary),
        })
        .unwrap();
        let verdict = run.decide().unwrap().clone();
        let out = compose_verdict_json(&run.findings(), &verdict, Path::new("/repo"));
        assert_eq!(out["pass"], false);
        assert_eq!(out["exit_code"], 1);
        assert_eq!(out["counts"]["critical"], 1);
        assert_eq!(out["unknown_count"], 1);
        assert_eq!(out["findings"][0]["file"], "src/a.c");
        assert_eq!(out["findings"][0]["severity"], "critical");
        assert_eq!(out["findings"][0]["matched_rule_id"], "Rule 21");
        assert_eq!(out["findings"][1]["severity"], "unknown");
        assert!(out["findings"][1]["matched_rule_id"].is_null());
    }

    #[test]
    fn test_compose_validation_json() {
        let ok = compose_validation_json(&Ok(catalog()));
        assert_eq!(ok["valid"], true);
        assert_eq!(ok["levels"]["critical"], 1);

        let bad = RuleCatalog::parse("severity_levels:\n  critical: []\n", DocumentFormat::Yaml);
        let out = compose_validation_json(&bad);
        assert_eq!(out["valid"], false);
        assert_eq!(out["violations"].as_array().map(Vec::len), Some(2));
        assert_eq!(out["violations"][0]["kind"], "missing_level");
    }

    #[test]
    fn test_compose_lookup_json() {
        let out = compose_lookup_json(
            &catalog(),
            &["bugprone-use-after-move".to_string(), "readability-foo".to_string()],
        );
        assert_eq!(out[0]["severity"], "critical");
        assert_eq!(out[0]["matched_rule_id"], "Rule 21");
        assert_eq!(out[1]["severity"], "unknown");
    }
}
