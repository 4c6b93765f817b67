//! CLI argument parsing via `clap`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sevgate",
    version,
    about = "Severity-gated static analysis for C/C++ sources",
    long_about = "Sevgate runs diagnostic tools over source targets, classifies every finding against a rule-severity policy, and exits non-zero when the policy is violated.\n\nExit codes: 0 pass, 1 policy violation, 2 configuration error, 3 tool failure.\nConfiguration precedence: CLI > sevgate.toml > defaults.",
    after_help = "Examples:\n  sevgate check --policy policy/rule-severity-mapping.yaml src/\n  sevgate scan --policy policy.yaml tidy.log --output json\n  sevgate validate --policy policy.yaml --normalized\n  sevgate lookup --policy policy.yaml bugprone-use-after-move",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Args, Debug, Clone, Default)]
/// Flags shared by commands that reach a verdict.
pub struct GateArgs {
    #[arg(long, help = "Repository root (default: current dir)")]
    pub repo_root: Option<String>,
    #[arg(long, help = "Path to the rule-severity policy (yaml|toml|json)")]
    pub policy: Option<String>,
    #[arg(long, help = "Output mode: human|json (default: human)")]
    pub output: Option<String>,
    #[arg(long, value_name = "SECS", help = "Global timeout for the whole run (0 disables)")]
    pub timeout: Option<u64>,
    #[arg(long, help = "Worker count (default: available parallelism)")]
    pub jobs: Option<usize>,
    #[arg(long, value_name = "N", help = "Fail when major findings exceed N (default: 0)")]
    pub major_threshold: Option<usize>,
    #[arg(long, action = clap::ArgAction::SetTrue, help = "Fail on findings whose check is absent from the policy")]
    pub unknown_blocking: bool,
}

#[derive(Subcommand)]
/// Supported subcommands.
pub enum Commands {
    /// Show version
    #[command(about = "Show version", long_about = "Print the current sevgate version.")]
    Version,
    /// Run the configured tools and gate their findings
    #[command(
        about = "Run tools over targets and gate",
        long_about = "Run every configured tool over every target (files, or directories expanded with the include globs), classify findings against the policy and decide.",
        after_help = "Examples:\n  sevgate check --policy policy.yaml src/ include/\n  sevgate check --policy policy.yaml --timeout 300 --jobs 8 src/"
    )]
    Check {
        #[command(flatten)]
        gate: GateArgs,
        #[arg(required = true, help = "Source files or directories")]
        targets: Vec<PathBuf>,
    },
    /// Gate pre-captured tool output
    #[command(
        about = "Gate captured diagnostics",
        long_about = "Classify diagnostics already written to files (or stdin with '-') and decide. A file that cannot be read counts as a tool failure.",
        after_help = "Examples:\n  clang-tidy src/*.c -- | sevgate scan --policy policy.yaml -\n  sevgate scan --policy policy.yaml tidy.log format.log"
    )]
    Scan {
        #[command(flatten)]
        gate: GateArgs,
        #[arg(required = true, help = "Diagnostic files ('-' for stdin)")]
        inputs: Vec<PathBuf>,
    },
    /// Validate a policy document
    #[command(
        about = "Validate the policy",
        long_about = "Load the policy and report every defect at once. Exits 2 when the policy is invalid."
    )]
    Validate {
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
        #[arg(long, help = "Path to the rule-severity policy")]
        policy: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Print the normalized policy as YAML")]
        normalized: bool,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
    /// Classify check ids without running anything
    #[command(
        about = "Look up check ids",
        long_about = "Print the severity and owning rule of each check id, or 'unknown' when no rule claims it."
    )]
    Lookup {
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
        #[arg(long, help = "Path to the rule-severity policy")]
        policy: Option<String>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
        #[arg(required = true, help = "Check ids, e.g. bugprone-use-after-move")]
        checks: Vec<String>,
    },
}

impl GateArgs {
    pub fn overrides(&self) -> crate::config::Overrides {
        crate::config::Overrides {
            repo_root: self.repo_root.clone(),
            policy: self.policy.clone(),
            output: self.output.clone(),
            timeout_secs: self.timeout,
            jobs: self.jobs,
            major_threshold: self.major_threshold,
            unknown_is_blocking: self.unknown_blocking.then_some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_flags() {
        let cli = Cli::parse_from([
            "sevgate",
            "-vv",
            "check",
            "--policy",
            "p.yaml",
            "--timeout",
            "30",
            "--major-threshold",
            "2",
            "--unknown-blocking",
            "src",
            "a.c",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Check { gate, targets } = cli.cmd else {
            panic!("expected check");
        };
        assert_eq!(targets, vec![PathBuf::from("src"), PathBuf::from("a.c")]);
        let o = gate.overrides();
        assert_eq!(o.policy.as_deref(), Some("p.yaml"));
        assert_eq!(o.timeout_secs, Some(30));
        assert_eq!(o.major_threshold, Some(2));
        assert_eq!(o.unknown_is_blocking, Some(true));
    }

    #[test]
    fn test_unknown_blocking_absent_defers_to_config() {
        let cli = Cli::parse_from(["sevgate", "scan", "-"]);
        let Commands::Scan { gate, inputs } = cli.cmd else {
            panic!("expected scan");
        };
        assert_eq!(inputs, vec![PathBuf::from("-")]);
        assert_eq!(gate.overrides().unknown_is_blocking, None);
    }

    #[test]
    fn test_check_requires_targets() {
        assert!(Cli::try_parse_from(["sevgate", "check", "--policy", "p.yaml"]).is_err());
    }
}
