//! Sevgate CLI binary entry point.
//! Resolves configuration, runs the gate, prints results, and maps the
//! verdict to the process exit code.

use clap::Parser;
use sevgate::catalog::RuleCatalog;
use sevgate::cli::{Cli, Commands, GateArgs};
use sevgate::config::{self, Effective, Overrides};
use sevgate::gate::{ExitCode, GateRun, TargetReport};
use sevgate::runner::{self, RunOptions};
use sevgate::{logging, output, utils};
use std::fmt::Display;
use std::path::PathBuf;

enum Inputs {
    Targets(Vec<PathBuf>),
    Diagnostics(Vec<PathBuf>),
}

fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    let code = match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            ExitCode::Pass.code()
        }
        Commands::Check { gate, targets } => run_gate(&gate, Inputs::Targets(targets)),
        Commands::Scan { gate, inputs } => run_gate(&gate, Inputs::Diagnostics(inputs)),
        Commands::Validate {
            repo_root,
            policy,
            normalized,
            output,
        } => validate(
            Overrides {
                repo_root,
                policy,
                output,
                ..Overrides::default()
            },
            normalized,
        ),
        Commands::Lookup {
            repo_root,
            policy,
            output,
            checks,
        } => lookup(
            Overrides {
                repo_root,
                policy,
                output,
                ..Overrides::default()
            },
            &checks,
        ),
    };
    std::process::exit(code);
}

fn config_failure(e: impl Display) -> i32 {
    eprintln!("{} {}", utils::error_prefix(), e);
    ExitCode::ConfigError.code()
}

fn effective(overrides: &Overrides) -> Result<Effective, i32> {
    let eff = config::resolve_effective(overrides).map_err(config_failure)?;
    if !eff.config_found {
        eprintln!(
            "{} No sevgate.toml found; using defaults.",
            utils::note_prefix()
        );
    }
    Ok(eff)
}

fn run_gate(gate: &GateArgs, inputs: Inputs) -> i32 {
    let eff = match effective(&gate.overrides()) {
        Ok(e) => e,
        Err(code) => return code,
    };
    let policy = match eff.require_policy() {
        Ok(p) => p.to_path_buf(),
        Err(e) => return config_failure(e),
    };

    let mut run = GateRun::new(eff.gate);
    let catalog = match run.load_catalog(|| RuleCatalog::load(&policy)) {
        Ok(c) => c,
        Err(e) => return config_failure(e),
    };

    let opts = RunOptions {
        jobs: eff.jobs,
        timeout: eff.timeout,
        retain: eff.max_findings_per_target,
        policy: run.policy(),
    };
    let reports: Result<Vec<TargetReport>, _> = match inputs {
        Inputs::Targets(paths) => runner::expand_targets(&paths, &eff.include).and_then(|targets| {
            if targets.files.is_empty() {
                tracing::warn!("no source files matched the targets");
            }
            let mut reports = targets.missing_reports();
            reports.extend(runner::run_tools(&catalog, &targets.files, &eff.tools, &opts)?);
            Ok(reports)
        }),
        Inputs::Diagnostics(files) => runner::scan_files(&catalog, &files, &opts),
    };
    let reports = match reports {
        Ok(r) => r,
        Err(e) => return config_failure(e),
    };

    for report in reports {
        if let Err(e) = run.record(report) {
            return config_failure(e);
        }
    }
    let verdict = match run.decide() {
        Ok(v) => v.clone(),
        Err(e) => return config_failure(e),
    };
    output::print_verdict(&run.findings(), &verdict, eff.output, &eff.repo_root);
    verdict.exit_code
}

fn validate(overrides: Overrides, normalized: bool) -> i32 {
    let eff = match effective(&overrides) {
        Ok(e) => e,
        Err(code) => return code,
    };
    let policy = match eff.require_policy() {
        Ok(p) => p,
        Err(e) => return config_failure(e),
    };
    let result = RuleCatalog::load(policy);
    if normalized {
        if let Ok(catalog) = &result {
            return match catalog.to_yaml() {
                Ok(yaml) => {
                    print!("{}", yaml);
                    ExitCode::Pass.code()
                }
                Err(e) => config_failure(e),
            };
        }
    }
    output::print_validation(&result, eff.output);
    match result {
        Ok(_) => ExitCode::Pass.code(),
        Err(_) => ExitCode::ConfigError.code(),
    }
}

fn lookup(overrides: Overrides, checks: &[String]) -> i32 {
    let eff = match effective(&overrides) {
        Ok(e) => e,
        Err(code) => return code,
    };
    let catalog = match eff.require_policy().and_then(RuleCatalog::load) {
        Ok(c) => c,
        Err(e) => return config_failure(e),
    };
    output::print_lookup(&catalog, checks, eff.output);
    ExitCode::Pass.code()
}
