//! Sevgate core library.
//!
//! Runs static-analysis tools over C/C++ targets, classifies each finding
//! against a rule-severity policy, and folds the results into a pass/fail
//! verdict with a CI exit code.
//!
//! High-level modules:
//! - `catalog`: Loading and validating the rule-severity policy.
//! - `diagnostics`: Streaming parser for `path:line:col: sev: msg [check]` lines.
//! - `classify`: Per-finding severity lookup and running counts.
//! - `gate`: Run lifecycle, report merging, and the verdict.
//! - `runner`: Bounded worker pool, subprocess invocation, and timeouts.
//! - `config`: Discovery and effective configuration resolution.
//! - `cli`: CLI argument parsing (binary uses this).
//! - `output`: Human/JSON printers.
//! - `models`: Data models for policy documents, findings, and counts.
//! - `error`: Error taxonomy.
//! - `logging`: `tracing` subscriber setup.
//! - `utils`: Supporting helpers.
pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod logging;
pub mod models;
pub mod output;
pub mod runner;
pub mod utils;
