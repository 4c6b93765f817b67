//! Error taxonomy.
//!
//! - `ConfigError`: the policy or settings cannot be trusted. Fatal, exit 2.
//! - `ToolInvocationError`: one target's tool could not run to completion.
//!   Recorded per target, never aborts other workers.
//! - `GateError`: misuse of the gate state machine, or a wrapped `ConfigError`.
//!
//! Unparseable diagnostic lines are not errors (see `diagnostics::SkipReason`),
//! and a failed gate is a verdict, not an error.

use crate::models::SeverityLevel;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A single defect found while validating a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogViolation {
    MissingSeverityLevels,
    MissingLevel {
        level: SeverityLevel,
    },
    UnknownLevel {
        name: String,
    },
    MissingRuleId {
        level: SeverityLevel,
        position: usize,
    },
    MissingChecks {
        level: SeverityLevel,
        rule_id: String,
    },
    EmptyChecks {
        level: SeverityLevel,
        rule_id: String,
    },
    BlankCheckId {
        level: SeverityLevel,
        rule_id: String,
    },
    /// A key the schema does not define, on a level table or on a rule.
    UnknownKey {
        level: SeverityLevel,
        rule_id: Option<String>,
        key: String,
    },
    DuplicateRuleId {
        rule_id: String,
        first: SeverityLevel,
        second: SeverityLevel,
    },
    DuplicateCheck {
        check_id: String,
        first_rule: String,
        second_rule: String,
    },
}

impl fmt::Display for CatalogViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogViolation::MissingSeverityLevels => {
                write!(f, "missing top-level 'severity_levels' key")
            }
            CatalogViolation::MissingLevel { level } => {
                write!(f, "severity level '{}' is not defined", level)
            }
            CatalogViolation::UnknownLevel { name } => write!(
                f,
                "unknown severity level '{}' (expected critical, major, minor)",
                name
            ),
            CatalogViolation::MissingRuleId { level, position } => write!(
                f,
                "rule #{} under '{}' has no rule_id",
                position + 1,
                level
            ),
            CatalogViolation::MissingChecks { level, rule_id } => {
                write!(f, "rule '{}' under '{}' has no checks", rule_id, level)
            }
            CatalogViolation::EmptyChecks { level, rule_id } => write!(
                f,
                "rule '{}' under '{}' has an empty checks list",
                rule_id, level
            ),
            CatalogViolation::BlankCheckId { level, rule_id } => write!(
                f,
                "rule '{}' under '{}' lists a blank check id",
                rule_id, level
            ),
            CatalogViolation::UnknownKey {
                level,
                rule_id: Some(rule_id),
                key,
            } => write!(
                f,
                "rule '{}' under '{}' has unknown key '{}'",
                rule_id, level, key
            ),
            CatalogViolation::UnknownKey {
                level,
                rule_id: None,
                key,
            } => write!(f, "severity level '{}' has unknown key '{}'", level, key),
            CatalogViolation::DuplicateRuleId {
                rule_id,
                first,
                second,
            } => {
                if first == second {
                    write!(f, "duplicate rule_id '{}' within '{}'", rule_id, first)
                } else {
                    write!(
                        f,
                        "duplicate rule_id '{}' under both '{}' and '{}'",
                        rule_id, first, second
                    )
                }
            }
            CatalogViolation::DuplicateCheck {
                check_id,
                first_rule,
                second_rule,
            } => write!(
                f,
                "check '{}' is claimed by both '{}' and '{}'",
                check_id, first_rule, second_rule
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("policy has {} defect(s): {}", .0.len(), join_violations(.0))]
    Invalid(Vec<CatalogViolation>),

    #[error("invalid setting: {0}")]
    Settings(String),
}

impl ConfigError {
    /// Violations carried by an `Invalid` error; empty for other kinds.
    pub fn violations(&self) -> &[CatalogViolation] {
        match self {
            ConfigError::Invalid(v) => v,
            _ => &[],
        }
    }
}

fn join_violations(v: &[CatalogViolation]) -> String {
    v.iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ToolInvocationError {
    #[error("tool '{program}' not found")]
    NotFound { program: String },

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with unexpected status {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    UnexpectedExit { program: String, code: Option<i32> },

    #[error("'{program}' timed out after {}s", .after.as_secs_f64())]
    TimedOut { program: String, after: Duration },

    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ToolInvocationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolInvocationError::TimedOut { .. })
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot {action} while gate is {from}")]
    InvalidTransition { from: String, action: &'static str },
}

/// Result type for fallible configuration and catalog operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
