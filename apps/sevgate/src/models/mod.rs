//! Shared data models for catalog, parser, classifier and gate outputs.

pub mod policy;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Policy severity tier. Ordered so that `Critical > Major > Minor`.
pub enum SeverityLevel {
    Minor,
    Major,
    Critical,
}

impl SeverityLevel {
    /// All levels, most severe first. This is the canonical document order.
    pub const ALL: [SeverityLevel; 3] = [
        SeverityLevel::Critical,
        SeverityLevel::Major,
        SeverityLevel::Minor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SeverityLevel::Critical => "critical",
            SeverityLevel::Major => "major",
            SeverityLevel::Minor => "minor",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            SeverityLevel::Critical => 0,
            SeverityLevel::Major => 1,
            SeverityLevel::Minor => 2,
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(SeverityLevel::Critical),
            "major" => Ok(SeverityLevel::Major),
            "minor" => Ok(SeverityLevel::Minor),
            other => Err(format!("unknown severity level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
/// Classification outcome: a catalog level, or `unknown` when no rule claims the check.
pub enum Severity {
    Critical,
    Major,
    Minor,
    Unknown,
}

impl Severity {
    pub fn level(self) -> Option<SeverityLevel> {
        match self {
            Severity::Critical => Some(SeverityLevel::Critical),
            Severity::Major => Some(SeverityLevel::Major),
            Severity::Minor => Some(SeverityLevel::Minor),
            Severity::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self.level() {
            Some(level) => level.as_str(),
            None => "unknown",
        }
    }
}

impl From<SeverityLevel> for Severity {
    fn from(level: SeverityLevel) -> Self {
        match level {
            SeverityLevel::Critical => Severity::Critical,
            SeverityLevel::Major => Severity::Major,
            SeverityLevel::Minor => Severity::Minor,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// One diagnostic emitted by an external tool for a file/line/column.
pub struct Finding {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    /// Severity word as printed by the tool (`warning`, `error`, ...). Not used for gating.
    pub tool_severity: String,
    pub check_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A finding annotated with its policy severity and the rule that claimed it.
pub struct ClassifiedFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub severity: Severity,
    pub matched_rule_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Per-level finding counts.
pub struct SeverityCounts {
    pub critical: usize,
    pub major: usize,
    pub minor: usize,
}

impl SeverityCounts {
    pub fn get(&self, level: SeverityLevel) -> usize {
        match level {
            SeverityLevel::Critical => self.critical,
            SeverityLevel::Major => self.major,
            SeverityLevel::Minor => self.minor,
        }
    }

    pub fn add(&mut self, level: SeverityLevel) {
        match level {
            SeverityLevel::Critical => self.critical += 1,
            SeverityLevel::Major => self.major += 1,
            SeverityLevel::Minor => self.minor += 1,
        }
    }

    pub fn merge(&mut self, other: &SeverityCounts) {
        self.critical += other.critical;
        self.major += other.major;
        self.minor += other.minor;
    }

    pub fn total(&self) -> usize {
        self.critical + self.major + self.minor
    }
}
