//! Streaming classification of findings against the rule catalog.
//!
//! A `Classifier` keeps only running per-severity counts, so it can sit on
//! an unbounded diagnostic stream. Findings kept for display are capped by
//! the caller through `ScanSummary`.

use crate::catalog::RuleCatalog;
use crate::diagnostics::DiagnosticParser;
use crate::models::{ClassifiedFinding, Finding, Severity, SeverityCounts, SeverityLevel};
use serde::Serialize;
use std::io::BufRead;

pub struct Classifier<'c> {
    catalog: &'c RuleCatalog,
    unknown_is_blocking: bool,
    counts: SeverityCounts,
    unknown: usize,
}

impl<'c> Classifier<'c> {
    pub fn new(catalog: &'c RuleCatalog, unknown_is_blocking: bool) -> Self {
        Self {
            catalog,
            unknown_is_blocking,
            counts: SeverityCounts::default(),
            unknown: 0,
        }
    }

    /// Pure lookup: same check id, same answer, no counting.
    pub fn classify_check(&self, check_id: &str) -> (Severity, Option<&'c str>) {
        match self.catalog.lookup(check_id) {
            Some((level, rule_id)) => (level.into(), Some(rule_id)),
            None => (Severity::Unknown, None),
        }
    }

    /// Annotate one finding and update the running counts.
    ///
    /// With `unknown_is_blocking`, unknown findings also count as `minor`.
    pub fn classify(&mut self, finding: Finding) -> ClassifiedFinding {
        let (severity, rule_id) = self.classify_check(&finding.check_id);
        match severity.level() {
            Some(level) => self.counts.add(level),
            None => {
                self.unknown += 1;
                if self.unknown_is_blocking {
                    self.counts.add(SeverityLevel::Minor);
                }
            }
        }
        ClassifiedFinding {
            finding,
            severity,
            matched_rule_id: rule_id.map(str::to_string),
        }
    }

    pub fn counts(&self) -> SeverityCounts {
        self.counts
    }

    pub fn unknown_count(&self) -> usize {
        self.unknown
    }

    /// Drain `parser` through this classifier into `sink`.
    ///
    /// `sink` may receive several streams (stdout, stderr) of the same
    /// invocation; its counts always mirror this classifier's totals.
    pub fn scan<R: BufRead>(&mut self, mut parser: DiagnosticParser<R>, sink: &mut ScanSummary) {
        for finding in parser.by_ref() {
            let classified = self.classify(finding);
            sink.retain(classified);
        }
        sink.lines += parser.lines_read();
        sink.unparsed_lines += parser.unparsed_lines();
        sink.counts = self.counts;
        sink.unknown_count = self.unknown;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
/// Local aggregate produced by one worker for one invocation.
pub struct ScanSummary {
    pub counts: SeverityCounts,
    pub unknown_count: usize,
    pub lines: usize,
    pub unparsed_lines: usize,
    /// Classified findings kept for reporting, in emission order.
    pub findings: Vec<ClassifiedFinding>,
    /// Findings counted but not kept because the retention cap was reached.
    pub elided: usize,
    #[serde(skip)]
    retain_limit: usize,
}

impl ScanSummary {
    pub fn new(retain_limit: usize) -> Self {
        Self {
            retain_limit,
            ..Default::default()
        }
    }

    fn retain(&mut self, finding: ClassifiedFinding) {
        if self.findings.len() < self.retain_limit {
            self.findings.push(finding);
        } else {
            self.elided += 1;
        }
    }

    pub fn total_findings(&self) -> usize {
        self.findings.len() + self.elided
    }

    /// Append another stream's summary of the same invocation.
    pub fn absorb(&mut self, other: ScanSummary) {
        self.counts.merge(&other.counts);
        self.unknown_count += other.unknown_count;
        self.lines += other.lines;
        self.unparsed_lines += other.unparsed_lines;
        self.elided += other.elided;
        for finding in other.findings {
            self.retain(finding);
        }
    }
}
