//! Diagnostic line parsing.
//!
//! Grammar: `<path>:<line>:<column>: <severity-word>: <message> [<check-id>]`.
//! Anything else is skipped with a reason and tallied, never treated as fatal.
//! The parser never looks at the tool's exit status.

use crate::models::Finding;
use regex::Regex;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Marker clang-tidy appends to the check list when a warning is promoted.
const WARNINGS_AS_ERRORS: &str = "-warnings-as-errors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Why a line did not yield a finding.
pub enum SkipReason {
    Blank,
    /// No `path:line:column:` prefix (banners, summaries, source excerpts).
    NoLocation,
    /// Location present but no bracketed check id (e.g. `note:` lines).
    NoCheckId,
    /// Line or column does not fit in `u32`.
    BadNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Finding(Finding),
    Skipped(SkipReason),
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<path>.+?):(?P<line>\d+):(?P<col>\d+):\s*(?P<rest>.*)$")
            .expect("location grammar is valid")
    })
}

fn body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<sev>[A-Za-z][A-Za-z -]*?):\s*(?P<msg>.*?)\s*\[(?P<checks>[^\[\]]+)\]\s*$")
            .expect("body grammar is valid")
    })
}

/// Parse one line of tool output.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return ParsedLine::Skipped(SkipReason::Blank);
    }
    let Some(loc) = location_re().captures(line) else {
        return ParsedLine::Skipped(SkipReason::NoLocation);
    };
    let (Ok(line_no), Ok(column)) = (loc["line"].parse::<u32>(), loc["col"].parse::<u32>()) else {
        return ParsedLine::Skipped(SkipReason::BadNumber);
    };
    let Some(body) = body_re().captures(&loc["rest"]) else {
        return ParsedLine::Skipped(SkipReason::NoCheckId);
    };
    let Some(check_id) = body["checks"]
        .split(',')
        .map(str::trim)
        .find(|c| !c.is_empty() && *c != WARNINGS_AS_ERRORS)
    else {
        return ParsedLine::Skipped(SkipReason::NoCheckId);
    };
    ParsedLine::Finding(Finding {
        file: PathBuf::from(&loc["path"]),
        line: line_no,
        column,
        tool_severity: body["sev"].trim().to_string(),
        check_id: check_id.to_string(),
        message: body["msg"].to_string(),
    })
}

/// Lazy, single-pass stream of findings over one tool invocation's output.
///
/// Not restartable; create a fresh parser per invocation. Non-matching lines
/// are counted in `unparsed_lines`. A read error ends the stream.
pub struct DiagnosticParser<R> {
    reader: R,
    buf: Vec<u8>,
    lines: usize,
    unparsed: usize,
    done: bool,
}

impl<R: BufRead> DiagnosticParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            lines: 0,
            unparsed: 0,
            done: false,
        }
    }

    pub fn lines_read(&self) -> usize {
        self.lines
    }

    pub fn unparsed_lines(&self) -> usize {
        self.unparsed
    }

    /// Next line as a tagged result, or `None` at end of input.
    pub fn next_line(&mut self) -> Option<ParsedLine> {
        if self.done {
            return None;
        }
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.lines += 1;
                let text = String::from_utf8_lossy(&self.buf);
                let parsed = parse_line(&text);
                if let ParsedLine::Skipped(reason) = &parsed {
                    self.unparsed += 1;
                    if *reason != SkipReason::Blank {
                        tracing::debug!(?reason, line = %text.trim_end(), "skipped diagnostic line");
                    }
                }
                Some(parsed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "diagnostic stream ended early");
                self.done = true;
                None
            }
        }
    }
}

impl<R: BufRead> Iterator for DiagnosticParser<R> {
    type Item = Finding;

    fn next(&mut self) -> Option<Finding> {
        loop {
            match self.next_line()? {
                ParsedLine::Finding(f) => return Some(f),
                ParsedLine::Skipped(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn finding(line: &str) -> Finding {
        match parse_line(line) {
            ParsedLine::Finding(f) => f,
            other => panic!("expected finding for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_clang_tidy_warning() {
        let f = finding(
            "src/io.c:31:5: warning: the value returned by this function should be used [bugprone-unused-return-value]",
        );
        assert_eq!(f.file, PathBuf::from("src/io.c"));
        assert_eq!((f.line, f.column), (31, 5));
        assert_eq!(f.tool_severity, "warning");
        assert_eq!(f.check_id, "bugprone-unused-return-value");
        assert_eq!(f.message, "the value returned by this function should be used");
    }

    #[test]
    fn test_clang_format_violation() {
        let f = finding("examples/violations.c:183:20: warning: code should be clang-formatted [-Wclang-format-violations]");
        assert_eq!(f.check_id, "-Wclang-format-violations");
    }

    #[test]
    fn test_warnings_as_errors_marker_is_ignored() {
        let f = finding("a.c:1:2: error: moved-from object used [bugprone-use-after-move,-warnings-as-errors]");
        assert_eq!(f.tool_severity, "error");
        assert_eq!(f.check_id, "bugprone-use-after-move");
        assert_eq!(
            parse_line("a.c:1:2: error: x [-warnings-as-errors]"),
            ParsedLine::Skipped(SkipReason::NoCheckId)
        );
    }

    #[test]
    fn test_message_with_brackets_and_windows_path() {
        let f = finding(r"C:\work\a.c:7:9: warning: index 'buf[10]' past end [clang-analyzer-security.ArrayBound]");
        assert_eq!(f.file, PathBuf::from(r"C:\work\a.c"));
        assert_eq!(f.message, "index 'buf[10]' past end");
        assert_eq!(f.check_id, "clang-analyzer-security.ArrayBound");
    }

    #[test]
    fn test_non_diagnostic_lines_are_skipped() {
        assert_eq!(parse_line("   \r\n"), ParsedLine::Skipped(SkipReason::Blank));
        assert_eq!(
            parse_line("12 warnings generated."),
            ParsedLine::Skipped(SkipReason::NoLocation)
        );
        assert_eq!(
            parse_line("a.c:3:1: note: previous declaration is here"),
            ParsedLine::Skipped(SkipReason::NoCheckId)
        );
        assert_eq!(
            parse_line("a.c:99999999999:1: warning: huge [x-y]"),
            ParsedLine::Skipped(SkipReason::BadNumber)
        );
    }

    #[test]
    fn test_stream_preserves_order_and_tallies_unparsed() {
        let out = b"Running clang-tidy...\n\
a.c:1:1: warning: first [cert-err33-c]\r\n\
    fread(buf, 1, 100, f);\n\
\n\
a.c:9:3: warning: second [misc-unused-parameters]\n\
2 warnings generated.";
        let mut parser = DiagnosticParser::new(Cursor::new(&out[..]));
        let ids: Vec<String> = parser.by_ref().map(|f| f.check_id).collect();
        assert_eq!(ids, vec!["cert-err33-c", "misc-unused-parameters"]);
        assert_eq!(parser.lines_read(), 6);
        assert_eq!(parser.unparsed_lines(), 4);
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let out = b"b\xffd.c:2:4: warning: bad bytes [readability-foo]\n";
        let findings: Vec<Finding> = DiagnosticParser::new(Cursor::new(&out[..])).collect();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check_id, "readability-foo");
    }
}
