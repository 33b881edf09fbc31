//! Diagnostic records for the Mica checker.
//!
//! A [`Diagnostic`] is one reported problem: an optional file, a position,
//! a severity, and the message text, possibly with indented continuation
//! lines that must stay attached to their header under sorting.
//!
//! The ordering rules here are part of the incremental engine's contract:
//! an incremental run must present its merged diagnostics in exactly the
//! order a cold run would, which [`sort_messages_preserving_file_order`]
//! guarantees.

mod sort;

pub use sort::sort_messages_preserving_file_order;

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

/// One reported problem.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Source file, when the problem is file-scoped. File-less
    /// diagnostics sort after all file-scoped ones.
    pub path: Option<String>,
    /// 1-based line; `-1` when unknown.
    pub line: i64,
    /// 1-based column; `-1` when unknown.
    pub column: i64,
    pub severity: Severity,
    pub message: String,
    /// Continuation lines rendered (indented) directly under the header.
    pub extra_lines: Vec<String>,
}

impl Diagnostic {
    pub fn error(path: &str, line: i64, message: impl Into<String>) -> Self {
        Diagnostic {
            path: Some(path.to_owned()),
            line,
            column: -1,
            severity: Severity::Error,
            message: message.into(),
            extra_lines: Vec::new(),
        }
    }

    pub fn note(path: &str, line: i64, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Note,
            ..Diagnostic::error(path, line, message)
        }
    }

    pub fn global(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            path: None,
            line: -1,
            column: -1,
            severity,
            message: message.into(),
            extra_lines: Vec::new(),
        }
    }

    /// Render the header line and continuation lines.
    pub fn render(&self) -> Vec<String> {
        let header = match (&self.path, self.line, self.column) {
            (Some(path), line, column) if line >= 0 && column >= 0 => {
                format!("{path}:{line}:{column}: {}: {}", self.severity.as_str(), self.message)
            }
            (Some(path), line, _) if line >= 0 => {
                format!("{path}:{line}: {}: {}", self.severity.as_str(), self.message)
            }
            (Some(path), _, _) => {
                format!("{path}: {}: {}", self.severity.as_str(), self.message)
            }
            (None, _, _) => format!("{}: {}", self.severity.as_str(), self.message),
        };
        let mut lines = vec![header];
        for extra in &self.extra_lines {
            lines.push(format!("    {extra}"));
        }
        lines
    }
}

/// Count errors and distinct files for the summary line.
pub fn count_stats(diagnostics: &[Diagnostic]) -> (usize, usize) {
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let mut files: Vec<&str> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .filter_map(|d| d.path.as_deref())
        .collect();
    files.sort_unstable();
    files.dedup();
    (errors, files.len())
}

/// The terminal summary line for a run that found problems.
pub fn format_error_summary(n_errors: usize, n_error_files: usize, n_sources: usize) -> String {
    format!(
        "Found {} error{} in {} file{} (checked {} source file{})",
        n_errors,
        plural(n_errors),
        n_error_files,
        plural(n_error_files),
        n_sources,
        plural(n_sources)
    )
}

/// The terminal summary line for a clean run.
pub fn format_success_summary(n_sources: usize) -> String {
    format!(
        "Success: no issues found in {} source file{}",
        n_sources,
        plural(n_sources)
    )
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
