//! Structured diagnostics shared by every compiler phase.
//!
//! Generalizes the lint pass's `LintDiagnostic`/`Severity`/`format_diagnostics`
//! trio into something every phase (preprocessor, lexer, parser, semantic
//! analysis, codegen) appends to through a single sink, per ERROR HANDLING
//! DESIGN in SPEC_FULL.md.

use std::fmt;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Which phase raised a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Io,
    Preprocess,
    Lex,
    Parse,
    Semantic,
    Codegen,
    Oom,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Io => "io",
            Kind::Preprocess => "preprocess",
            Kind::Lex => "lex",
            Kind::Parse => "parse",
            Kind::Semantic => "semantic",
            Kind::Codegen => "codegen",
            Kind::Oom => "oom",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    fn label(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// SGR color code used when output is colorized.
    fn color_code(&self) -> &'static str {
        match self {
            Severity::Note => "36",    // cyan
            Severity::Warning => "33", // yellow
            Severity::Error => "31",   // red
        }
    }
}

/// A single location-bearing diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: Kind,
    pub severity: Severity,
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: Kind,
        severity: Severity,
        file: impl Into<PathBuf>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            kind,
            severity,
            file: file.into(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn error(kind: Kind, file: impl Into<PathBuf>, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, file, line, column, message)
    }

    pub fn warning(kind: Kind, file: impl Into<PathBuf>, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, file, line, column, message)
    }

    /// Format as `<file>:<line>:<column>: <severity>: <message>` per SPEC_FULL.md §7.
    /// `color` forces ANSI color on or off; `None` autodetects via `IsTerminal`.
    pub fn format(&self, color: Option<bool>) -> String {
        let use_color = color.unwrap_or_else(|| std::io::stderr().is_terminal());
        let plain = format!(
            "{}:{}:{}: {}: {}",
            self.file.display(),
            self.line + 1,
            self.column + 1,
            self.severity.label(),
            self.message
        );
        if use_color {
            format!(
                "\x1b[1m{}:{}:{}: \x1b[{}m{}\x1b[0m\x1b[1m: {}\x1b[0m",
                self.file.display(),
                self.line + 1,
                self.column + 1,
                self.severity.color_code(),
                self.severity.label(),
                self.message
            )
        } else {
            plain
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(Some(false)))
    }
}

/// Accumulates diagnostics for the lifetime of a single `Session`.
///
/// Non-fatal errors are appended and the phase continues, so as many real
/// problems as possible surface in one run; `has_errors` decides whether the
/// translation unit ultimately failed.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    pub fn error(&mut self, kind: Kind, file: impl Into<PathBuf>, line: usize, column: usize, message: impl Into<String>) {
        self.push(Diagnostic::error(kind, file, line, column, message));
    }

    pub fn warning(&mut self, kind: Kind, file: impl Into<PathBuf>, line: usize, column: usize, message: impl Into<String>) {
        self.push(Diagnostic::warning(kind, file, line, column, message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Render every diagnostic, one per line, in emission order.
    pub fn format_all(&self, color: Option<bool>) -> String {
        let mut out = String::new();
        for d in &self.diagnostics {
            out.push_str(&d.format(color));
            out.push('\n');
        }
        out
    }
}

/// Convenience used by phases that short-circuit on the first error: a
/// failure indicator distinct from "no diagnostics were produced at all".
pub type PhaseResult<T> = Result<T, Diagnostic>;

pub fn io_error(path: &Path, err: &std::io::Error) -> Diagnostic {
    Diagnostic::error(Kind::Io, path, 0, 0, format!("{}: {}", path.display(), err))
}
