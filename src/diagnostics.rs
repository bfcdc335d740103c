use std::fmt;

use thiserror::Error;

/// A character position within an expression, used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    pub const fn start() -> Self {
        Self::new(0, 1, 1)
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::start()
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Parser,
    UnboundVariable,
    TypeMismatch,
    UnknownOperator,
    Runtime,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticKind::Parser => "parser error",
            DiagnosticKind::UnboundVariable => "unbound variable",
            DiagnosticKind::TypeMismatch => "type mismatch",
            DiagnosticKind::UnknownOperator => "unknown op",
            DiagnosticKind::Runtime => "runtime error",
        };
        f.write_str(label)
    }
}

/// Rich diagnostic information surfaced to the operator.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub position: Option<SourcePosition>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            notes: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.kind)?;
        if let Some(position) = self.position {
            write!(f, "line {}, column {}: ", position.line, position.column)?;
        }
        f.write_str(&self.message)?;
        for note in &self.notes {
            write!(f, " (note: {note})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the crawlspace engine and its sessions.
#[derive(Debug, Error)]
pub enum CrawlspaceError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlspaceError {
    pub fn unbound(message: impl Into<String>) -> Self {
        Diagnostic::new(DiagnosticKind::UnboundVariable, message).into()
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Diagnostic::new(DiagnosticKind::TypeMismatch, message).into()
    }

    pub fn unknown_operator(message: impl Into<String>) -> Self {
        Diagnostic::new(DiagnosticKind::UnknownOperator, message).into()
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Diagnostic::new(DiagnosticKind::Runtime, message).into()
    }

    /// The diagnostic kind, if this error came from the language engine.
    pub fn kind(&self) -> Option<DiagnosticKind> {
        match self {
            CrawlspaceError::Diagnostic(diag) => Some(diag.kind),
            CrawlspaceError::Io(_) => None,
        }
    }

    /// Attaches `position` unless the diagnostic already carries one.
    pub fn at(self, position: SourcePosition) -> Self {
        match self {
            CrawlspaceError::Diagnostic(diag) if diag.position.is_none() => {
                CrawlspaceError::Diagnostic(diag.with_position(position))
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CrawlspaceError>;
