//! Severity-tagged diagnostic messages shared by the scanner, parser and
//! verifier. `Diagnostic` is the generic shell; each producing component
//! wraps it with its own closed `*Kind` enum (see `katara_ir::issues`).

use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// A well-formedness violation; the program is rejected.
    Error,
    /// A structural violation so severe that further checks of the same
    /// scope would be meaningless (e.g. a block without a terminator).
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A generic diagnostic message with a severity and a primary span, plus
/// any number of secondary spans locating other objects involved (e.g. a
/// value's earlier definition, when reporting a duplicate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub related_spans: Vec<Span>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, span: Span) -> Self {
        Self { severity, message: message.into(), span, related_spans: Vec::new() }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, message, span)
    }

    pub fn fatal(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Fatal, message, span)
    }

    pub fn with_related(mut self, span: Span) -> Self {
        self.related_spans.push(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.span)
    }
}
