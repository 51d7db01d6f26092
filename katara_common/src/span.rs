//! Source positions and ranges shared by the scanner, parser and verifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single position in a source text: 1-based line/column plus a 0-based
/// byte offset. The byte offset is what the scanner actually advances;
/// line/column are tracked alongside it for human-readable diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    pub const fn start() -> Self {
        Self { line: 1, column: 1, offset: 0 }
    }

    /// Advances the position past a single byte, updating line/column
    /// bookkeeping. `\n` resets the column and bumps the line.
    pub fn advance(self, byte: u8) -> Self {
        if byte == b'\n' {
            Self { line: self.line + 1, column: 1, offset: self.offset + 1 }
        } else {
            Self { line: self.line, column: self.column + 1, offset: self.offset + 1 }
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open `[start, end)` range of source positions. Every token and
/// every parsed entity (instruction, block, function, value, type) carries
/// one of these so diagnostics can point at the exact span responsible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A span with no extent, used for synthesized entities that have no
    /// corresponding source text (e.g. implicitly-generated instructions).
    pub fn synthetic() -> Self {
        Self { start: Position::start(), end: Position::start() }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
