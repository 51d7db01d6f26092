//! Verifier diagnostics. `IssueKind` is the closed enumeration of
//! well-formedness violations the checker in `crate::verifier` can report;
//! `Issue` pairs a kind with the scope it was found in, the spans of the
//! objects involved, and a human-readable message (spec.md §4.4).

use crate::representation::ids::{BlockNum, FuncNum, ValueNum};
use katara_common::{Severity, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What part of the program an issue was found in. Used by drivers to
/// group/sort issues; carries no behavior of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Program,
    Function(FuncNum),
    Block(FuncNum, BlockNum),
    Instruction(FuncNum, BlockNum, usize),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Program => write!(f, "program"),
            Scope::Function(func) => write!(f, "{}", func),
            Scope::Block(func, block) => write!(f, "{}:{}", func, block),
            Scope::Instruction(func, block, idx) => write!(f, "{}:{}#{}", func, block, idx),
        }
    }
}

/// The closed set of well-formedness violations the verifier can report
/// (spec.md §3 invariants 1-9, grounded on the original checker's check
/// functions per SPEC_FULL.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    ValueUsedInMultipleFuncs,
    ValueNumberUsedTwice,
    ValueIsParamAndInstrResult,
    ValueDefinedByMultipleInstrs,
    UnknownValue,
    InheritedValueOutsidePhi,
    UseNotDominatedByDefinition,
    EntryBlockHasParent,
    NonEntryBlockHasNoParents,
    EmptyBlock,
    MissingTerminator,
    UnexpectedTerminator,
    PhiNotAtBlockStart,
    PhiMissingArgumentForParent,
    PhiExtraArgumentForParent,
    TerminatorSuccessorMismatch,
    TypeMismatch,
    CallArgCountMismatch,
    CallCalleeNotFunctionTyped,
}

impl IssueKind {
    /// Structural issues severe enough that continuing to check the same
    /// block/function would produce meaningless follow-on noise (spec.md
    /// §4.4: "each issue carries... a severity"). The checker still moves
    /// on to the next function/block regardless (§4.4 failure mode).
    pub fn default_severity(self) -> Severity {
        match self {
            IssueKind::EmptyBlock | IssueKind::MissingTerminator | IssueKind::UnexpectedTerminator => {
                Severity::Fatal
            }
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub scope: Scope,
    pub spans: Vec<Span>,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, scope: Scope, spans: Vec<Span>, message: impl Into<String>) -> Self {
        Self { severity: kind.default_severity(), kind, scope, spans, message: message.into() }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.severity, self.scope, self.message)?;
        if let Some(first) = self.spans.first() {
            write!(f, " ({})", first)?;
        }
        Ok(())
    }
}

/// References a value number's use/definition for diagnostics that need to
/// point at more than one site (spec.md's "value defined by two
/// instructions" etc. report both definitions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvolvedValue {
    pub func: FuncNum,
    pub value: ValueNum,
}

/// The debug helper from spec.md §4.4's "failure mode": converts a
/// non-empty issue list into a fatal process abort. Never called by the
/// verifier itself; a driver opts into it.
pub fn fail_if_any(issues: &[Issue]) {
    if !issues.is_empty() {
        let mut message = format!("verification failed with {} issue(s):\n", issues.len());
        for issue in issues {
            message.push_str(&issue.to_string());
            message.push('\n');
        }
        panic!("{}", message);
    }
}
