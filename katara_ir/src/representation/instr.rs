//! IR instructions. Every variant declares which values it defines and
//! which it uses; the liveness/interference analyses and the verifier
//! both drive off those two methods rather than matching on the variant
//! themselves.

use crate::representation::ids::{BlockNum, ValueNum};
use crate::representation::types::Type;
use crate::representation::value::Value;
use katara_atomics::{BoolBinaryOp, IntBinaryOp, IntCompareOp, IntShiftOp, IntUnaryOp};
use katara_common::Span;
use serde::{Deserialize, Serialize};

/// An opaque extension instruction (shared/unique pointer lifecycle,
/// string operations, panics) reserved for the source-language runtime.
/// The core parses and carries these through unexamined; only the
/// extension-specific checker (out of scope here) gives them meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtInstr {
    pub mnemonic: String,
    pub results: Vec<ValueNum>,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrKind {
    Mov { result: ValueNum, origin: Value },
    Phi { result: ValueNum, args: Vec<Value> },
    Conversion { result: ValueNum, operand: Value },
    BoolNot { result: ValueNum, operand: Value },
    BoolBinary { op: BoolBinaryOp, result: ValueNum, lhs: Value, rhs: Value },
    IntUnary { op: IntUnaryOp, result: ValueNum, operand: Value },
    IntCompare { op: IntCompareOp, result: ValueNum, lhs: Value, rhs: Value },
    IntBinary { op: IntBinaryOp, result: ValueNum, lhs: Value, rhs: Value },
    IntShift { op: IntShiftOp, result: ValueNum, operand: Value, amount: Value },
    PointerOffset { result: ValueNum, pointer: Value, offset: i64 },
    NilTest { result: ValueNum, tested: Value },
    Malloc { result: ValueNum, size: Value },
    Free { pointer: Value },
    Load { result: ValueNum, address: Value },
    Store { address: Value, value: Value },
    Jump { target: BlockNum },
    JumpCond { condition: Value, true_target: BlockNum, false_target: BlockNum },
    Call { callee: Value, results: Vec<ValueNum>, args: Vec<Value> },
    Return { args: Vec<Value> },
    Ext(ExtInstr),
}

/// A positioned instruction: the tagged `InstrKind` plus the source span
/// the parser recorded for it, so verifier diagnostics point at the
/// responsible token range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instr {
    pub kind: InstrKind,
    pub span: Span,
    /// The result type recorded for each defined value, parallel to
    /// `defined_values()`. Kept alongside the instruction (rather than
    /// re-derived) because e.g. `Call` results have no operand to infer a
    /// type from locally — it comes from the callee's signature at parse
    /// time.
    pub result_types: Vec<Type>,
}

impl Instr {
    pub fn new(kind: InstrKind, span: Span, result_types: Vec<Type>) -> Self {
        Self { kind, span, result_types }
    }

    /// Whether this instruction is a block terminator (spec.md §3: "the
    /// last instruction is the block's terminator").
    pub fn is_terminator(&self) -> bool {
        matches!(self.kind, InstrKind::Jump { .. } | InstrKind::JumpCond { .. } | InstrKind::Return { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstrKind::Phi { .. })
    }

    /// The successor block numbers a terminator transfers control to, in
    /// a deterministic order. Empty for non-terminators.
    pub fn successors(&self) -> Vec<BlockNum> {
        match &self.kind {
            InstrKind::Jump { target } => vec![*target],
            InstrKind::JumpCond { true_target, false_target, .. } => vec![*true_target, *false_target],
            _ => Vec::new(),
        }
    }

    /// Value numbers defined by this instruction, in a deterministic
    /// (declaration) order.
    pub fn defined_values(&self) -> Vec<ValueNum> {
        match &self.kind {
            InstrKind::Mov { result, .. }
            | InstrKind::Phi { result, .. }
            | InstrKind::Conversion { result, .. }
            | InstrKind::BoolNot { result, .. }
            | InstrKind::BoolBinary { result, .. }
            | InstrKind::IntUnary { result, .. }
            | InstrKind::IntCompare { result, .. }
            | InstrKind::IntBinary { result, .. }
            | InstrKind::IntShift { result, .. }
            | InstrKind::PointerOffset { result, .. }
            | InstrKind::NilTest { result, .. }
            | InstrKind::Malloc { result, .. }
            | InstrKind::Load { result, .. } => vec![*result],
            InstrKind::Call { results, .. } => results.clone(),
            InstrKind::Ext(ext) => ext.results.clone(),
            InstrKind::Free { .. }
            | InstrKind::Store { .. }
            | InstrKind::Jump { .. }
            | InstrKind::JumpCond { .. }
            | InstrKind::Return { .. } => Vec::new(),
        }
    }

    /// Operand values used by this instruction, in a deterministic order.
    /// For `Phi`, these are `Inherited` values (one per predecessor).
    pub fn used_values(&self) -> Vec<&Value> {
        match &self.kind {
            InstrKind::Mov { origin, .. } => vec![origin],
            InstrKind::Phi { args, .. } => args.iter().collect(),
            InstrKind::Conversion { operand, .. } => vec![operand],
            InstrKind::BoolNot { operand, .. } => vec![operand],
            InstrKind::BoolBinary { lhs, rhs, .. } => vec![lhs, rhs],
            InstrKind::IntUnary { operand, .. } => vec![operand],
            InstrKind::IntCompare { lhs, rhs, .. } => vec![lhs, rhs],
            InstrKind::IntBinary { lhs, rhs, .. } => vec![lhs, rhs],
            InstrKind::IntShift { operand, amount, .. } => vec![operand, amount],
            InstrKind::PointerOffset { pointer, .. } => vec![pointer],
            InstrKind::NilTest { tested, .. } => vec![tested],
            InstrKind::Malloc { size, .. } => vec![size],
            InstrKind::Free { pointer } => vec![pointer],
            InstrKind::Load { address, .. } => vec![address],
            InstrKind::Store { address, value } => vec![address, value],
            InstrKind::Call { callee, args, .. } => {
                let mut values = vec![callee];
                values.extend(args.iter());
                values
            }
            InstrKind::Return { args } => args.iter().collect(),
            InstrKind::Jump { .. } => Vec::new(),
            InstrKind::JumpCond { condition, .. } => vec![condition],
            InstrKind::Ext(ext) => ext.args.iter().collect(),
        }
    }
}
