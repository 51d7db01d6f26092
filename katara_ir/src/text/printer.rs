//! Renders a `Program` back into the textual format `text::parser` accepts.
//! Printer output is the grammar: every value occurrence (definition or
//! use) carries its type, so the parser never needs a forward-reference
//! pass over a function body (spec.md §8: "`Printer(P)` parses back to a
//! program equal to `P`").

use crate::representation::block::Block;
use crate::representation::function::Function;
use crate::representation::instr::{Instr, InstrKind};
use crate::representation::types::{Type, TypeTable};
use crate::representation::value::{Constant, Value};
use crate::Program;
use std::fmt::Write;

pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    let mut funcs: Vec<_> = program.funcs().collect();
    funcs.sort_by_key(|f| f.number.0);
    for func in funcs {
        print_function(&mut out, &program.types, func, program.entry_func() == Some(func.number));
        out.push('\n');
    }
    out
}

fn print_function(out: &mut String, types: &TypeTable, func: &Function, is_entry: bool) {
    out.push_str("@func ");
    if is_entry {
        out.push_str("entry ");
    }
    let _ = write!(out, "{}", func.number.0);
    if let Some(name) = &func.name {
        let _ = write!(out, " {}", name);
    }
    out.push_str(" (");
    for (i, ty) in func.param_types.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", type_name(*ty, types));
    }
    out.push_str(") => (");
    for (i, ty) in func.result_types.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", type_name(*ty, types));
    }
    out.push_str(") {\n");
    let mut blocks: Vec<&Block> = func.blocks().collect();
    blocks.sort_by_key(|b| b.number.0);
    for block in blocks {
        print_block(out, types, block, func.entry_block() == Some(block.number));
    }
    out.push_str("}\n");
}

fn print_block(out: &mut String, types: &TypeTable, block: &Block, is_entry: bool) {
    let _ = write!(out, "  {}", block.number);
    if is_entry {
        out.push_str(" entry");
    }
    out.push_str(": {\n");
    for instr in block.instrs() {
        out.push_str("    ");
        print_instr(out, types, instr);
        out.push('\n');
    }
    out.push_str("  }\n");
}

fn print_instr(out: &mut String, types: &TypeTable, instr: &Instr) {
    let defined = instr.defined_values();
    if !defined.is_empty() {
        for (i, value) in defined.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let ty = instr.result_types.get(i).copied().unwrap_or(Type::Bool);
            let _ = write!(out, "%{}:{}", value.0, type_name(ty, types));
        }
        out.push_str(" = ");
    }
    match &instr.kind {
        InstrKind::Mov { origin, .. } => {
            let _ = write!(out, "mov {}", print_value(origin, types));
        }
        InstrKind::Phi { args, .. } => {
            let _ = write!(out, "phi ({})", join_values(args, types));
        }
        InstrKind::Conversion { operand, .. } => {
            let _ = write!(out, "conv {}", print_value(operand, types));
        }
        InstrKind::BoolNot { operand, .. } => {
            let _ = write!(out, "bnot {}", print_value(operand, types));
        }
        InstrKind::BoolBinary { op, lhs, rhs, .. } => {
            let _ = write!(out, "{} {}, {}", op.mnemonic(), print_value(lhs, types), print_value(rhs, types));
        }
        InstrKind::IntUnary { op, operand, .. } => {
            let _ = write!(out, "{} {}", op.mnemonic(), print_value(operand, types));
        }
        InstrKind::IntCompare { op, lhs, rhs, .. } => {
            let _ = write!(out, "{} {}, {}", op.mnemonic(), print_value(lhs, types), print_value(rhs, types));
        }
        InstrKind::IntBinary { op, lhs, rhs, .. } => {
            let _ = write!(out, "{} {}, {}", op.mnemonic(), print_value(lhs, types), print_value(rhs, types));
        }
        InstrKind::IntShift { op, operand, amount, .. } => {
            let _ = write!(out, "{} {}, {}", op.mnemonic(), print_value(operand, types), print_value(amount, types));
        }
        InstrKind::PointerOffset { pointer, offset, .. } => {
            let _ = write!(out, "pcopy {}, {}", print_value(pointer, types), offset);
        }
        InstrKind::NilTest { tested, .. } => {
            let _ = write!(out, "niltest {}", print_value(tested, types));
        }
        InstrKind::Malloc { size, .. } => {
            let _ = write!(out, "malloc {}", print_value(size, types));
        }
        InstrKind::Free { pointer } => {
            let _ = write!(out, "free {}", print_value(pointer, types));
        }
        InstrKind::Load { address, .. } => {
            let _ = write!(out, "load {}", print_value(address, types));
        }
        InstrKind::Store { address, value } => {
            let _ = write!(out, "store {}, {}", print_value(address, types), print_value(value, types));
        }
        InstrKind::Jump { target } => {
            let _ = write!(out, "jmp {}", target);
        }
        InstrKind::JumpCond { condition, true_target, false_target } => {
            let _ = write!(out, "jcc {}, {}, {}", print_value(condition, types), true_target, false_target);
        }
        InstrKind::Call { callee, args, .. } => {
            let _ = write!(out, "call {}({})", print_value(callee, types), join_values(args, types));
        }
        InstrKind::Return { args } => {
            let _ = write!(out, "ret {}", join_values(args, types));
        }
        InstrKind::Ext(ext) => {
            let _ = write!(out, "{} {}", ext.mnemonic, join_values(&ext.args, types));
        }
    }
}

fn join_values(values: &[Value], types: &TypeTable) -> String {
    values.iter().map(|v| print_value(v, types)).collect::<Vec<_>>().join(", ")
}

fn print_value(value: &Value, types: &TypeTable) -> String {
    match value {
        Value::Constant(c) => print_constant(c),
        Value::Computed { number, ty } => format!("%{}:{}", number.0, type_name(*ty, types)),
        Value::Inherited { value, predecessor } => format!("{}@{}", print_value(value, types), predecessor),
    }
}

fn print_constant(c: &Constant) -> String {
    match c {
        Constant::Bool(b) => katara_atomics::bool_to_string(*b).to_string(),
        Constant::Int(int) => format!("{}:{}", int.to_string_radix(10), int.ty()),
        Constant::Pointer(None) => "nil:ptr".to_string(),
        Constant::Pointer(Some(addr)) => format!("0x{:x}:ptr", addr),
        Constant::Func(None) => "nil:func".to_string(),
        Constant::Func(Some(num)) => format!("{}:func", num.0),
    }
}

/// Renders `ty` the way the parser expects it spelled, resolving `Func`
/// through `types` into an inline `(params) => (results)` signature rather
/// than a bare `TypeId` (spec.md's grammar has no syntax for referring to
/// an interned type by number; every occurrence is spelled out in full and
/// re-interned by the parser).
pub fn type_name(ty: Type, types: &TypeTable) -> String {
    match ty {
        Type::Bool => "bool".to_string(),
        Type::Int(int_ty) => int_ty.name().to_string(),
        Type::Pointer => "ptr".to_string(),
        Type::Func(id) => {
            let sig = types.get(id);
            let params = sig.params.iter().map(|t| type_name(*t, types)).collect::<Vec<_>>().join(", ");
            let results = sig.results.iter().map(|t| type_name(*t, types)).collect::<Vec<_>>().join(", ");
            format!("func({}) => ({})", params, results)
        }
    }
}
