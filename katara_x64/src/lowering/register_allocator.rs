//! Bridges the architecture-independent `katara_regalloc` coloring to
//! concrete x86-64 registers. `examples/original_source/src/x86_64/
//! ir_translator/register_allocator.h` declares this seam
//! (`ColorAndSizeToOperand`/`OperandToColor`/`AllocateRegistersInFunc`)
//! but its `.cc` never made it into the retrieval pack; the bodies below
//! are written fresh against that header's shape and spec.md §4.6/§9.

use crate::abi;
use crate::ops::{Reg, Size, RM};
use katara_analysis::InterferenceGraph;
use katara_atomics::IntBinaryOp;
use katara_common::{KataraError, KataraResult};
use katara_ir::{Function, InstrKind, ValueNum};
use hashbrown::HashMap;
use katara_regalloc::{allocate, AllocatorConfig, Color, Coloring};

pub fn color_and_size_to_operand(color: Color, size: Size) -> KataraResult<RM> {
    if color as usize >= abi::NUM_GP_REGISTERS {
        return Err(KataraError::register_allocation(format!("color {color} has no register mapping (spill)")));
    }
    let reg = Reg::new(size, abi::color_to_hardware_reg(color))?;
    Ok(RM::Reg(reg))
}

pub fn operand_to_color(reg: Reg) -> Color {
    abi::hardware_reg_to_color(reg.index())
}

/// Sentinel value numbers used to pin caller-saved registers as
/// precolored graph nodes at `Call` sites, one per caller-saved
/// register, never colliding with a real `ValueNum` because `katara_ir`
/// counters start at 0 and a function would need to define
/// `u32::MAX - 32` values to reach this range.
fn clobber_sentinel(reg: u8) -> ValueNum {
    ValueNum(u32::MAX - 32 + reg as u32)
}

/// Adds an interference edge from the given clobbered hardware registers
/// to every value live at `idx` within `block_live` other than `results`
/// (the instruction's own defined values, which are free to reuse a
/// clobbered register once the clobbering instruction has executed), and
/// records those registers' forced colors in `precolored` (spec.md §4.6,
/// third bullet: "an instruction that clobbers fixed registers...
/// represented as extra interference edges").
fn clobber_registers_live_at(
    block_live: &katara_analysis::BlockLiveRanges,
    idx: usize,
    results: &[ValueNum],
    clobbered: &[u8],
    graph: &mut InterferenceGraph,
    precolored: &mut HashMap<ValueNum, Color>,
) {
    let live_here: Vec<ValueNum> = block_live.live_set_at(idx).filter(|v| !results.contains(v)).collect();
    for &reg in clobbered {
        let sentinel = clobber_sentinel(reg);
        precolored.insert(sentinel, abi::hardware_reg_to_color(reg));
        graph.add_edges_between(sentinel, live_here.iter().copied());
    }
}

/// Adds interference for every instruction in `func` that clobbers fixed
/// hardware registers: a `Call` clobbers every caller-saved register; an
/// integer `Div`/`Rem` clobbers `RAX:RDX` (the dividend/quotient and
/// remainder registers x86-64's `div`/`idiv` hard-codes); `Mul` is lowered
/// through the same one-operand form (`katara_x64`'s `Instr::Unary` has
/// no two-operand `imul`), so it clobbers `RAX:RDX` too; `IntShift`
/// clobbers `RCX` (the shift count is always read from `CL`).
fn add_clobber_interference(
    func: &Function,
    live_ranges: &katara_analysis::LiveRanges,
    graph: &mut InterferenceGraph,
) -> HashMap<ValueNum, Color> {
    let mut precolored = HashMap::new();
    for block in func.blocks() {
        let Some(block_live) = live_ranges.block(block.number) else { continue };
        for (idx, instr) in block.instrs().iter().enumerate() {
            let clobbered: Vec<u8> = match &instr.kind {
                InstrKind::Call { .. } => abi::CALLER_SAVED.to_vec(),
                InstrKind::IntBinary { op: IntBinaryOp::Div | IntBinaryOp::Rem | IntBinaryOp::Mul, .. } => {
                    vec![abi::RESULT_REGS[0], abi::RESULT_REGS[1]]
                }
                InstrKind::IntShift { .. } => vec![1], // rcx
                _ => continue,
            };
            let results = instr.defined_values();
            clobber_registers_live_at(block_live, idx, &results, &clobbered, graph, &mut precolored);
        }
    }
    precolored
}

/// Colors every value in `func`: parameters are pinned to their
/// System-V argument registers, return arguments to the result
/// registers, values live across a call or a `div`/`rem` are kept off
/// the registers those instructions clobber, and everything else is
/// left to `katara_regalloc::allocate`.
pub fn allocate_registers_in_func(
    func: &Function,
    live_ranges: &katara_analysis::LiveRanges,
    graph: &mut InterferenceGraph,
) -> KataraResult<Coloring> {
    let mut precolored = add_clobber_interference(func, live_ranges, graph);
    for (i, &param) in func.params().iter().enumerate() {
        if i >= abi::ARG_REGS.len() {
            return Err(KataraError::register_allocation(
                "function has more integer parameters than argument registers",
            ));
        }
        precolored.insert(param, abi::hardware_reg_to_color(abi::ARG_REGS[i]));
    }
    for block in func.blocks() {
        for instr in block.instrs() {
            let InstrKind::Return { args } = &instr.kind else { continue };
            for (i, arg) in args.iter().enumerate() {
                let Some(number) = arg.as_computed_number() else { continue };
                if i >= abi::RESULT_REGS.len() {
                    return Err(KataraError::register_allocation(
                        "function returns more values than result registers",
                    ));
                }
                precolored.insert(number, abi::hardware_reg_to_color(abi::RESULT_REGS[i]));
            }
        }
    }
    let config = AllocatorConfig { num_registers: abi::NUM_GP_REGISTERS };
    Ok(allocate(graph, &precolored, &config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::regs;

    #[test]
    fn color_zero_is_rax() {
        let rm = color_and_size_to_operand(0, Size::K64).unwrap();
        assert_eq!(rm, RM::Reg(regs::rax()));
    }

    #[test]
    fn spill_colors_are_rejected() {
        assert!(color_and_size_to_operand(abi::NUM_GP_REGISTERS as Color, Size::K64).is_err());
    }

    #[test]
    fn operand_to_color_round_trips() {
        let color = operand_to_color(regs::r9());
        assert_eq!(color_and_size_to_operand(color, Size::K64).unwrap(), RM::Reg(regs::r9()));
    }
}
