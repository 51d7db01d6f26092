//! Resolves an IR `Value` to a concrete x86-64 `Operand`: a constant
//! becomes an immediate (or a symbolic `FuncRef`), a computed value
//! becomes wherever the register allocator put it — a hardware register
//! or a stack-frame spill slot. Grounded on `examples/original_source/
//! src/x86_64/ir_translator/operand_translator.cc`, collapsed with the
//! frame-layout bookkeeping `func.cc`'s `AllocateStackSlot` does, since
//! both concerns are small enough to share one file here.

use crate::lowering::register_allocator::color_and_size_to_operand;
use crate::lowering::size_translator::size_of_type;
use crate::ops::{regs, FuncRef, Imm, Mem, Operand, Size};
use katara_common::{KataraError, KataraResult};
use katara_ir::{Constant, FuncNum, Value};
use katara_regalloc::Coloring;

/// The stack-frame geometry a function's lowering has settled on: which
/// callee-saved registers the prologue pushes (fixing how far below
/// `rbp` the spill area starts) and how many spill slots are in use.
/// Grounded on spec.md §4.10's "frame layout" bullet: every spill slot
/// is one machine word, addressed `rbp`-relative, below the pushed
/// callee-saved registers.
#[derive(Debug, Clone, Default)]
pub struct FrameLayout {
    pub callee_saved_used: Vec<u8>,
    pub num_spill_slots: usize,
}

impl FrameLayout {
    /// The memory operand for spill slot `slot` (0-based, allocator
    /// colors `>= NUM_GP_REGISTERS` map to `slot = color -
    /// NUM_GP_REGISTERS`): addressed below `rbp`, past the pushed
    /// callee-saved registers.
    pub fn spill_mem(&self, slot: usize, size: Size) -> KataraResult<Mem> {
        let pushed_bytes = self.callee_saved_used.len() as i64 * 8;
        let disp = -(pushed_bytes + (slot as i64 + 1) * 8);
        let disp: i32 = disp
            .try_into()
            .map_err(|_| KataraError::encoding("stack frame too large for a 32-bit displacement"))?;
        Mem::base_disp(size, regs::rbp().index(), disp)
    }
}

/// Maps an allocator color to its concrete location: a hardware register
/// for colors within the allocator's register budget, a spill slot
/// otherwise.
pub fn location_for_color(
    color: katara_regalloc::Color,
    size: Size,
    frame: &FrameLayout,
) -> KataraResult<crate::ops::RM> {
    match color_and_size_to_operand(color, size) {
        Ok(rm) => Ok(rm),
        Err(_) => {
            let slot = color as usize - crate::abi::NUM_GP_REGISTERS;
            if slot >= frame.num_spill_slots {
                return Err(KataraError::register_allocation(format!(
                    "color {color} names spill slot {slot}, outside the frame's {} reserved slots",
                    frame.num_spill_slots
                )));
            }
            Ok(crate::ops::RM::Mem(frame.spill_mem(slot, size)?))
        }
    }
}

/// Maps a literal `Constant` to the operand that denotes it directly in
/// machine code: a sized immediate for `Bool`/`Int`/`Pointer`, and a
/// symbolic `FuncRef` for a known function constant (resolved later by
/// the `Linker`). A nil function constant has no address to reference
/// and lowers to a zero immediate instead, matching a nil pointer.
pub fn constant_to_operand(constant: Constant) -> KataraResult<Operand> {
    match constant {
        Constant::Bool(b) => Ok(Operand::Imm(Imm::new8(b as i8))),
        Constant::Int(int) => {
            let size = crate::lowering::size_translator::size_of_int_type(int.ty())?;
            Ok(Operand::Imm(match size {
                Size::K8 => Imm::new8(int.to_i64() as i8),
                Size::K16 => Imm::new16(int.to_i64() as i16),
                Size::K32 => Imm::new32(int.to_i64() as i32),
                Size::K64 => Imm::new64(int.to_i64()),
            }))
        }
        Constant::Pointer(None) => Ok(Operand::Imm(Imm::new64(0))),
        Constant::Pointer(Some(addr)) => Ok(Operand::Imm(Imm::new64(addr as i64))),
        Constant::Func(None) => Ok(Operand::Imm(Imm::new64(0))),
        Constant::Func(Some(num)) => Ok(Operand::FuncRef(func_ref_for(num))),
    }
}

/// The x86-64 `FuncRef` naming the same function as IR function number
/// `num`. Numbering is carried over identically: both spaces are dense,
/// monotonically-increasing, never-recycled counters over the same set
/// of functions (spec.md §4.2, §4.11).
pub fn func_ref_for(num: FuncNum) -> FuncRef {
    FuncRef(num.0)
}

/// Resolves an operand-position IR value (anything but a `Phi` argument,
/// which `instr_translator`'s phi lowering resolves per-predecessor
/// instead) to its x86-64 operand.
pub fn operand_for_value(value: &Value, coloring: &Coloring, frame: &FrameLayout) -> KataraResult<Operand> {
    match value {
        Value::Constant(c) => constant_to_operand(*c),
        Value::Computed { number, ty } => {
            let size = size_of_type(*ty)?;
            let color = coloring
                .get(*number)
                .ok_or_else(|| KataraError::register_allocation(format!("{number} was never colored")))?;
            Ok(Operand::from(location_for_color(color, size, frame)?))
        }
        Value::Inherited { .. } => {
            Err(KataraError::invariant("an inherited value may only appear as a phi argument"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use katara_atomics::{Int, IntType};
    use hashbrown::HashMap as StdHashMap;
    use katara_ir::ValueNum;

    fn coloring_with(entries: &[(u32, u32)]) -> Coloring {
        let mut precolored = StdHashMap::new();
        for &(v, c) in entries {
            precolored.insert(ValueNum(v), c);
        }
        katara_regalloc::allocate(
            &katara_analysis::InterferenceGraph::default(),
            &precolored,
            &katara_regalloc::AllocatorConfig { num_registers: crate::abi::NUM_GP_REGISTERS },
        )
    }

    #[test]
    fn bool_constant_is_a_one_byte_immediate() {
        let op = constant_to_operand(Constant::Bool(true)).unwrap();
        assert_eq!(op, Operand::Imm(Imm::new8(1)));
    }

    #[test]
    fn nil_pointer_is_a_zero_immediate() {
        let op = constant_to_operand(Constant::Pointer(None)).unwrap();
        assert_eq!(op, Operand::Imm(Imm::new64(0)));
    }

    #[test]
    fn known_func_constant_becomes_a_func_ref() {
        let op = constant_to_operand(Constant::Func(Some(FuncNum(7)))).unwrap();
        assert_eq!(op, Operand::FuncRef(FuncRef(7)));
    }

    #[test]
    fn int_constant_is_sized_to_its_type() {
        let op = constant_to_operand(Constant::Int(Int::new(IntType::I16, -1))).unwrap();
        assert_eq!(op, Operand::Imm(Imm::new16(-1)));
    }

    #[test]
    fn spill_slot_zero_sits_just_below_pushed_callee_saved_regs() {
        let frame = FrameLayout { callee_saved_used: vec![3, 12], num_spill_slots: 1 };
        let mem = frame.spill_mem(0, Size::K64).unwrap();
        assert_eq!(mem, Mem::base_disp(Size::K64, regs::rbp().index(), -24).unwrap());
    }

    #[test]
    fn computed_value_resolves_through_its_color() {
        let coloring = coloring_with(&[(5, 0)]);
        let frame = FrameLayout::default();
        let value = Value::computed(ValueNum(5), katara_ir::Type::Int(IntType::I32));
        let operand = operand_for_value(&value, &coloring, &frame).unwrap();
        assert_eq!(operand, Operand::Reg(regs::eax()));
    }

    #[test]
    fn inherited_value_outside_a_phi_is_rejected() {
        let coloring = coloring_with(&[]);
        let frame = FrameLayout::default();
        let value = Value::inherited(
            Value::computed(ValueNum(1), katara_ir::Type::Bool),
            katara_ir::BlockNum(0),
        );
        assert!(operand_for_value(&value, &coloring, &frame).is_err());
    }
}
