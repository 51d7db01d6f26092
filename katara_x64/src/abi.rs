//! System-V AMD64 ABI tables: argument/result register order and the
//! caller-saved/callee-saved partition, grounded on the register choices
//! baked into `examples/original_source/src/x86_64/ir_translator/{
//! call_generator.cc,func_translator.cc}` (`GenerateArgMoves`/
//! `GenerateResultMoves`/`ForEachUsedCalleeSavedRegister`).
//!
//! Register numbers here are the hardware indices used throughout
//! `ops.rs`/`regs`, doubling as the `katara_regalloc::Color` space:
//! colors `0..16` name a concrete general-purpose register one-to-one,
//! and any color `>= 16` is a spill slot (spec.md §4.6/§9).

/// Integer/pointer argument registers, in System-V AMD64 order.
pub const ARG_REGS: [u8; 6] = [
    7,  // rdi
    6,  // rsi
    2,  // rdx
    1,  // rcx
    8,  // r8
    9,  // r9
];

/// Integer/pointer return-value registers: primary then secondary.
pub const RESULT_REGS: [u8; 2] = [
    0, // rax
    2, // rdx
];

/// Registers the callee must preserve across a call, in the order the
/// prologue pushes them (and the epilogue pops them in reverse).
pub const CALLEE_SAVED: [u8; 5] = [
    3,  // rbx
    12, // r12
    13, // r13
    14, // r14
    15, // r15
];

/// Registers a call may clobber freely; anything live across a `Call`
/// instruction that is colored into one of these must be spilled or
/// otherwise made to survive via an extra interference edge (spec.md
/// §4.6, third bullet).
pub const CALLER_SAVED: [u8; 9] = [
    0,  // rax
    1,  // rcx
    2,  // rdx
    6,  // rsi
    7,  // rdi
    8,  // r8
    9,  // r9
    10, // r10
    11, // r11
];

/// The frame pointer and stack pointer are never available to the
/// allocator as general-purpose colors.
pub const RESERVED: [u8; 2] = [
    4, // rsp
    5, // rbp
];

/// The allocator never sees `RSP`/`RBP` as assignable colors (they are
/// reserved for the frame, not general-purpose storage), so the color
/// space is the 14 remaining hardware registers, densely renumbered
/// around the `RESERVED` gap at hardware indices 4/5.
pub const NUM_GP_REGISTERS: usize = 14;

/// The hardware register index for the allocator's `Color` space
/// (spec.md §4.6: "target-specific mapping... lives in the lowering
/// layer"). A color `>= NUM_GP_REGISTERS` never reaches this function —
/// those are spill slots, handled by the caller before dispatch. Colors
/// 0..4 map to hardware 0..4 (`rax..rbx`); colors 4.. skip the
/// `rsp`/`rbp` gap and map to hardware 6.. (`rsi` onward).
pub fn color_to_hardware_reg(color: u32) -> u8 {
    debug_assert!((color as usize) < NUM_GP_REGISTERS);
    if color < 4 {
        color as u8
    } else {
        (color + 2) as u8
    }
}

pub fn hardware_reg_to_color(reg: u8) -> u32 {
    debug_assert!(!RESERVED.contains(&reg));
    if reg < 4 {
        reg as u32
    } else {
        reg as u32 - 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_and_result_regs_are_disjoint_from_reserved() {
        for &r in ARG_REGS.iter().chain(RESULT_REGS.iter()) {
            assert!(!RESERVED.contains(&r));
        }
    }

    #[test]
    fn color_space_never_reaches_the_reserved_gap() {
        for color in 0..NUM_GP_REGISTERS as u32 {
            let reg = color_to_hardware_reg(color);
            assert!(!RESERVED.contains(&reg), "color {color} maps to reserved register {reg}");
        }
    }

    #[test]
    fn color_and_hardware_reg_round_trip() {
        for reg in 0u8..16 {
            if RESERVED.contains(&reg) {
                continue;
            }
            let color = hardware_reg_to_color(reg);
            assert_eq!(color_to_hardware_reg(color), reg);
        }
    }

    #[test]
    fn callee_saved_and_caller_saved_partition_the_non_reserved_registers() {
        let mut all: Vec<u8> = CALLEE_SAVED.iter().chain(CALLER_SAVED.iter()).copied().collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), CALLEE_SAVED.len() + CALLER_SAVED.len());
        assert_eq!(all.len() + RESERVED.len(), NUM_GP_REGISTERS);
    }
}
