//! Parallel move sequencing for argument/result marshalling at `Call`
//! and `Return` sites (spec.md §4.10 "Move sequencing"), grounded on
//! `examples/original_source/src/x86_64/ir_translator/mov_generator.cc`.
//!
//! A batch of moves `[(dst, src)]` must be realized as if every
//! destination were written simultaneously against the *old* operand
//! values — the naive sequential emission of one `Mov` per pair would
//! clobber a source that a later move still needs. This module drops
//! no-ops, emits every move whose destination nothing else still reads
//! as soon as it is safe, and breaks any remaining cycles with rotating
//! `Xchg`s (spec.md §4.10 steps 1-4).

use crate::instr::Instr;
use crate::ops::{max_size, Operand, Reg, Size, RM};
use katara_common::{KataraError, KataraResult};

/// One leg of a parallel move: `dst` receives the *old* value denoted by
/// `src`.
#[derive(Debug, Clone, Copy)]
pub struct ParallelMove {
    pub dst: RM,
    pub src: Operand,
}

impl ParallelMove {
    pub fn new(dst: RM, src: Operand) -> Self {
        Self { dst, src }
    }
}

/// A scratch register acquired for a memory-to-memory move or an
/// all-memory cycle break, and how to give it back (spec.md §4.10
/// "Temporary-reg discipline"): either a `pop` restoring a value this
/// provider pushed on loan, or nothing if the register was free to begin
/// with.
pub struct Temporary {
    reg: Reg,
    pushed: bool,
}

impl Temporary {
    pub fn new(reg: Reg, pushed: bool) -> Self {
        Self { reg, pushed }
    }

    pub fn reg(&self) -> Reg {
        self.reg
    }

    /// The instruction, if any, that must be emitted to give the
    /// register back to its previous owner.
    pub fn restore(&self) -> Option<Instr> {
        self.pushed.then(|| Instr::Pop { dst: RM::Reg(self.reg.resized(Size::K64)) })
    }
}

/// Acquires a scratch register sized `size` for the lowering of one
/// instruction. Implemented by the function-level lowering context,
/// which alone knows which colors are reserved as destinations, used
/// elsewhere in the function, or live at the current instruction
/// (spec.md §4.10 step 5's four-tier search order).
pub trait TempProvider {
    fn prepare(&mut self, size: Size, can_be_result_reg: bool) -> KataraResult<Temporary>;
}

fn is_noop(mv: &ParallelMove) -> bool {
    mv.src.location().is_some_and(|loc| loc.same_location(mv.dst) && loc.size() == mv.dst.size())
}

fn needs_temp_for_direct_mov(mv: &ParallelMove) -> bool {
    matches!(mv.dst, RM::Mem(_))
        && matches!(mv.src, Operand::Mem(_) | Operand::Imm(ref imm) if imm.size() == Size::K64)
}

/// Emits the `Mov`(s) realizing one already-safe move, staging through a
/// temporary register when the destination is memory and the source is
/// either also memory (no mem-to-mem `mov` encoding exists) or a 64-bit
/// immediate (no mem-destination immediate form accepts 64 bits).
fn emit_single_move(mv: ParallelMove, temp_provider: &mut dyn TempProvider) -> KataraResult<Vec<Instr>> {
    if !needs_temp_for_direct_mov(&mv) {
        return Ok(vec![Instr::Mov { dst: mv.dst, src: mv.src }]);
    }
    let temp = temp_provider.prepare(mv.dst.size(), false)?;
    let mut out = vec![Instr::Mov { dst: RM::Reg(temp.reg()), src: mv.src }];
    out.push(Instr::Mov { dst: mv.dst, src: Operand::Reg(temp.reg()) });
    if let Some(restore) = temp.restore() {
        out.push(restore);
    }
    Ok(out)
}

/// Emits `Mov`/`Xchg` instructions realizing `moves` as a simultaneous
/// assignment (spec.md §4.10 "Move sequencing").
pub fn sequence_moves(
    moves: &[ParallelMove],
    temp_provider: &mut dyn TempProvider,
) -> KataraResult<Vec<Instr>> {
    let mut pending: Vec<ParallelMove> = moves.iter().copied().filter(|mv| !is_noop(mv)).collect();
    let mut out = Vec::new();

    loop {
        let mut progressed = true;
        while progressed {
            progressed = false;
            let mut i = 0;
            while i < pending.len() {
                let dst = pending[i].dst;
                let still_needed = pending.iter().enumerate().any(|(j, other)| {
                    j != i && other.src.location().is_some_and(|loc| loc.same_location(dst))
                });
                if still_needed {
                    i += 1;
                } else {
                    let mv = pending.remove(i);
                    out.extend(emit_single_move(mv, temp_provider)?);
                    progressed = true;
                }
            }
        }
        if pending.is_empty() {
            break;
        }
        let cycle = extract_cycle(&mut pending)?;
        out.extend(resolve_cycle(&cycle, temp_provider)?);
    }
    Ok(out)
}

/// Follows the pending moves' dst→src chain from an arbitrary remaining
/// destination until it loops back on itself, returning the locations in
/// dependency order: the move writing `cycle[i]` reads
/// `cycle[(i+1) % cycle.len()]`'s old value. Every move in the cycle is
/// removed from `pending`.
fn extract_cycle(pending: &mut Vec<ParallelMove>) -> KataraResult<Vec<RM>> {
    let start = pending[0].dst;
    let mut chain = vec![start];
    let mut current = start;
    loop {
        let next = pending
            .iter()
            .find(|mv| mv.dst.same_location(current))
            .and_then(|mv| mv.src.location())
            .ok_or_else(|| {
                KataraError::invariant("move sequencing found a residual move with no cyclic source")
            })?;
        if next.same_location(start) {
            break;
        }
        chain.push(next);
        current = next;
    }
    pending.retain(|mv| !chain.iter().any(|loc| loc.same_location(mv.dst)));
    Ok(chain)
}

/// Realizes one cycle (spec.md §4.10 step 4): if any member is a
/// register, rotate the cycle to start there and emit `n-1` `Xchg`s with
/// no temporary at all. An all-memory cycle (no register to pivot on)
/// routes through a temporary register instead, since `Xchg` has no
/// memory-memory form.
fn resolve_cycle(cycle: &[RM], temp_provider: &mut dyn TempProvider) -> KataraResult<Vec<Instr>> {
    if cycle.len() < 2 {
        return Ok(Vec::new());
    }
    if let Some(reg_pos) = cycle.iter().position(|loc| loc.is_reg()) {
        let mut rotated = cycle.to_vec();
        rotated.rotate_left(reg_pos);
        let anchor = rotated[0];
        let mut out = Vec::new();
        for &loc in rotated[1..].iter().rev() {
            let size = max_size(anchor.size(), loc.size());
            out.push(Instr::Xchg { a: anchor.resized(size), b: loc.resized(size) });
        }
        return Ok(out);
    }

    let size = cycle[0].size();
    let temp = temp_provider.prepare(size, false)?;
    let mut out = vec![Instr::Mov { dst: RM::Reg(temp.reg()), src: Operand::from(cycle[0]) }];
    for window in cycle.windows(2) {
        out.push(Instr::Mov { dst: window[0], src: Operand::from(window[1]) });
    }
    out.push(Instr::Mov { dst: *cycle.last().unwrap(), src: Operand::Reg(temp.reg()) });
    if let Some(restore) = temp.restore() {
        out.push(restore);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::regs;

    struct NoTemp;
    impl TempProvider for NoTemp {
        fn prepare(&mut self, _size: Size, _can_be_result_reg: bool) -> KataraResult<Temporary> {
            Err(KataraError::invariant("no temporary available in this test"))
        }
    }

    struct PushPopTemp(Reg);
    impl TempProvider for PushPopTemp {
        fn prepare(&mut self, size: Size, _can_be_result_reg: bool) -> KataraResult<Temporary> {
            Ok(Temporary::new(self.0.resized(size), true))
        }
    }

    #[test]
    fn no_op_moves_are_dropped() {
        let moves = vec![ParallelMove::new(RM::Reg(regs::rax()), Operand::Reg(regs::rax()))];
        let instrs = sequence_moves(&moves, &mut NoTemp).unwrap();
        assert!(instrs.is_empty());
    }

    #[test]
    fn acyclic_chain_emits_in_dependency_order() {
        // rdi := rsi, rsi := rdx (no cycle: rdx is never overwritten).
        let moves = vec![
            ParallelMove::new(RM::Reg(regs::rdi()), Operand::Reg(regs::rsi())),
            ParallelMove::new(RM::Reg(regs::rsi()), Operand::Reg(regs::rdx())),
        ];
        let instrs = sequence_moves(&moves, &mut NoTemp).unwrap();
        assert_eq!(instrs.len(), 2);
        match instrs[0] {
            Instr::Mov { dst: RM::Reg(r), .. } => assert_eq!(r, regs::rdi()),
            _ => panic!("expected the rdi move to run first"),
        }
    }

    #[test]
    fn three_register_swap_cycle_uses_exactly_two_xchgs() {
        // a -> b -> c -> a: rax := rbx, rbx := rcx, rcx := rax.
        let moves = vec![
            ParallelMove::new(RM::Reg(regs::rax()), Operand::Reg(regs::rbx())),
            ParallelMove::new(RM::Reg(regs::rbx()), Operand::Reg(regs::rcx())),
            ParallelMove::new(RM::Reg(regs::rcx()), Operand::Reg(regs::rax())),
        ];
        let instrs = sequence_moves(&moves, &mut NoTemp).unwrap();
        assert_eq!(instrs.len(), 2);
        assert!(instrs.iter().all(|i| matches!(i, Instr::Xchg { .. })));
    }

    #[test]
    fn two_register_cycle_uses_one_xchg() {
        let moves = vec![
            ParallelMove::new(RM::Reg(regs::rax()), Operand::Reg(regs::rbx())),
            ParallelMove::new(RM::Reg(regs::rbx()), Operand::Reg(regs::rax())),
        ];
        let instrs = sequence_moves(&moves, &mut NoTemp).unwrap();
        assert_eq!(instrs.len(), 1);
        assert!(matches!(instrs[0], Instr::Xchg { .. }));
    }

    #[test]
    fn all_memory_cycle_routes_through_a_temporary() {
        use crate::ops::Mem;
        let slot_a = RM::Mem(Mem::base_disp(Size::K64, regs::rbp().index(), -8).unwrap());
        let slot_b = RM::Mem(Mem::base_disp(Size::K64, regs::rbp().index(), -16).unwrap());
        let moves = vec![
            ParallelMove::new(slot_a, Operand::from(slot_b)),
            ParallelMove::new(slot_b, Operand::from(slot_a)),
        ];
        let instrs = sequence_moves(&moves, &mut PushPopTemp(regs::r11())).unwrap();
        // mov temp, b ; mov a, temp ; mov b, temp(old a) ; pop temp
        assert!(instrs.iter().any(|i| matches!(i, Instr::Pop { .. })));
        assert!(!instrs.iter().any(|i| matches!(i, Instr::Xchg { .. })));
    }

    #[test]
    fn mem_to_mem_direct_move_stages_through_a_temporary() {
        use crate::ops::Mem;
        let dst = RM::Mem(Mem::base_disp(Size::K64, regs::rbp().index(), -8).unwrap());
        let src = RM::Mem(Mem::base_disp(Size::K64, regs::rbp().index(), -16).unwrap());
        let moves = vec![ParallelMove::new(dst, Operand::from(src))];
        let instrs = sequence_moves(&moves, &mut PushPopTemp(regs::r11())).unwrap();
        assert_eq!(instrs.len(), 3); // mov temp,src ; mov dst,temp ; pop temp
    }
}
