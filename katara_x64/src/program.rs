//! The x86-64-level program: functions made of blocks of already-selected
//! `Instr`s, plus the single entry point (`link`) that lays them out
//! sequentially and hands the result to the `Linker`. Grounded on
//! `examples/original_source/src/x86_64/{program.h,func.h,block.h}`,
//! collapsed into one flat module since none of the three carries
//! independent behavior beyond "a sequence of the level below".
//!
//! No instruction's encoded length depends on an unresolved address
//! (every symbolic reference uses a fixed-width `rel32`), so one forward
//! pass can assign addresses and encode in the same walk; no branch
//! relaxation/shrink-to-fit pass is needed.

use crate::instr::{Instr, PatchTarget};
use crate::linker::Linker;
use crate::ops::{BlockRef, FuncRef};
use katara_common::KataraResult;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Block {
    pub number: BlockRef,
    pub instrs: Vec<Instr>,
}

impl Block {
    pub fn new(number: BlockRef) -> Self {
        Self { number, instrs: Vec::new() }
    }

    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }
}

#[derive(Debug, Clone)]
pub struct Func {
    pub number: FuncRef,
    pub blocks: Vec<Block>,
}

impl Func {
    pub fn new(number: FuncRef) -> Self {
        Self { number, blocks: Vec::new() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub funcs: Vec<Func>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes every instruction in program order, recording each
    /// function's and block's start address as it is reached, then
    /// resolves every collected patch against those addresses.
    /// `extern_addrs` supplies the process addresses of any
    /// `CallTarget::Extern` symbols the lowering emitted (e.g. `malloc`,
    /// `free`); those patches fail if their name is absent (spec.md §6).
    pub fn link(&self, extern_addrs: &HashMap<&str, u64>) -> KataraResult<Vec<u8>> {
        let mut linker = Linker::new();
        let mut code = Vec::new();
        for func in &self.funcs {
            linker.add_func_addr(func.number, code.len() as u64);
            for block in &func.blocks {
                linker.add_block_addr(func.number, block.number, code.len() as u64);
                for instr in &block.instrs {
                    let encoded = instr.encode()?;
                    let instr_addr = code.len() as u64;
                    if let Some(patch) = &encoded.patch {
                        let patch_addr = instr_addr + patch.offset as u64;
                        match patch.target {
                            PatchTarget::Func(f) => linker.add_func_patch(patch_addr, f),
                            PatchTarget::Block(b) => linker.add_block_patch(patch_addr, func.number, b),
                            PatchTarget::Extern(name) => linker.add_extern_patch(patch_addr, name),
                        }
                    }
                    code.extend_from_slice(&encoded.bytes);
                }
            }
        }
        linker.apply_patches(&mut code, extern_addrs)?;
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cond::InstrCond;

    #[test]
    fn two_block_function_with_a_forward_jump_links_cleanly() {
        let mut program = Program::new();
        let mut func = Func::new(FuncRef(0));
        let mut entry = Block::new(BlockRef(0));
        entry.push(Instr::Jmp { target: BlockRef(1) });
        let mut exit = Block::new(BlockRef(1));
        exit.push(Instr::Ret);
        func.blocks.push(entry);
        func.blocks.push(exit);
        program.funcs.push(func);

        let code = program.link(&HashMap::new()).unwrap();
        // jmp rel32 (5 bytes) then ret (1 byte).
        assert_eq!(code.len(), 6);
        assert_eq!(code[0], 0xe9);
        let disp = i32::from_le_bytes(code[1..5].try_into().unwrap());
        assert_eq!(disp, 5 - 5);
        assert_eq!(code[5], 0xc3);
    }

    #[test]
    fn conditional_branch_to_an_earlier_block_links() {
        let mut program = Program::new();
        let mut func = Func::new(FuncRef(0));
        let mut loop_head = Block::new(BlockRef(0));
        loop_head.push(Instr::Ret);
        let mut tail = Block::new(BlockRef(1));
        tail.push(Instr::Jcc { cond: InstrCond::Equal, target: BlockRef(0) });
        func.blocks.push(loop_head);
        func.blocks.push(tail);
        program.funcs.push(func);

        let code = program.link(&HashMap::new()).unwrap();
        assert_eq!(code.len(), 1 + 6);
        let patch_addr = 1 + 2;
        let disp = i32::from_le_bytes(code[patch_addr..patch_addr + 4].try_into().unwrap());
        assert_eq!(disp, 0 - (patch_addr as i64 + 4) as i32);
    }
}
