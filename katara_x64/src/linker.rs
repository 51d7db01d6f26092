//! Resolves symbolic `FuncRef`/`BlockRef` patches left by the encoder
//! into RIP-relative 32-bit displacements once every function and block
//! address is known. Grounded on
//! `examples/original_source/src/x86_64/machine_code/linker.h`/`.cc`.
//!
//! A patch's 4-byte placeholder sits immediately before the next
//! instruction; the x86-64 `Jcc`/`Jmp`/`Call rel32` forms are relative to
//! the address *after* that placeholder, so the formula is
//! `disp = dest_addr - (patch_addr + 4)` (spec.md §4.11, tested by the
//! branch-linking seed scenario in spec.md §8).
//!
//! `malloc`/`free` calls (C10) patch against an `extern_addrs` table the
//! embedder supplies at link time rather than against a function/block
//! this program defines itself.

use crate::ops::{BlockRef, FuncRef};
use katara_common::{KataraError, KataraResult};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingTarget {
    Func(FuncRef),
    Block(FuncRef, BlockRef),
    Extern(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct PendingPatch {
    patch_addr: u64,
    target: PendingTarget,
}

/// Collects function/block addresses and outstanding patches for one
/// linked program, then rewrites every patch's placeholder bytes in
/// place.
#[derive(Debug, Default)]
pub struct Linker {
    func_addrs: HashMap<FuncRef, u64>,
    block_addrs: HashMap<(FuncRef, BlockRef), u64>,
    patches: Vec<PendingPatch>,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func_addr(&mut self, func: FuncRef, addr: u64) {
        self.func_addrs.insert(func, addr);
    }

    pub fn add_block_addr(&mut self, func: FuncRef, block: BlockRef, addr: u64) {
        self.block_addrs.insert((func, block), addr);
    }

    pub fn add_func_patch(&mut self, patch_addr: u64, target: FuncRef) {
        self.patches.push(PendingPatch { patch_addr, target: PendingTarget::Func(target) });
    }

    pub fn add_block_patch(&mut self, patch_addr: u64, owning_func: FuncRef, target: BlockRef) {
        self.patches.push(PendingPatch {
            patch_addr,
            target: PendingTarget::Block(owning_func, target),
        });
    }

    pub fn add_extern_patch(&mut self, patch_addr: u64, name: &'static str) {
        self.patches.push(PendingPatch { patch_addr, target: PendingTarget::Extern(name) });
    }

    /// Rewrites `code` in place: `code` must be the complete, addressed
    /// machine code buffer the patch addresses were recorded against
    /// (address 0 == `code[0]`). `extern_addrs` supplies the process
    /// addresses of any `ExternFunc` targets (spec.md §6 "external
    /// functions are identified by process addresses supplied to the
    /// linker").
    pub fn apply_patches(&self, code: &mut [u8], extern_addrs: &HashMap<&str, u64>) -> KataraResult<()> {
        for patch in &self.patches {
            let dest = match patch.target {
                PendingTarget::Func(f) => *self
                    .func_addrs
                    .get(&f)
                    .ok_or_else(|| KataraError::linking(format!("unresolved function reference {f}")))?,
                PendingTarget::Block(func, block) => *self
                    .block_addrs
                    .get(&(func, block))
                    .ok_or_else(|| KataraError::linking(format!("unresolved block reference {block} in {func}")))?,
                PendingTarget::Extern(name) => *extern_addrs
                    .get(name)
                    .ok_or_else(|| KataraError::linking(format!("unresolved extern symbol {name}")))?,
            };
            let patch_addr = patch.patch_addr;
            let disp = dest as i64 - (patch_addr as i64 + 4);
            let disp: i32 = disp
                .try_into()
                .map_err(|_| KataraError::linking(format!("branch displacement {disp} overflows 32 bits")))?;
            let start = patch_addr as usize;
            let end = start + 4;
            if end > code.len() {
                return Err(KataraError::linking("patch address out of bounds"));
            }
            code[start..end].copy_from_slice(&disp.to_le_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branch_resolves_to_positive_displacement() {
        let mut linker = Linker::new();
        // jmp at address 0 (opcode e9, patch at byte 1), target block at 10.
        linker.add_func_addr(FuncRef(0), 0);
        linker.add_block_addr(FuncRef(0), BlockRef(1), 10);
        linker.add_block_patch(1, FuncRef(0), BlockRef(1));
        let mut code = vec![0u8; 16];
        linker.apply_patches(&mut code, &HashMap::new()).unwrap();
        let disp = i32::from_le_bytes(code[1..5].try_into().unwrap());
        assert_eq!(disp, 10 - (1 + 4));
    }

    #[test]
    fn backward_branch_resolves_to_negative_displacement() {
        let mut linker = Linker::new();
        linker.add_block_addr(FuncRef(0), BlockRef(0), 0);
        linker.add_block_patch(20, FuncRef(0), BlockRef(0));
        let mut code = vec![0u8; 32];
        linker.apply_patches(&mut code, &HashMap::new()).unwrap();
        let disp = i32::from_le_bytes(code[20..24].try_into().unwrap());
        assert_eq!(disp, 0 - (20 + 4));
    }

    #[test]
    fn unresolved_target_is_an_error() {
        let mut linker = Linker::new();
        linker.add_func_patch(0, FuncRef(99));
        let mut code = vec![0u8; 8];
        assert!(linker.apply_patches(&mut code, &HashMap::new()).is_err());
    }
}
