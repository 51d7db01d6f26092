//! Assembles REX/opcode/ModRM/SIB/displacement/immediate bytes into one
//! instruction's machine code. Grounded on
//! `examples/original_source/src/x86_64/instrs/instr_encoder.h`/`.cc`:
//! each `Instr::encode` (in `instr.rs`) drives one `InstrEncoder` through
//! the same handful of `encode_*` calls the original's per-instruction
//! `Encode()` overrides made against its `InstrEncoder`.

use crate::ops::{Imm, Mem, Reg, Size, RM};

#[derive(Debug, Default)]
pub struct InstrEncoder {
    size_override_16: bool,
    rex: u8,
    needs_rex: bool,
    opcode: Vec<u8>,
    has_modrm: bool,
    modrm: u8,
    has_sib: bool,
    sib: u8,
    disp: Vec<u8>,
    imm: Vec<u8>,
}

impl InstrEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the REX.W / 0x66 operand-size prefix for `size`. `K8`/`K32`
    /// need neither: they are the encoding's implicit default widths.
    pub fn set_operand_size(&mut self, size: Size) {
        match size {
            Size::K16 => self.size_override_16 = true,
            Size::K64 => {
                self.rex |= 0x08; // REX.W
                self.needs_rex = true;
            }
            Size::K8 | Size::K32 => {}
        }
    }

    pub fn add_opcode_byte(&mut self, byte: u8) {
        self.opcode.push(byte);
    }

    pub fn add_opcode_bytes(&mut self, bytes: &[u8]) {
        self.opcode.extend_from_slice(bytes);
    }

    /// Marks that REX must be emitted even if all of its bits end up
    /// zero (the `spl`/`bpl`/`sil`/`dil` disambiguation case).
    pub fn force_rex(&mut self) {
        self.needs_rex = true;
    }

    fn note_rm_rex(&mut self, rm: RM) {
        if rm.requires_rex() {
            self.needs_rex = true;
        }
    }

    /// Encodes `rm` into the ModRM R/M (+ SIB/disp) fields.
    pub fn encode_modrm_rm(&mut self, rm: RM) {
        self.has_modrm = true;
        self.note_rm_rex(rm);
        self.has_sib = rm.requires_sib();
        let mut disp_buf = [0u8; 4];
        rm.encode_in_modrm_sib_disp(&mut self.rex, &mut self.modrm, &mut self.sib, &mut disp_buf);
        let disp_len = rm.required_disp_size() as usize;
        self.disp = disp_buf[..disp_len].to_vec();
    }

    /// Encodes `reg` into ModRM's reg field (the second operand of a
    /// two-register/reg-and-memory form).
    pub fn encode_modrm_reg(&mut self, reg: Reg) {
        self.has_modrm = true;
        if reg.requires_rex() {
            self.needs_rex = true;
        }
        reg.encode_in_modrm_reg(&mut self.rex, &mut self.modrm);
    }

    /// Encodes a fixed opcode extension (0..7) into ModRM's reg field,
    /// for instructions where that field selects the operation rather
    /// than naming a second register (e.g. `Not`/`Neg`/`Mul` under opcode
    /// `0xf7`).
    pub fn encode_modrm_opcode_ext(&mut self, ext: u8) {
        self.has_modrm = true;
        self.modrm &= !0x38;
        self.modrm |= (ext & 0x7) << 3;
    }

    /// Embeds `reg` directly into the low 3 bits of the last opcode byte
    /// emitted so far, shifted left by `lshift` (the `push reg`/`pop
    /// reg`/`mov reg, imm` opcode+register shortcut forms).
    pub fn encode_reg_in_opcode(&mut self, reg: Reg, lshift: u8) {
        if reg.requires_rex() {
            self.needs_rex = true;
        }
        let last = self.opcode.last_mut().expect("opcode byte must precede register embedding");
        reg.encode_in_opcode(&mut self.rex, last, lshift);
    }

    pub fn encode_imm(&mut self, imm: Imm) {
        if imm.requires_rex() {
            self.needs_rex = true;
        }
        let mut buf = [0u8; 8];
        imm.encode_in_imm(&mut buf);
        self.imm = buf[..imm.required_imm_size() as usize].to_vec();
    }

    /// Reserves `len` zero bytes for a patch (e.g. a `rel32` branch
    /// target) to be filled in later by the linker, returning the byte
    /// offset within the finished instruction where those bytes begin.
    pub fn reserve_patch_bytes(&mut self, len: usize) -> usize {
        let mut header = Vec::new();
        self.write_prefix_opcode(&mut header);
        let offset = header.len();
        self.imm = vec![0u8; len];
        offset
    }

    fn write_prefix_opcode(&self, out: &mut Vec<u8>) {
        if self.size_override_16 {
            out.push(0x66);
        }
        if self.needs_rex {
            out.push(0x40 | self.rex);
        }
        out.extend_from_slice(&self.opcode);
    }

    pub fn finish(self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write_prefix_opcode(&mut bytes);
        if self.has_modrm {
            bytes.push(self.modrm);
        }
        if self.has_sib {
            bytes.push(self.sib);
        }
        bytes.extend_from_slice(&self.disp);
        bytes.extend_from_slice(&self.imm);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::regs;

    #[test]
    fn mov_reg_reg_32_needs_no_rex() {
        // mov eax, ecx -> 89 c8
        let mut enc = InstrEncoder::new();
        enc.set_operand_size(Size::K32);
        enc.add_opcode_byte(0x89);
        enc.encode_modrm_rm(RM::Reg(regs::eax()));
        enc.encode_modrm_reg(regs::ecx());
        assert_eq!(enc.finish(), vec![0x89, 0xc8]);
    }

    #[test]
    fn mov_reg_reg_64_sets_rex_w() {
        // mov rax, rcx -> 48 89 c8
        let mut enc = InstrEncoder::new();
        enc.set_operand_size(Size::K64);
        enc.add_opcode_byte(0x89);
        enc.encode_modrm_rm(RM::Reg(regs::rax()));
        enc.encode_modrm_reg(regs::rcx());
        assert_eq!(enc.finish(), vec![0x48, 0x89, 0xc8]);
    }

    #[test]
    fn spl_forces_rex_even_without_extended_registers() {
        let mut enc = InstrEncoder::new();
        enc.set_operand_size(Size::K8);
        enc.add_opcode_byte(0x88);
        enc.encode_modrm_rm(RM::Reg(regs::spl()));
        enc.encode_modrm_reg(regs::al());
        assert_eq!(enc.finish(), vec![0x40, 0x88, 0xc4]);
    }

    #[test]
    fn push_r12_embeds_register_and_sets_rex_b() {
        // push r12 -> 41 54
        let mut enc = InstrEncoder::new();
        enc.add_opcode_byte(0x50);
        enc.encode_reg_in_opcode(regs::r12(), 0);
        assert_eq!(enc.finish(), vec![0x41, 0x54]);
    }
}
