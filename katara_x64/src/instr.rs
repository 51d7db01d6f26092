//! Individual x86-64 instructions and their encodings, grounded on
//! `examples/original_source/src/x86_64/instrs/{data_instrs,
//! arithmetic_logic_instrs,cf_instrs}.cc`. Each `Instr` variant mirrors
//! one instruction class from that file; `encode` drives an
//! `InstrEncoder` the same way the original's per-class `Encode()`
//! override did.

use crate::cond::InstrCond;
use crate::encoder::InstrEncoder;
use crate::ops::{BlockRef, FuncRef, Imm, Operand, Reg, Size, RM};
use katara_common::{KataraError, KataraResult};
use std::fmt;

/// Where a 4-byte patch lives inside an instruction's own byte buffer,
/// and what it should ultimately resolve to. Filled in by the `Linker`
/// once every function/block's address is known (spec.md §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTarget {
    Func(FuncRef),
    Block(BlockRef),
    /// A symbol the linker resolves against an embedder-supplied process
    /// address rather than a function/block the program itself defines
    /// (the `malloc`/`free` calls C10's lowering emits).
    Extern(&'static str),
}

/// Where a `Call` transfers control. `Indirect` carries the register or
/// memory location holding the computed callee address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Func(FuncRef),
    Extern(&'static str),
    Indirect(RM),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub offset: usize,
    pub target: PatchTarget,
}

/// The machine code for one instruction, plus the unresolved symbolic
/// reference inside it, if any.
#[derive(Debug, Clone)]
pub struct EncodedInstr {
    pub bytes: Vec<u8>,
    pub patch: Option<Patch>,
}

impl EncodedInstr {
    fn plain(bytes: Vec<u8>) -> Self {
        Self { bytes, patch: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryALOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
}

impl BinaryALOp {
    fn ext(self) -> u8 {
        match self {
            BinaryALOp::Add => 0,
            BinaryALOp::Or => 1,
            BinaryALOp::Adc => 2,
            BinaryALOp::Sbb => 3,
            BinaryALOp::And => 4,
            BinaryALOp::Sub => 5,
            BinaryALOp::Xor => 6,
            BinaryALOp::Cmp => 7,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            BinaryALOp::Add => "add",
            BinaryALOp::Or => "or",
            BinaryALOp::Adc => "adc",
            BinaryALOp::Sbb => "sbb",
            BinaryALOp::And => "and",
            BinaryALOp::Sub => "sub",
            BinaryALOp::Xor => "xor",
            BinaryALOp::Cmp => "cmp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryALOp {
    Not,
    Neg,
    Mul,
    Imul,
    Div,
    Idiv,
}

impl UnaryALOp {
    fn ext(self) -> u8 {
        match self {
            UnaryALOp::Not => 2,
            UnaryALOp::Neg => 3,
            UnaryALOp::Mul => 4,
            UnaryALOp::Imul => 5,
            UnaryALOp::Div => 6,
            UnaryALOp::Idiv => 7,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            UnaryALOp::Not => "not",
            UnaryALOp::Neg => "neg",
            UnaryALOp::Mul => "mul",
            UnaryALOp::Imul => "imul",
            UnaryALOp::Div => "div",
            UnaryALOp::Idiv => "idiv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Mov { dst: RM, src: Operand },
    /// Widens `src` into `dst` (movzx/movsx, or the implicit zero-extension
    /// a plain 32-bit mov gets for free when widening to 64 bits). Used by
    /// integer conversions and narrow-to-wide argument marshalling
    /// (spec.md §4.4's "sign/zero extension picked by the int type's
    /// signedness").
    MovExtend { signed: bool, dst: Reg, src: RM },
    Xchg { a: RM, b: RM },
    Push { src: RM },
    PushImm { imm: Imm },
    Pop { dst: RM },
    Setcc { cond: InstrCond, dst: RM },
    Unary { op: UnaryALOp, dst: RM },
    Binary { op: BinaryALOp, dst: RM, src: Operand },
    SignExtendRegA { dst_size: Size },
    SignExtendRegAD { dst_size: Size },
    Test { dst: RM, src: Operand },
    /// Shift/rotate-family instruction with the count taken from `cl`,
    /// mirroring the original's variable-count shift form (the lowering
    /// always stages a computed shift amount into `cl` before emitting
    /// this, since x86-64 has no register-operand shift count).
    ShiftByCl { op: ShiftOp, dst: RM },
    Jcc { cond: InstrCond, target: BlockRef },
    Jmp { target: BlockRef },
    Call { target: CallTarget },
    Syscall,
    Ret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    /// Logical left shift (`shl`); same bit pattern for signed/unsigned.
    Shl,
    /// Logical right shift (`shr`), zero-filling — used for unsigned types.
    Shr,
    /// Arithmetic right shift (`sar`), sign-filling — used for signed types.
    Sar,
}

impl ShiftOp {
    fn ext(self) -> u8 {
        match self {
            ShiftOp::Shl => 4,
            ShiftOp::Shr => 5,
            ShiftOp::Sar => 7,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            ShiftOp::Shl => "shl",
            ShiftOp::Shr => "shr",
            ShiftOp::Sar => "sar",
        }
    }
}

fn fit_imm(imm: Imm, size: Size) -> KataraResult<Imm> {
    let value = imm.value();
    match size {
        Size::K8 => {
            if (-128..=127).contains(&value) {
                Ok(Imm::new8(value as i8))
            } else {
                Err(KataraError::encoding(format!("immediate {value} does not fit in 8 bits")))
            }
        }
        Size::K16 => {
            if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
                Ok(Imm::new16(value as i16))
            } else {
                Err(KataraError::encoding(format!("immediate {value} does not fit in 16 bits")))
            }
        }
        Size::K32 => {
            if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
                Ok(Imm::new32(value as i32))
            } else {
                Err(KataraError::encoding(format!("immediate {value} does not fit in 32 bits")))
            }
        }
        Size::K64 => Ok(Imm::new64(value)),
    }
}

impl Instr {
    pub fn encode(&self) -> KataraResult<EncodedInstr> {
        match *self {
            Instr::Mov { dst, src } => encode_mov(dst, src),
            Instr::MovExtend { signed, dst, src } => encode_mov_extend(signed, dst, src),
            Instr::Xchg { a, b } => encode_xchg(a, b),
            Instr::Push { src } => encode_push(src),
            Instr::PushImm { imm } => encode_push_imm(imm),
            Instr::Pop { dst } => encode_pop(dst),
            Instr::Setcc { cond, dst } => encode_setcc(cond, dst),
            Instr::Unary { op, dst } => encode_unary(op, dst),
            Instr::Binary { op, dst, src } => encode_binary(op, dst, src),
            Instr::SignExtendRegA { dst_size } => encode_sign_extend_rega(dst_size),
            Instr::SignExtendRegAD { dst_size } => encode_sign_extend_regad(dst_size),
            Instr::Test { dst, src } => encode_test(dst, src),
            Instr::ShiftByCl { op, dst } => encode_shift_by_cl(op, dst),
            Instr::Jcc { cond, target } => Ok(encode_jcc(cond, target)),
            Instr::Jmp { target } => Ok(encode_jmp(target)),
            Instr::Call { target } => encode_call(target),
            Instr::Syscall => Ok(EncodedInstr::plain(vec![0x0f, 0x05])),
            Instr::Ret => Ok(EncodedInstr::plain(vec![0xc3])),
        }
    }

    /// Whether this instruction never falls through to the next one
    /// (spec.md §4.10 block ordering relies on this for epilogue
    /// placement).
    pub fn is_block_terminator(&self) -> bool {
        matches!(self, Instr::Jmp { .. } | Instr::Ret)
    }
}

fn encode_mov(dst: RM, src: Operand) -> KataraResult<EncodedInstr> {
    match src {
        Operand::Reg(reg) => {
            if reg.size() != dst.size() {
                return Err(KataraError::encoding("mov operand size mismatch"));
            }
            let mut enc = InstrEncoder::new();
            enc.set_operand_size(dst.size());
            enc.add_opcode_byte(if dst.size() == Size::K8 { 0x88 } else { 0x89 });
            enc.encode_modrm_rm(dst);
            enc.encode_modrm_reg(reg);
            Ok(EncodedInstr::plain(enc.finish()))
        }
        Operand::Mem(mem) => {
            let reg = dst.reg()?;
            if mem.size() != reg.size() {
                return Err(KataraError::encoding("mov operand size mismatch"));
            }
            let mut enc = InstrEncoder::new();
            enc.set_operand_size(reg.size());
            enc.add_opcode_byte(if reg.size() == Size::K8 { 0x8a } else { 0x8b });
            enc.encode_modrm_rm(RM::Mem(mem));
            enc.encode_modrm_reg(reg);
            Ok(EncodedInstr::plain(enc.finish()))
        }
        Operand::Imm(imm) => {
            if dst.is_reg() && dst.size() == Size::K64 && imm.size() == Size::K64 {
                let reg = dst.reg()?;
                let mut enc = InstrEncoder::new();
                enc.set_operand_size(Size::K64);
                enc.add_opcode_byte(0xb8);
                enc.encode_reg_in_opcode(reg, 0);
                enc.encode_imm(imm);
                return Ok(EncodedInstr::plain(enc.finish()));
            }
            let mut enc = InstrEncoder::new();
            enc.set_operand_size(dst.size());
            enc.add_opcode_byte(if dst.size() == Size::K8 { 0xc6 } else { 0xc7 });
            enc.encode_modrm_rm(dst);
            enc.encode_modrm_opcode_ext(0);
            let imm = fit_imm(imm, if dst.size() == Size::K8 { Size::K8 } else { Size::K32 })?;
            enc.encode_imm(imm);
            Ok(EncodedInstr::plain(enc.finish()))
        }
        Operand::FuncRef(_) | Operand::BlockRef(_) => {
            Err(KataraError::encoding("mov does not accept a symbolic reference operand"))
        }
    }
}

fn encode_mov_extend(signed: bool, dst: Reg, src: RM) -> KataraResult<EncodedInstr> {
    let src_size = src.size();
    if (dst.size() as u8) <= (src_size as u8) {
        return Err(KataraError::encoding("movzx/movsx destination must be wider than its source"));
    }
    if src_size == Size::K32 {
        if dst.size() != Size::K64 {
            return Err(KataraError::encoding("32-bit extension destination must be 64-bit"));
        }
        if !signed {
            // Writing a 32-bit register zeroes the upper 32 bits for free.
            let mut enc = InstrEncoder::new();
            enc.add_opcode_byte(0x8b);
            enc.encode_modrm_rm(src);
            enc.encode_modrm_reg(dst.resized(Size::K32));
            return Ok(EncodedInstr::plain(enc.finish()));
        }
        let mut enc = InstrEncoder::new();
        enc.set_operand_size(Size::K64);
        enc.add_opcode_byte(0x63);
        enc.encode_modrm_rm(src);
        enc.encode_modrm_reg(dst);
        return Ok(EncodedInstr::plain(enc.finish()));
    }
    let opcode = match (signed, src_size) {
        (false, Size::K8) => 0xb6,
        (false, Size::K16) => 0xb7,
        (true, Size::K8) => 0xbe,
        (true, Size::K16) => 0xbf,
        _ => return Err(KataraError::encoding("unsupported movzx/movsx operand size combination")),
    };
    let mut enc = InstrEncoder::new();
    enc.set_operand_size(dst.size());
    enc.add_opcode_bytes(&[0x0f, opcode]);
    enc.encode_modrm_rm(src);
    enc.encode_modrm_reg(dst);
    Ok(EncodedInstr::plain(enc.finish()))
}

fn encode_xchg(a: RM, b: RM) -> KataraResult<EncodedInstr> {
    if a.size() != b.size() {
        return Err(KataraError::encoding("xchg operand size mismatch"));
    }
    let (rm, reg) = match (a, b) {
        (RM::Mem(_), RM::Mem(_)) => return Err(KataraError::encoding("xchg does not accept two memory operands")),
        (rm, RM::Reg(reg)) => (rm, reg),
        (RM::Reg(reg), rm) => (rm, reg),
    };
    let mut enc = InstrEncoder::new();
    enc.set_operand_size(rm.size());
    enc.add_opcode_byte(if rm.size() == Size::K8 { 0x86 } else { 0x87 });
    enc.encode_modrm_rm(rm);
    enc.encode_modrm_reg(reg);
    Ok(EncodedInstr::plain(enc.finish()))
}

fn encode_push(src: RM) -> KataraResult<EncodedInstr> {
    match src {
        RM::Reg(r) => {
            if r.size() != Size::K64 {
                return Err(KataraError::encoding("push requires a 64-bit register"));
            }
            let mut enc = InstrEncoder::new();
            enc.add_opcode_byte(0x50);
            enc.encode_reg_in_opcode(r, 0);
            Ok(EncodedInstr::plain(enc.finish()))
        }
        RM::Mem(m) => {
            if m.size() != Size::K64 {
                return Err(KataraError::encoding("push requires a 64-bit memory operand"));
            }
            let mut enc = InstrEncoder::new();
            enc.add_opcode_byte(0xff);
            enc.encode_modrm_rm(RM::Mem(m));
            enc.encode_modrm_opcode_ext(6);
            Ok(EncodedInstr::plain(enc.finish()))
        }
    }
}

fn encode_push_imm(imm: Imm) -> KataraResult<EncodedInstr> {
    let mut enc = InstrEncoder::new();
    enc.add_opcode_byte(0x68);
    enc.encode_imm(fit_imm(imm, Size::K32)?);
    Ok(EncodedInstr::plain(enc.finish()))
}

fn encode_pop(dst: RM) -> KataraResult<EncodedInstr> {
    match dst {
        RM::Reg(r) => {
            if r.size() != Size::K64 {
                return Err(KataraError::encoding("pop requires a 64-bit register"));
            }
            let mut enc = InstrEncoder::new();
            enc.add_opcode_byte(0x58);
            enc.encode_reg_in_opcode(r, 0);
            Ok(EncodedInstr::plain(enc.finish()))
        }
        RM::Mem(m) => {
            if m.size() != Size::K64 {
                return Err(KataraError::encoding("pop requires a 64-bit memory operand"));
            }
            let mut enc = InstrEncoder::new();
            enc.add_opcode_byte(0x8f);
            enc.encode_modrm_rm(RM::Mem(m));
            enc.encode_modrm_opcode_ext(0);
            Ok(EncodedInstr::plain(enc.finish()))
        }
    }
}

fn encode_setcc(cond: InstrCond, dst: RM) -> KataraResult<EncodedInstr> {
    if dst.size() != Size::K8 {
        return Err(KataraError::encoding("setcc requires an 8-bit destination"));
    }
    let mut enc = InstrEncoder::new();
    enc.add_opcode_bytes(&[0x0f, 0x90 | cond.opcode_bits()]);
    enc.encode_modrm_rm(dst);
    enc.encode_modrm_opcode_ext(0);
    Ok(EncodedInstr::plain(enc.finish()))
}

fn encode_unary(op: UnaryALOp, dst: RM) -> KataraResult<EncodedInstr> {
    let mut enc = InstrEncoder::new();
    enc.set_operand_size(dst.size());
    enc.add_opcode_byte(if dst.size() == Size::K8 { 0xf6 } else { 0xf7 });
    enc.encode_modrm_rm(dst);
    enc.encode_modrm_opcode_ext(op.ext());
    Ok(EncodedInstr::plain(enc.finish()))
}

fn encode_binary(op: BinaryALOp, dst: RM, src: Operand) -> KataraResult<EncodedInstr> {
    match src {
        Operand::Reg(reg) => {
            if reg.size() != dst.size() {
                return Err(KataraError::encoding("binary ALU operand size mismatch"));
            }
            let mut enc = InstrEncoder::new();
            enc.set_operand_size(dst.size());
            enc.add_opcode_byte(op.ext() * 8 + if dst.size() == Size::K8 { 0 } else { 1 });
            enc.encode_modrm_rm(dst);
            enc.encode_modrm_reg(reg);
            Ok(EncodedInstr::plain(enc.finish()))
        }
        Operand::Imm(imm) => {
            let mut enc = InstrEncoder::new();
            enc.set_operand_size(dst.size());
            if dst.size() == Size::K8 {
                enc.add_opcode_byte(0x80);
                enc.encode_modrm_rm(dst);
                enc.encode_modrm_opcode_ext(op.ext());
                enc.encode_imm(fit_imm(imm, Size::K8)?);
            } else if (-128..=127).contains(&imm.value()) {
                enc.add_opcode_byte(0x83);
                enc.encode_modrm_rm(dst);
                enc.encode_modrm_opcode_ext(op.ext());
                enc.encode_imm(Imm::new8(imm.value() as i8));
            } else {
                enc.add_opcode_byte(0x81);
                enc.encode_modrm_rm(dst);
                enc.encode_modrm_opcode_ext(op.ext());
                enc.encode_imm(fit_imm(imm, Size::K32)?);
            }
            Ok(EncodedInstr::plain(enc.finish()))
        }
        Operand::Mem(_) | Operand::FuncRef(_) | Operand::BlockRef(_) => {
            Err(KataraError::encoding("binary ALU instruction requires a register or immediate source"))
        }
    }
}

fn encode_sign_extend_rega(dst_size: Size) -> KataraResult<EncodedInstr> {
    if dst_size == Size::K8 {
        return Err(KataraError::encoding("sign-extend-into-A requires at least a 16-bit destination"));
    }
    let mut enc = InstrEncoder::new();
    enc.set_operand_size(dst_size);
    enc.add_opcode_byte(0x98);
    Ok(EncodedInstr::plain(enc.finish()))
}

fn encode_sign_extend_regad(dst_size: Size) -> KataraResult<EncodedInstr> {
    if dst_size == Size::K8 {
        return Err(KataraError::encoding("sign-extend-into-A:D requires at least a 16-bit destination"));
    }
    let mut enc = InstrEncoder::new();
    enc.set_operand_size(dst_size);
    enc.add_opcode_byte(0x99);
    Ok(EncodedInstr::plain(enc.finish()))
}

fn encode_test(dst: RM, src: Operand) -> KataraResult<EncodedInstr> {
    match src {
        Operand::Reg(reg) => {
            if reg.size() != dst.size() {
                return Err(KataraError::encoding("test operand size mismatch"));
            }
            let mut enc = InstrEncoder::new();
            enc.set_operand_size(dst.size());
            enc.add_opcode_byte(if dst.size() == Size::K8 { 0x84 } else { 0x85 });
            enc.encode_modrm_rm(dst);
            enc.encode_modrm_reg(reg);
            Ok(EncodedInstr::plain(enc.finish()))
        }
        Operand::Imm(imm) => {
            let mut enc = InstrEncoder::new();
            enc.set_operand_size(dst.size());
            enc.add_opcode_byte(if dst.size() == Size::K8 { 0xf6 } else { 0xf7 });
            enc.encode_modrm_rm(dst);
            enc.encode_modrm_opcode_ext(0);
            let imm = fit_imm(imm, if dst.size() == Size::K8 { Size::K8 } else { Size::K32 })?;
            enc.encode_imm(imm);
            Ok(EncodedInstr::plain(enc.finish()))
        }
        Operand::Mem(_) | Operand::FuncRef(_) | Operand::BlockRef(_) => {
            Err(KataraError::encoding("test requires a register or immediate source"))
        }
    }
}

fn encode_shift_by_cl(op: ShiftOp, dst: RM) -> KataraResult<EncodedInstr> {
    let mut enc = InstrEncoder::new();
    enc.set_operand_size(dst.size());
    enc.add_opcode_byte(if dst.size() == Size::K8 { 0xd2 } else { 0xd3 });
    enc.encode_modrm_rm(dst);
    enc.encode_modrm_opcode_ext(op.ext());
    Ok(EncodedInstr::plain(enc.finish()))
}

fn encode_jcc(cond: InstrCond, target: BlockRef) -> EncodedInstr {
    let mut enc = InstrEncoder::new();
    enc.add_opcode_bytes(&[0x0f, 0x80 | cond.opcode_bits()]);
    let offset = enc.reserve_patch_bytes(4);
    EncodedInstr { bytes: enc.finish(), patch: Some(Patch { offset, target: PatchTarget::Block(target) }) }
}

fn encode_jmp(target: BlockRef) -> EncodedInstr {
    let mut enc = InstrEncoder::new();
    enc.add_opcode_byte(0xe9);
    let offset = enc.reserve_patch_bytes(4);
    EncodedInstr { bytes: enc.finish(), patch: Some(Patch { offset, target: PatchTarget::Block(target) }) }
}

fn encode_call(target: CallTarget) -> KataraResult<EncodedInstr> {
    match target {
        CallTarget::Func(func) => {
            let mut enc = InstrEncoder::new();
            enc.add_opcode_byte(0xe8);
            let offset = enc.reserve_patch_bytes(4);
            Ok(EncodedInstr { bytes: enc.finish(), patch: Some(Patch { offset, target: PatchTarget::Func(func) }) })
        }
        CallTarget::Extern(name) => {
            let mut enc = InstrEncoder::new();
            enc.add_opcode_byte(0xe8);
            let offset = enc.reserve_patch_bytes(4);
            Ok(EncodedInstr { bytes: enc.finish(), patch: Some(Patch { offset, target: PatchTarget::Extern(name) }) })
        }
        CallTarget::Indirect(rm) => {
            if rm.size() != Size::K64 {
                return Err(KataraError::encoding("indirect call requires a 64-bit operand"));
            }
            let mut enc = InstrEncoder::new();
            enc.add_opcode_byte(0xff);
            enc.encode_modrm_rm(rm);
            enc.encode_modrm_opcode_ext(2);
            Ok(EncodedInstr::plain(enc.finish()))
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Mov { dst, src } => write!(f, "mov {dst}, {src}"),
            Instr::MovExtend { signed, dst, src } => {
                write!(f, "{} {dst}, {src}", if *signed { "movsx" } else { "movzx" })
            }
            Instr::Xchg { a, b } => write!(f, "xchg {a}, {b}"),
            Instr::Push { src } => write!(f, "push {src}"),
            Instr::PushImm { imm } => write!(f, "push {imm}"),
            Instr::Pop { dst } => write!(f, "pop {dst}"),
            Instr::Setcc { cond, dst } => write!(f, "set{cond} {dst}"),
            Instr::Unary { op, dst } => write!(f, "{} {dst}", op.mnemonic()),
            Instr::Binary { op, dst, src } => write!(f, "{} {dst}, {src}", op.mnemonic()),
            Instr::SignExtendRegA { .. } => write!(f, "cwd-family sign-extend-a"),
            Instr::SignExtendRegAD { .. } => write!(f, "cwd-family sign-extend-ad"),
            Instr::Test { dst, src } => write!(f, "test {dst}, {src}"),
            Instr::ShiftByCl { op, dst } => write!(f, "{} {dst}, cl", op.mnemonic()),
            Instr::Jcc { cond, target } => write!(f, "j{cond} {target}"),
            Instr::Jmp { target } => write!(f, "jmp {target}"),
            Instr::Call { target } => match target {
                CallTarget::Func(f_ref) => write!(f, "call {f_ref}"),
                CallTarget::Extern(name) => write!(f, "call {name}"),
                CallTarget::Indirect(rm) => write!(f, "call {rm}"),
            },
            Instr::Syscall => write!(f, "syscall"),
            Instr::Ret => write!(f, "ret"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::regs;

    #[test]
    fn ret_is_a_single_byte() {
        assert_eq!(Instr::Ret.encode().unwrap().bytes, vec![0xc3]);
    }

    #[test]
    fn jmp_reserves_a_four_byte_patch_after_its_opcode() {
        let encoded = Instr::Jmp { target: BlockRef(2) }.encode().unwrap();
        assert_eq!(encoded.bytes.len(), 5);
        let patch = encoded.patch.unwrap();
        assert_eq!(patch.offset, 1);
        assert_eq!(patch.target, PatchTarget::Block(BlockRef(2)));
    }

    #[test]
    fn call_opcode_is_e8() {
        let encoded = Instr::Call { target: CallTarget::Func(FuncRef(7)) }.encode().unwrap();
        assert_eq!(encoded.bytes[0], 0xe8);
        assert_eq!(encoded.patch.unwrap().target, PatchTarget::Func(FuncRef(7)));
    }

    #[test]
    fn extern_call_patches_to_an_extern_target() {
        let encoded = Instr::Call { target: CallTarget::Extern("malloc") }.encode().unwrap();
        assert_eq!(encoded.bytes[0], 0xe8);
        assert_eq!(encoded.patch.unwrap().target, PatchTarget::Extern("malloc"));
    }

    #[test]
    fn indirect_call_uses_ff_slash_2_with_no_patch() {
        let encoded = Instr::Call { target: CallTarget::Indirect(RM::Reg(regs::rax())) }.encode().unwrap();
        assert_eq!(encoded.bytes, vec![0xff, 0xd0]);
        assert!(encoded.patch.is_none());
    }

    #[test]
    fn shift_by_cl_uses_d3_with_the_op_extension() {
        let encoded = Instr::ShiftByCl { op: ShiftOp::Sar, dst: RM::Reg(regs::eax()) }.encode().unwrap();
        assert_eq!(encoded.bytes, vec![0xd3, 0xf8]);
    }

    #[test]
    fn add_reg_reg_64bit_uses_rex_w() {
        let encoded = Instr::Binary {
            op: BinaryALOp::Add,
            dst: RM::Reg(regs::rax()),
            src: Operand::Reg(regs::rcx()),
        }
        .encode()
        .unwrap();
        assert_eq!(encoded.bytes, vec![0x48, 0x01, 0xc8]);
    }

    #[test]
    fn cmp_reg_small_imm_uses_sign_extended_imm8_form() {
        let encoded = Instr::Binary {
            op: BinaryALOp::Cmp,
            dst: RM::Reg(regs::eax()),
            src: Operand::Imm(Imm::new32(5)),
        }
        .encode()
        .unwrap();
        assert_eq!(encoded.bytes, vec![0x83, 0xf8, 0x05]);
    }

    #[test]
    fn movzx_byte_to_32_uses_0f_b6() {
        let encoded = Instr::MovExtend { signed: false, dst: regs::eax(), src: RM::Reg(regs::cl()) }.encode().unwrap();
        assert_eq!(encoded.bytes, vec![0x0f, 0xb6, 0xc1]);
    }

    #[test]
    fn zero_extend_32_to_64_is_a_plain_32bit_mov() {
        let encoded = Instr::MovExtend { signed: false, dst: regs::rax(), src: RM::Reg(regs::ecx()) }.encode().unwrap();
        assert_eq!(encoded.bytes, vec![0x8b, 0xc1]);
    }

    #[test]
    fn sign_extend_32_to_64_uses_movsxd_opcode_63() {
        let encoded = Instr::MovExtend { signed: true, dst: regs::rax(), src: RM::Reg(regs::ecx()) }.encode().unwrap();
        assert_eq!(encoded.bytes, vec![0x48, 0x63, 0xc1]);
    }

    #[test]
    fn mov_mem_mem_is_rejected() {
        use crate::ops::Mem;
        let mem = Mem::disp_only(Size::K64, 0);
        let result = Instr::Mov { dst: RM::Mem(mem), src: Operand::Mem(mem) }.encode();
        assert!(result.is_err());
    }
}
