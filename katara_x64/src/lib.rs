//! The x86-64 backend (spec.md §4.9-§4.11): the register/memory/
//! immediate operand model and encoder (C9), IR-to-x86-64 lowering
//! (C10), and the symbolic linker (C11). `lowering::lower_program` is
//! the single entry point that ties the three together; `Program::link`
//! turns the result into a contiguous byte array.

pub mod abi;
pub mod cond;
pub mod encoder;
pub mod instr;
pub mod linker;
pub mod lowering;
pub mod ops;
pub mod program;

pub use cond::InstrCond;
pub use instr::{BinaryALOp, CallTarget, EncodedInstr, Instr, Patch, PatchTarget, ShiftOp, UnaryALOp};
pub use linker::Linker;
pub use lowering::lower_program;
pub use ops::{regs, BlockRef, FuncRef, Imm, Mem, Operand, Reg, Scale, Size, RM};
pub use program::{Block, Func, Program};
