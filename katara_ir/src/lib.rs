//! The Katara IR: program/function/block/instruction/value/type data
//! model (C2), its textual format (C3) and its verifier (C4).

pub mod extension;
pub mod issues;
pub mod program;
pub mod representation;
pub mod text;
pub mod verifier;

pub use program::Program;
pub use representation::block::Block;
pub use representation::function::Function;
pub use representation::ids::{BlockNum, Counter, FuncNum, TypeId, ValueNum};
pub use representation::instr::{ExtInstr, Instr, InstrKind};
pub use representation::types::{Signature, Type, TypeTable};
pub use representation::value::{int_const, Constant, Value};
