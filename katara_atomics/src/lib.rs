//! Sized integer and boolean atomic values: parsing/formatting in
//! arbitrary bases, and the operators the IR instruction set exposes over
//! them. Arithmetic wraps per two's-complement (signed) or modular
//! (unsigned) semantics; division and remainder by zero fail
//! deterministically instead of panicking, since they are properties of
//! the interpreted program rather than of the compiler.

pub mod bool_value;
pub mod error;
pub mod int_type;
pub mod int_value;

pub use bool_value::{bool_from_str, bool_to_string, BoolBinaryOp};
pub use error::{AtomicsError, AtomicsResult};
pub use int_type::IntType;
pub use int_value::{Int, IntBinaryOp, IntCompareOp, IntShiftOp, IntUnaryOp};
