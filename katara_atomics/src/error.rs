//! Errors raised while parsing or evaluating atomic values.

use crate::int_type::IntType;
use thiserror::Error;

/// Failure modes for arithmetic/compare operations and for textual
/// parsing of integer literals. These are user/interpreter-visible: a
/// division by zero or a shift past the operand width is a property of
/// the interpreted program, not a compiler bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtomicsError {
    #[error("operand type mismatch: {a} vs {b}")]
    TypeMismatch { a: IntType, b: IntType },

    #[error("division by zero")]
    DivisionByZero,

    #[error("remainder by zero")]
    RemainderByZero,

    #[error("shift amount {amount} is not less than operand width {width}")]
    ShiftAmountTooLarge { amount: u64, width: u32 },

    #[error("'{text}' is not a valid {ty} literal in base {base}")]
    ParseFailure { text: String, ty: IntType, base: u32 },

    #[error("{value} cannot be represented as {target}")]
    ConversionOverflow { value: i128, target: IntType },
}

pub type AtomicsResult<T> = Result<T, AtomicsError>;
