//! IR values: constants, computed (SSA-style) values and phi-only
//! inherited values.

use crate::representation::ids::{BlockNum, FuncNum, ValueNum};
use crate::representation::types::Type;
use katara_atomics::{Int, IntType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal value. Pointer and function constants are `Option`-wrapped
/// so that `nil`/a null function reference are representable without a
/// separate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    Int(Int),
    Pointer(Option<u64>),
    Func(Option<FuncNum>),
}

impl Constant {
    pub fn ty(self) -> Type {
        match self {
            Constant::Bool(_) => Type::Bool,
            Constant::Int(int) => Type::Int(int.ty()),
            Constant::Pointer(_) => Type::Pointer,
            Constant::Func(_) => {
                // The signature of a nil/known func constant is resolved by
                // the verifier against the program's function table; the
                // constant itself carries no `TypeId` since a literal
                // function reference's type is implied by its target.
                Type::Func(crate::representation::ids::TypeId(u32::MAX))
            }
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(b) => write!(f, "{}", katara_atomics::bool_to_string(*b)),
            Constant::Int(int) => write!(f, "{}:{}", int, int.ty()),
            Constant::Pointer(None) => write!(f, "nil"),
            Constant::Pointer(Some(addr)) => write!(f, "0x{:x}", addr),
            Constant::Func(None) => write!(f, "nil"),
            Constant::Func(Some(num)) => write!(f, "{}", num),
        }
    }
}

/// An operand or a phi argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Constant(Constant),
    /// Defined by exactly one instruction result or by a function
    /// parameter; identified by a function-local value number.
    Computed { number: ValueNum, ty: Type },
    /// Legal only as a `Phi` argument: the value as it exists at the end
    /// of `predecessor`.
    Inherited { value: Box<Value>, predecessor: BlockNum },
}

impl Value {
    pub fn computed(number: ValueNum, ty: Type) -> Value {
        Value::Computed { number, ty }
    }

    pub fn inherited(value: Value, predecessor: BlockNum) -> Value {
        Value::Inherited { value: Box::new(value), predecessor }
    }

    /// The value's type, looking through an `Inherited` wrapper.
    pub fn ty(&self) -> Type {
        match self {
            Value::Constant(c) => c.ty(),
            Value::Computed { ty, .. } => *ty,
            Value::Inherited { value, .. } => value.ty(),
        }
    }

    pub fn as_computed_number(&self) -> Option<ValueNum> {
        match self {
            Value::Computed { number, .. } => Some(*number),
            Value::Inherited { value, .. } => value.as_computed_number(),
            Value::Constant(_) => None,
        }
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self, Value::Inherited { .. })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(c) => write!(f, "{}", c),
            Value::Computed { number, .. } => write!(f, "{}", number),
            Value::Inherited { value, predecessor } => write!(f, "{}@{}", value, predecessor),
        }
    }
}

/// Convenience constructors mirroring the atomics crate's constant kinds.
impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Constant::Bool(value)
    }
}

impl From<Int> for Constant {
    fn from(value: Int) -> Self {
        Constant::Int(value)
    }
}

pub fn int_const(ty: IntType, value: i64) -> Constant {
    Constant::Int(Int::new(ty, value))
}
