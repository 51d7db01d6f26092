//! IR types: the four atomic categories the core's opcodes are defined
//! over, plus function signatures, interned in a `TypeTable` by
//! structural equality so that two functions with the same shape share a
//! `TypeId`.

use crate::representation::ids::TypeId;
use katara_atomics::IntType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A type ascribed to a value. `Func` carries a `TypeId` into the owning
/// program's type table rather than an inline `Signature`, so that
/// structurally-equal signatures are the same type by pointer/id identity
/// for the lifetime of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int(IntType),
    Pointer,
    Func(TypeId),
}

impl Type {
    pub fn is_atomic_compatible_for_conversion(self) -> bool {
        matches!(self, Type::Bool | Type::Int(_) | Type::Pointer | Type::Func(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int(int_ty) => write!(f, "{}", int_ty),
            Type::Pointer => write!(f, "ptr"),
            Type::Func(id) => write!(f, "func{}", id),
        }
    }
}

/// A function's shape: ordered parameter types and ordered result types.
/// Interned by structural equality in the owning program's `TypeTable`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
}

impl Signature {
    pub fn new(params: Vec<Type>, results: Vec<Type>) -> Self {
        Self { params, results }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, ") => (")?;
        for (i, ty) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, ")")
    }
}

/// Interns compound (function) types by structural equality, returning a
/// `TypeId` that stays valid and stable for the program's lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTable {
    signatures: Vec<Signature>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, signature: Signature) -> TypeId {
        if let Some(index) = self.signatures.iter().position(|s| *s == signature) {
            return TypeId(index as u32);
        }
        self.signatures.push(signature);
        TypeId((self.signatures.len() - 1) as u32)
    }

    pub fn get(&self, id: TypeId) -> &Signature {
        &self.signatures[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut table = TypeTable::new();
        let sig_a = Signature::new(vec![Type::Int(IntType::I64)], vec![Type::Bool]);
        let sig_b = Signature::new(vec![Type::Int(IntType::I64)], vec![Type::Bool]);
        let id_a = table.intern(sig_a);
        let id_b = table.intern(sig_b);
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn distinct_signatures_get_distinct_ids() {
        let mut table = TypeTable::new();
        let id_a = table.intern(Signature::new(vec![], vec![Type::Bool]));
        let id_b = table.intern(Signature::new(vec![], vec![Type::Pointer]));
        assert_ne!(id_a, id_b);
    }
}
