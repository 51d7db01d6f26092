//! Maps IR types to their x86-64 operand width, grounded on
//! `examples/original_source/src/x86_64/ir_translator/size_translator.cc`.

use crate::ops::Size;
use katara_atomics::IntType;
use katara_common::{KataraError, KataraResult};
use katara_ir::Type;

pub fn size_of_type(ty: Type) -> KataraResult<Size> {
    match ty {
        Type::Bool => Ok(Size::K8),
        Type::Int(int_ty) => size_of_int_type(int_ty),
        Type::Pointer | Type::Func(_) => Ok(Size::K64),
    }
}

pub fn size_of_int_type(ty: IntType) -> KataraResult<Size> {
    match ty.bits() {
        8 => Ok(Size::K8),
        16 => Ok(Size::K16),
        32 => Ok(Size::K32),
        64 => Ok(Size::K64),
        other => Err(KataraError::encoding(format!("unsupported integer width {other} bits"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_one_byte() {
        assert_eq!(size_of_type(Type::Bool).unwrap(), Size::K8);
    }

    #[test]
    fn pointer_is_eight_bytes() {
        assert_eq!(size_of_type(Type::Pointer).unwrap(), Size::K64);
    }

    #[test]
    fn i128_is_rejected() {
        assert!(size_of_type(Type::Int(IntType::I64)).is_ok());
    }
}
