//! `Int`: a sized integer value with well-defined wraparound semantics.

use crate::error::{AtomicsError, AtomicsResult};
use crate::int_type::IntType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A sized integer value. The raw bits are always stored masked to the
/// type's width; signed values use two's complement inside that mask, so
/// the same `u64` storage works for both signedness classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Int {
    ty: IntType,
    bits: u64,
}

/// Binary arithmetic/bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    AndNot,
}

impl IntBinaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            IntBinaryOp::Add => "iadd",
            IntBinaryOp::Sub => "isub",
            IntBinaryOp::Mul => "imul",
            IntBinaryOp::Div => "idiv",
            IntBinaryOp::Rem => "irem",
            IntBinaryOp::And => "iand",
            IntBinaryOp::Or => "ior",
            IntBinaryOp::Xor => "ixor",
            IntBinaryOp::AndNot => "iandnot",
        }
    }

    pub fn parse(s: &str) -> Option<IntBinaryOp> {
        Some(match s {
            "iadd" => IntBinaryOp::Add,
            "isub" => IntBinaryOp::Sub,
            "imul" => IntBinaryOp::Mul,
            "idiv" => IntBinaryOp::Div,
            "irem" => IntBinaryOp::Rem,
            "iand" => IntBinaryOp::And,
            "ior" => IntBinaryOp::Or,
            "ixor" => IntBinaryOp::Xor,
            "iandnot" => IntBinaryOp::AndNot,
            _ => return None,
        })
    }
}

/// Unary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntUnaryOp {
    Neg,
    Not,
}

impl IntUnaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            IntUnaryOp::Neg => "ineg",
            IntUnaryOp::Not => "inot",
        }
    }

    pub fn parse(s: &str) -> Option<IntUnaryOp> {
        Some(match s {
            "ineg" => IntUnaryOp::Neg,
            "inot" => IntUnaryOp::Not,
            _ => return None,
        })
    }
}

/// Shift operators. The shift amount is always an unsigned bit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntShiftOp {
    Left,
    Right,
}

impl IntShiftOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            IntShiftOp::Left => "ishl",
            IntShiftOp::Right => "ishr",
        }
    }

    pub fn parse(s: &str) -> Option<IntShiftOp> {
        Some(match s {
            "ishl" => IntShiftOp::Left,
            "ishr" => IntShiftOp::Right,
            _ => return None,
        })
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntCompareOp {
    Eq,
    Neq,
    Lss,
    Leq,
    Geq,
    Gtr,
}

impl IntCompareOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            IntCompareOp::Eq => "ieq",
            IntCompareOp::Neq => "ineq",
            IntCompareOp::Lss => "ilss",
            IntCompareOp::Leq => "ileq",
            IntCompareOp::Geq => "igeq",
            IntCompareOp::Gtr => "igtr",
        }
    }

    pub fn parse(s: &str) -> Option<IntCompareOp> {
        Some(match s {
            "ieq" => IntCompareOp::Eq,
            "ineq" => IntCompareOp::Neq,
            "ilss" => IntCompareOp::Lss,
            "ileq" => IntCompareOp::Leq,
            "igeq" => IntCompareOp::Geq,
            "igtr" => IntCompareOp::Gtr,
            _ => return None,
        })
    }

    /// The operator obtained by swapping the two operands, used by the
    /// lowering when a constant operand is moved from the B to the A
    /// position of a `Cmp` instruction.
    pub fn flipped(self) -> IntCompareOp {
        match self {
            IntCompareOp::Eq => IntCompareOp::Eq,
            IntCompareOp::Neq => IntCompareOp::Neq,
            IntCompareOp::Lss => IntCompareOp::Gtr,
            IntCompareOp::Leq => IntCompareOp::Geq,
            IntCompareOp::Geq => IntCompareOp::Leq,
            IntCompareOp::Gtr => IntCompareOp::Lss,
        }
    }
}

impl Int {
    pub fn ty(self) -> IntType {
        self.ty
    }

    /// Builds an `Int` from a signed value, truncating (wrapping) it to
    /// the target type's width.
    pub fn new(ty: IntType, value: i64) -> Int {
        Int { ty, bits: (value as u64) & ty.mask() }
    }

    /// Builds an `Int` from raw, already-masked bit storage.
    pub fn from_bits(ty: IntType, bits: u64) -> Int {
        Int { ty, bits: bits & ty.mask() }
    }

    pub fn zero(ty: IntType) -> Int {
        Int { ty, bits: 0 }
    }

    pub fn raw_bits(self) -> u64 {
        self.bits
    }

    /// The value, sign- or zero-extended to a full `i64`/`u64` pair
    /// depending on signedness, always readable as `to_u64`.
    pub fn to_u64(self) -> u64 {
        self.bits
    }

    pub fn to_i64(self) -> i64 {
        if self.ty.is_signed() && self.ty.bits() < 64 {
            let shift = 64 - self.ty.bits();
            (((self.bits << shift) as i64) >> shift) as i64
        } else {
            self.bits as i64
        }
    }

    fn require_same_type(self, other: Int) -> AtomicsResult<()> {
        if self.ty != other.ty {
            Err(AtomicsError::TypeMismatch { a: self.ty, b: other.ty })
        } else {
            Ok(())
        }
    }

    pub fn binary(self, op: IntBinaryOp, rhs: Int) -> AtomicsResult<Int> {
        self.require_same_type(rhs)?;
        let ty = self.ty;
        let a = self.to_i64() as i128;
        let b = rhs.to_i64() as i128;
        let wrapped = match op {
            IntBinaryOp::Add => a.wrapping_add(b),
            IntBinaryOp::Sub => a.wrapping_sub(b),
            IntBinaryOp::Mul => a.wrapping_mul(b),
            IntBinaryOp::Div => {
                if rhs.bits == 0 {
                    return Err(AtomicsError::DivisionByZero);
                }
                if ty.is_signed() {
                    a.wrapping_div(b)
                } else {
                    ((self.bits as u128).wrapping_div(rhs.bits as u128)) as i128
                }
            }
            IntBinaryOp::Rem => {
                if rhs.bits == 0 {
                    return Err(AtomicsError::RemainderByZero);
                }
                if ty.is_signed() {
                    a.wrapping_rem(b)
                } else {
                    ((self.bits as u128).wrapping_rem(rhs.bits as u128)) as i128
                }
            }
            IntBinaryOp::And => return Ok(Int::from_bits(ty, self.bits & rhs.bits)),
            IntBinaryOp::Or => return Ok(Int::from_bits(ty, self.bits | rhs.bits)),
            IntBinaryOp::Xor => return Ok(Int::from_bits(ty, self.bits ^ rhs.bits)),
            IntBinaryOp::AndNot => return Ok(Int::from_bits(ty, self.bits & !rhs.bits)),
        };
        Ok(Int::new(ty, wrapped as i64))
    }

    pub fn unary(self, op: IntUnaryOp) -> Int {
        match op {
            IntUnaryOp::Neg => Int::new(self.ty, (self.to_i64() as i128).wrapping_neg() as i64),
            IntUnaryOp::Not => Int::from_bits(self.ty, !self.bits),
        }
    }

    pub fn shift(self, op: IntShiftOp, amount: Int) -> AtomicsResult<Int> {
        let width = self.ty.bits();
        let amount_bits = amount.to_u64();
        if amount_bits >= width as u64 {
            return Err(AtomicsError::ShiftAmountTooLarge { amount: amount_bits, width });
        }
        let shift = amount_bits as u32;
        let result = match op {
            IntShiftOp::Left => self.bits.wrapping_shl(shift),
            IntShiftOp::Right => {
                if self.ty.is_signed() {
                    (self.to_i64() >> shift) as u64
                } else {
                    self.bits >> shift
                }
            }
        };
        Ok(Int::from_bits(self.ty, result))
    }

    pub fn compare(self, op: IntCompareOp, rhs: Int) -> AtomicsResult<bool> {
        self.require_same_type(rhs)?;
        let ordering = if self.ty.is_signed() {
            self.to_i64().cmp(&rhs.to_i64())
        } else {
            self.to_u64().cmp(&rhs.to_u64())
        };
        Ok(match op {
            IntCompareOp::Eq => ordering.is_eq(),
            IntCompareOp::Neq => ordering.is_ne(),
            IntCompareOp::Lss => ordering.is_lt(),
            IntCompareOp::Leq => ordering.is_le(),
            IntCompareOp::Geq => ordering.is_ge(),
            IntCompareOp::Gtr => ordering.is_gt(),
        })
    }

    /// Whether this value can be losslessly converted to `target` (i.e.
    /// the conversion does not truncate any significant bits).
    pub fn can_convert_to(self, target: IntType) -> bool {
        let value = self.to_i64() as i128;
        fits(value, target)
    }

    /// Converts to `target`, wrapping if the value does not fit (mirrors
    /// a `static_cast`-style narrowing/widening conversion).
    pub fn convert_to(self, target: IntType) -> Int {
        Int::new(target, self.to_i64())
    }

    /// Formats the value in the given base (2..=36), using the type's
    /// signedness to decide whether a leading `-` is emitted.
    pub fn to_string_radix(self, base: u32) -> String {
        debug_assert!((2..=36).contains(&base));
        if self.ty.is_signed() {
            let value = self.to_i64();
            if value < 0 {
                format!("-{}", to_radix_string((value as i128).unsigned_abs(), base))
            } else {
                to_radix_string(value as u128, base)
            }
        } else {
            to_radix_string(self.to_u64() as u128, base)
        }
    }

    /// Parses a literal of the given integer type in the given base
    /// (2..=36). Rejects empty strings, leading/trailing whitespace, a
    /// sign on an unsigned type, and values that overflow the type.
    pub fn parse(text: &str, ty: IntType, base: u32) -> AtomicsResult<Int> {
        assert!((2..=36).contains(&base), "unsupported integer base");
        let fail = || AtomicsError::ParseFailure { text: text.to_string(), ty, base };
        if text.is_empty() {
            return Err(fail());
        }
        if text.chars().next().unwrap().is_whitespace() {
            return Err(fail());
        }
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        if negative && !ty.is_signed() {
            return Err(fail());
        }
        if digits.is_empty() {
            return Err(fail());
        }
        let mut magnitude: u128 = 0;
        for ch in digits.chars() {
            let digit = ch.to_digit(base).ok_or_else(fail)? as u128;
            magnitude = magnitude.checked_mul(base as u128).ok_or_else(fail)?;
            magnitude = magnitude.checked_add(digit).ok_or_else(fail)?;
        }
        let signed_value: i128 = if negative { -(magnitude as i128) } else { magnitude as i128 };
        if !fits(signed_value, ty) {
            return Err(fail());
        }
        Ok(Int::new(ty, signed_value as i64))
    }
}

fn fits(value: i128, ty: IntType) -> bool {
    if ty.is_signed() {
        let bits = ty.bits();
        let min = -(1i128 << (bits - 1));
        let max = (1i128 << (bits - 1)) - 1;
        value >= min && value <= max
    } else {
        let bits = ty.bits();
        let max = if bits == 128 { u128::MAX } else { (1u128 << bits) - 1 };
        value >= 0 && (value as u128) <= max
    }
}

fn to_radix_string(mut value: u128, base: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % base as u128) as usize]);
        value /= base as u128;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_radix(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraparound_add_at_signed_max() {
        let a = Int::new(IntType::I8, 127);
        let b = Int::new(IntType::I8, 1);
        assert_eq!(a.binary(IntBinaryOp::Add, b).unwrap().to_i64(), -128);
    }

    #[test]
    fn wraparound_sub_at_unsigned_min() {
        let a = Int::new(IntType::U8, 0);
        let b = Int::new(IntType::U8, 1);
        assert_eq!(a.binary(IntBinaryOp::Sub, b).unwrap().to_u64(), 255);
    }

    #[test]
    fn division_by_zero_fails() {
        let a = Int::new(IntType::I32, 10);
        let b = Int::new(IntType::I32, 0);
        assert_eq!(a.binary(IntBinaryOp::Div, b), Err(AtomicsError::DivisionByZero));
    }

    #[test]
    fn shift_past_width_fails() {
        let a = Int::new(IntType::I32, 1);
        let amount = Int::new(IntType::I32, 32);
        assert!(matches!(
            a.shift(IntShiftOp::Left, amount),
            Err(AtomicsError::ShiftAmountTooLarge { amount: 32, width: 32 })
        ));
    }

    #[test]
    fn parse_rejects_leading_whitespace() {
        assert!(Int::parse(" 1", IntType::I32, 10).is_err());
    }

    #[test]
    fn parse_rejects_sign_on_unsigned() {
        assert!(Int::parse("-1", IntType::U32, 10).is_err());
    }

    #[test]
    fn parse_rejects_overflow() {
        assert!(Int::parse("256", IntType::U8, 10).is_err());
        assert!(Int::parse("255", IntType::U8, 10).is_ok());
    }

    #[test]
    fn parse_hex_round_trips() {
        let value = Int::parse("ff", IntType::U8, 16).unwrap();
        assert_eq!(value.to_u64(), 255);
        assert_eq!(value.to_string_radix(16), "ff");
    }

    #[test]
    fn flipped_compare_op_reverses_ordering() {
        assert_eq!(IntCompareOp::Lss.flipped(), IntCompareOp::Gtr);
        assert_eq!(IntCompareOp::Eq.flipped(), IntCompareOp::Eq);
    }

    #[test]
    fn compare_with_mismatched_types_fails() {
        let a = Int::new(IntType::I32, 1);
        let b = Int::new(IntType::I64, 1);
        assert!(a.compare(IntCompareOp::Eq, b).is_err());
    }
}
