//! Condition codes used by `Jcc`/`Setcc`, grounded on
//! `examples/original_source/src/x86_64/instrs/instr_cond.h`/`.cc`.

use katara_atomics::IntCompareOp;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrCond {
    Overflow,
    NotOverflow,
    Sign,
    NotSign,
    Equal,
    NotEqual,
    Below,
    BelowOrEqual,
    Above,
    AboveOrEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl InstrCond {
    /// The low nibble of the condition-code opcode family (used by both
    /// `Jcc rel32` (`0f 8x`) and `Setcc r/m8` (`0f 9x`)).
    pub fn opcode_bits(self) -> u8 {
        match self {
            InstrCond::Overflow => 0x0,
            InstrCond::NotOverflow => 0x1,
            InstrCond::Below => 0x2,
            InstrCond::AboveOrEqual => 0x3,
            InstrCond::Equal => 0x4,
            InstrCond::NotEqual => 0x5,
            InstrCond::BelowOrEqual => 0x6,
            InstrCond::Above => 0x7,
            InstrCond::Sign => 0x8,
            InstrCond::NotSign => 0x9,
            InstrCond::Less => 0xc,
            InstrCond::GreaterOrEqual => 0xd,
            InstrCond::LessOrEqual => 0xe,
            InstrCond::Greater => 0xf,
        }
    }

    pub fn to_suffix_string(self) -> &'static str {
        match self {
            InstrCond::Overflow => "o",
            InstrCond::NotOverflow => "no",
            InstrCond::Sign => "s",
            InstrCond::NotSign => "ns",
            InstrCond::Equal => "e",
            InstrCond::NotEqual => "ne",
            InstrCond::Below => "b",
            InstrCond::BelowOrEqual => "be",
            InstrCond::Above => "a",
            InstrCond::AboveOrEqual => "ae",
            InstrCond::Less => "l",
            InstrCond::LessOrEqual => "le",
            InstrCond::Greater => "g",
            InstrCond::GreaterOrEqual => "ge",
        }
    }

    /// Maps a signed-or-unsigned IR comparison into the flag test that
    /// follows a `Cmp` computing `lhs - rhs`.
    pub fn for_int_compare(op: IntCompareOp, signed: bool) -> InstrCond {
        match (op, signed) {
            (IntCompareOp::Eq, _) => InstrCond::Equal,
            (IntCompareOp::Neq, _) => InstrCond::NotEqual,
            (IntCompareOp::Lss, true) => InstrCond::Less,
            (IntCompareOp::Lss, false) => InstrCond::Below,
            (IntCompareOp::Leq, true) => InstrCond::LessOrEqual,
            (IntCompareOp::Leq, false) => InstrCond::BelowOrEqual,
            (IntCompareOp::Geq, true) => InstrCond::GreaterOrEqual,
            (IntCompareOp::Geq, false) => InstrCond::AboveOrEqual,
            (IntCompareOp::Gtr, true) => InstrCond::Greater,
            (IntCompareOp::Gtr, false) => InstrCond::Above,
        }
    }
}

impl fmt::Display for InstrCond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_suffix_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_less_than_maps_to_below() {
        assert_eq!(InstrCond::for_int_compare(IntCompareOp::Lss, false), InstrCond::Below);
    }

    #[test]
    fn signed_less_than_maps_to_less() {
        assert_eq!(InstrCond::for_int_compare(IntCompareOp::Lss, true), InstrCond::Less);
    }

    #[test]
    fn suffixes_match_assembler_mnemonics() {
        assert_eq!(InstrCond::Equal.to_suffix_string(), "e");
        assert_eq!(InstrCond::GreaterOrEqual.to_suffix_string(), "ge");
    }
}
