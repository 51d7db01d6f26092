//! `Bool`: the boolean atomic value and its operators.

use serde::{Deserialize, Serialize};

/// Boolean binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolBinaryOp {
    Eq,
    Neq,
    And,
    Or,
}

impl BoolBinaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BoolBinaryOp::Eq => "beq",
            BoolBinaryOp::Neq => "bneq",
            BoolBinaryOp::And => "band",
            BoolBinaryOp::Or => "bor",
        }
    }

    pub fn parse(s: &str) -> Option<BoolBinaryOp> {
        Some(match s {
            "beq" => BoolBinaryOp::Eq,
            "bneq" => BoolBinaryOp::Neq,
            "band" => BoolBinaryOp::And,
            "bor" => BoolBinaryOp::Or,
            _ => return None,
        })
    }

    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            BoolBinaryOp::Eq => a == b,
            BoolBinaryOp::Neq => a != b,
            BoolBinaryOp::And => a && b,
            BoolBinaryOp::Or => a || b,
        }
    }
}

/// Renders a bool the way the textual IR format spells it.
pub fn bool_to_string(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

pub fn bool_from_str(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_ops_match_truth_tables() {
        assert!(BoolBinaryOp::And.apply(true, true));
        assert!(!BoolBinaryOp::And.apply(true, false));
        assert!(BoolBinaryOp::Or.apply(false, true));
        assert!(BoolBinaryOp::Eq.apply(false, false));
        assert!(BoolBinaryOp::Neq.apply(true, false));
    }

    #[test]
    fn bool_string_round_trips() {
        assert_eq!(bool_from_str(bool_to_string(true)), Some(true));
        assert_eq!(bool_from_str(bool_to_string(false)), Some(false));
    }
}
