use katara_atomics::{Int, IntBinaryOp, IntType};
use proptest::prelude::*;

fn arb_i32() -> impl Strategy<Value = i32> {
    any::<i32>()
}

proptest! {
    #[test]
    fn i32_add_matches_wrapping_add(a in arb_i32(), b in arb_i32()) {
        let lhs = Int::new(IntType::I32, a as i64);
        let rhs = Int::new(IntType::I32, b as i64);
        let result = lhs.binary(IntBinaryOp::Add, rhs).unwrap();
        prop_assert_eq!(result.to_i64() as i32, a.wrapping_add(b));
    }

    #[test]
    fn i32_sub_matches_wrapping_sub(a in arb_i32(), b in arb_i32()) {
        let lhs = Int::new(IntType::I32, a as i64);
        let rhs = Int::new(IntType::I32, b as i64);
        let result = lhs.binary(IntBinaryOp::Sub, rhs).unwrap();
        prop_assert_eq!(result.to_i64() as i32, a.wrapping_sub(b));
    }

    #[test]
    fn u8_parse_then_format_round_trips(value in 0u8..=255) {
        let int = Int::new(IntType::U8, value as i64);
        let text = int.to_string_radix(10);
        let parsed = Int::parse(&text, IntType::U8, 10).unwrap();
        prop_assert_eq!(parsed.to_u64(), value as u64);
    }

    #[test]
    fn compare_is_antisymmetric(a in arb_i32(), b in arb_i32()) {
        use katara_atomics::IntCompareOp::*;
        let lhs = Int::new(IntType::I32, a as i64);
        let rhs = Int::new(IntType::I32, b as i64);
        let lss = lhs.compare(Lss, rhs).unwrap();
        let gtr = rhs.compare(Lss, lhs).unwrap();
        if a != b {
            prop_assert_ne!(lss, gtr);
        }
    }
}
