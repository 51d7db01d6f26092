//! Dense, monotonically-increasing numbers identifying IR entities. A
//! counter never recycles a number once handed out, even if the entity it
//! named is later removed — removed slots are tombstoned, not compacted.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! number_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

number_type!(FuncNum, "@");
number_type!(BlockNum, "");
number_type!(ValueNum, "%");
number_type!(TypeId, "$");

/// A monotonic counter that hands out fresh numbers and never reuses one,
/// matching `spec.md`'s "fresh function/block/value numbers are
/// monotonically increasing counters; removing a numbered entity does not
/// recycle its number."
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counter {
    next: u32,
}

impl Counter {
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    pub fn next_u32(&mut self) -> u32 {
        let value = self.next;
        self.next += 1;
        value
    }

    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Ensures the counter will not hand out `used` again, without
    /// generating a value itself — used when an already-numbered entity
    /// (e.g. parsed from text) is inserted directly.
    pub fn observe(&mut self, used: u32) {
        if used >= self.next {
            self.next = used + 1;
        }
    }
}
