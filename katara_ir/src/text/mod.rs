//! The IR's textual format: a scanner, a recursive-descent parser and a
//! printer that round-trips it exactly (spec.md §4.3, §6, §8).

pub mod parser;
pub mod printer;
pub mod scanner;

pub use parser::{parse_program, parse_program_with_extension, ParseError};
pub use printer::print_program;
