//! `Program`: owns the set of functions and the program-wide type table.
//! Mirrors `Function`'s arena-ownership discipline (spec.md §9): function
//! numbers are dense, monotonically increasing and never recycled.

use crate::representation::function::Function;
use crate::representation::ids::{Counter, FuncNum};
use crate::representation::types::TypeTable;
use katara_common::{KataraError, KataraResult, Span};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    functions: Vec<Option<Function>>,
    entry_func: Option<FuncNum>,
    func_counter: Counter,
    pub types: TypeTable,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func(&mut self, span: Span) -> FuncNum {
        let number = FuncNum(self.func_counter.next_u32());
        self.functions.push(Some(Function::new(number, span)));
        number
    }

    /// Inserts a function parsed with an explicit number. Fails if that
    /// number has already been used (spec.md §4.2: "the program refuses to
    /// add a function with an already-used number").
    pub fn insert_func_with_number(&mut self, number: FuncNum, span: Span) -> KataraResult<()> {
        let index = number.index();
        if index < self.functions.len() && self.functions[index].is_some() {
            return Err(KataraError::invariant(format!(
                "function number {} is already in use",
                number
            )));
        }
        self.func_counter.observe(number.0);
        if self.functions.len() <= index {
            self.functions.resize(index + 1, None);
        }
        self.functions[index] = Some(Function::new(number, span));
        Ok(())
    }

    /// Stores a fully-built `Function` under its own `number`, refusing to
    /// overwrite one already in use. Used by the textual parser, which
    /// builds a function locally (param types, blocks, instructions) and
    /// only inserts it into the program once parsing of its body
    /// completes.
    pub fn put_func(&mut self, func: Function) -> KataraResult<()> {
        let number = func.number;
        let index = number.index();
        if index < self.functions.len() && self.functions[index].is_some() {
            return Err(KataraError::invariant(format!("function number {} is already in use", number)));
        }
        self.func_counter.observe(number.0);
        if self.functions.len() <= index {
            self.functions.resize(index + 1, None);
        }
        self.functions[index] = Some(func);
        Ok(())
    }

    pub fn get_func(&self, number: FuncNum) -> Option<&Function> {
        self.functions.get(number.index()).and_then(|f| f.as_ref())
    }

    pub fn get_func_mut(&mut self, number: FuncNum) -> Option<&mut Function> {
        self.functions.get_mut(number.index()).and_then(|f| f.as_mut())
    }

    pub fn remove_func(&mut self, number: FuncNum) {
        if let Some(slot) = self.functions.get_mut(number.index()) {
            *slot = None;
        }
    }

    pub fn funcs(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter_map(|f| f.as_ref())
    }

    pub fn entry_func(&self) -> Option<FuncNum> {
        self.entry_func
    }

    pub fn set_entry_func(&mut self, number: FuncNum) {
        self.entry_func = Some(number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_numbers_are_not_recycled() {
        let mut program = Program::new();
        let f0 = program.add_func(Span::synthetic());
        program.remove_func(f0);
        let f1 = program.add_func(Span::synthetic());
        assert_ne!(f0, f1);
    }

    #[test]
    fn inserting_a_reused_number_fails() {
        let mut program = Program::new();
        program.insert_func_with_number(FuncNum(3), Span::synthetic()).unwrap();
        assert!(program.insert_func_with_number(FuncNum(3), Span::synthetic()).is_err());
    }
}
