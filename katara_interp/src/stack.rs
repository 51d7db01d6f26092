//! The interpreter's call stack (spec.md §4.7 "Stack"), grounded on
//! `examples/original_source/src/ir/interpreter/execution_point.h`/`.cc`.
//! A frame tracks the function and block currently executing, the block
//! that was left to reach it (needed to resolve `Phi`), the next
//! instruction to execute, and the bindings of every value number
//! computed so far in that frame.

use katara_ir::{BlockNum, Constant, FuncNum, ValueNum};
use std::collections::HashMap;

/// One activation record. `previous_block` is `None` at function entry
/// and whenever a `Phi` cannot legally appear (spec.md §4.7: "Phi: look
/// up the argument whose origin block equals the frame's previous
/// block").
#[derive(Debug, Clone)]
pub struct Frame {
    pub func: FuncNum,
    pub previous_block: Option<BlockNum>,
    pub current_block: BlockNum,
    pub next_instr_index: usize,
    bindings: HashMap<ValueNum, Constant>,
}

impl Frame {
    pub fn at_func_entry(func: FuncNum, entry_block: BlockNum) -> Self {
        Self {
            func,
            previous_block: None,
            current_block: entry_block,
            next_instr_index: 0,
            bindings: HashMap::new(),
        }
    }

    pub fn bind(&mut self, value: ValueNum, constant: Constant) {
        self.bindings.insert(value, constant);
    }

    pub fn lookup(&self, value: ValueNum) -> Option<Constant> {
        self.bindings.get(&value).copied()
    }

    pub fn advance_to_next_instr(&mut self) {
        self.next_instr_index += 1;
    }

    pub fn jump_to(&mut self, target: BlockNum) {
        self.previous_block = Some(self.current_block);
        self.current_block = target;
        self.next_instr_index = 0;
    }
}

/// An ordered list of frames; the last is the one currently executing.
/// `depth()` drives the debugger's step-over/step-out logic (spec.md
/// §4.8).
#[derive(Debug, Clone, Default)]
pub struct Stack {
    frames: Vec<Frame>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}
