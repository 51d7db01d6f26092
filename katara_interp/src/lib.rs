//! Reference execution of the Katara IR: a per-instruction interpreter
//! over a sanitizing heap, and a two-thread step debugger built on top
//! of it (spec.md §4.7, §4.8).

pub mod debugger;
pub mod heap;
pub mod interpreter;
pub mod stack;

pub use debugger::{Debugger, DebugError, DebugResult, ExecutionCommand, ExecutionState, Outcome};
pub use heap::{Heap, HeapError, HeapResult};
pub use interpreter::{InterpretError, InterpretResult, Interpreter, StepOutcome};
pub use stack::{Frame, Stack};
