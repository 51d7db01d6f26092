//! Reference execution of the IR (spec.md §4.7 "Step semantics"). One
//! `step()` call executes exactly one instruction, mirroring the
//! original's per-instruction `ExecuteStep` driven by the debugger's
//! worker thread (`examples/original_source/src/ir/interpreter/
//! execution_point.cc`, `debugger.cc`).

use crate::heap::{Heap, HeapError};
use crate::stack::{Frame, Stack};
use katara_atomics::{AtomicsError, Int};
use katara_ir::{BlockNum, Constant, FuncNum, Instr, InstrKind, Program, Type, Value, ValueNum};
use thiserror::Error;

/// Every way interpretation of an (already-verified) IR program can fail.
/// Heap misuse and arithmetic exceptions are user-visible properties of
/// the interpreted program (spec.md §7); the remaining variants indicate
/// that the program handed to the interpreter was not actually verified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    Atomics(#[from] AtomicsError),
    #[error("value {0} used before it was bound in the current frame")]
    UnboundValue(ValueNum),
    #[error("no phi argument for predecessor {0}")]
    NoPhiArgumentForPredecessor(BlockNum),
    #[error("phi instruction reached without a previous block")]
    PhiWithoutPreviousBlock,
    #[error("called value is not a known function")]
    CallToUnknownFunction,
    #[error("unknown function {0}")]
    UnknownFunc(FuncNum),
    #[error("dereferenced a nil pointer or function")]
    NilDereference,
    #[error("cannot convert {0} to {1}")]
    InvalidConversion(Constant, Type),
    #[error("stepped an already-terminated program")]
    AlreadyTerminated,
}

pub type InterpretResult<T> = Result<T, InterpretError>;

/// What `Interpreter::step` advanced past.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Terminated { exit_code: i64 },
}

/// Byte width of an atomic type's representation in the sanitizing heap.
fn byte_size(ty: Type) -> i64 {
    match ty {
        Type::Bool => 1,
        Type::Int(it) => (it.bits() / 8) as i64,
        Type::Pointer | Type::Func(_) => 8,
    }
}

fn constant_to_bits(c: Constant) -> u64 {
    match c {
        Constant::Bool(b) => b as u64,
        Constant::Int(i) => i.raw_bits(),
        Constant::Pointer(p) => p.unwrap_or(0),
        Constant::Func(f) => f.map_or(0, |n| n.0 as u64),
    }
}

fn bits_to_constant(bits: u64, ty: Type) -> Constant {
    match ty {
        Type::Bool => Constant::Bool(bits != 0),
        Type::Int(it) => Constant::Int(Int::from_bits(it, bits)),
        Type::Pointer => Constant::Pointer(if bits == 0 { None } else { Some(bits) }),
        Type::Func(_) => {
            Constant::Func(if bits == 0 { None } else { Some(FuncNum(bits as u32)) })
        }
    }
}

fn convert_constant(value: Constant, target: Type) -> InterpretResult<Constant> {
    let bits = match (value, target) {
        (Constant::Bool(_), Type::Bool)
        | (Constant::Int(_), Type::Int(_))
        | (Constant::Pointer(_), Type::Pointer)
        | (Constant::Func(_), Type::Func(_)) => return Ok(value),
        _ => constant_to_bits(value),
    };
    Ok(bits_to_constant(bits, target))
}

/// Drives one IR program through `step()`, evaluating against a
/// sanitizing (or passthrough) heap. Shared, unmodified, by both a
/// direct `run_to_completion` caller and the debugger's worker thread.
pub struct Interpreter<'p> {
    program: &'p Program,
    pub stack: Stack,
    pub heap: Heap,
    exit_code: Option<i64>,
}

impl<'p> Interpreter<'p> {
    /// Starts a fresh interpretation at the program's entry function.
    pub fn new(program: &'p Program, sanitize: bool) -> InterpretResult<Self> {
        let mut stack = Stack::new();
        let entry_func = program.entry_func().ok_or(InterpretError::CallToUnknownFunction)?;
        let func = program.get_func(entry_func).ok_or(InterpretError::UnknownFunc(entry_func))?;
        let entry_block = func.entry_block().ok_or(InterpretError::CallToUnknownFunction)?;
        stack.push(Frame::at_func_entry(entry_func, entry_block));
        Ok(Self { program, stack, heap: Heap::new(sanitize), exit_code: None })
    }

    /// Resumes interpretation of an execution already in progress (the
    /// debugger's worker thread calls this on every `Run`/`StepIn`/
    /// `StepOver`/`StepOut`, handing back the stack and heap it took
    /// custody of when the previous run paused).
    pub fn resume(program: &'p Program, stack: Stack, heap: Heap) -> Self {
        Self { program, stack, heap, exit_code: None }
    }

    /// Surrenders the stack and heap back to the caller, e.g. so the
    /// debugger can park them until the next execution command.
    pub fn into_parts(self) -> (Stack, Heap) {
        (self.stack, self.heap)
    }

    pub fn is_terminated(&self) -> bool {
        self.exit_code.is_some()
    }

    pub fn exit_code(&self) -> Option<i64> {
        self.exit_code
    }

    fn current_instr(&self) -> &Instr {
        let frame = self.stack.top().expect("step called on an empty stack");
        let func = self.program.get_func(frame.func).expect("frame references a live function");
        let block = func.get_block(frame.current_block).expect("frame references a live block");
        &block.instrs()[frame.next_instr_index]
    }

    fn evaluate(&self, frame: &Frame, value: &Value) -> InterpretResult<Constant> {
        match value {
            Value::Constant(c) => Ok(*c),
            Value::Computed { number, .. } => {
                frame.lookup(*number).ok_or(InterpretError::UnboundValue(*number))
            }
            Value::Inherited { .. } => {
                // Only legal as a direct Phi argument; Phi resolves these
                // itself rather than calling evaluate on the wrapper.
                Err(InterpretError::PhiWithoutPreviousBlock)
            }
        }
    }

    fn evaluate_phi(&self, frame: &Frame, args: &[Value]) -> InterpretResult<Constant> {
        let previous = frame.previous_block.ok_or(InterpretError::PhiWithoutPreviousBlock)?;
        for arg in args {
            if let Value::Inherited { value, predecessor } = arg {
                if *predecessor == previous {
                    return self.evaluate(frame, value);
                }
            }
        }
        Err(InterpretError::NoPhiArgumentForPredecessor(previous))
    }

    /// Executes exactly one instruction and returns whether the program
    /// kept going or just terminated.
    pub fn step(&mut self) -> InterpretResult<StepOutcome> {
        if self.is_terminated() {
            return Err(InterpretError::AlreadyTerminated);
        }
        let instr = self.current_instr().clone();
        let result_ty = instr.result_types.first().copied();

        match &instr.kind {
            InstrKind::Mov { result, origin } => {
                let frame = self.stack.top().unwrap();
                let value = self.evaluate(frame, origin)?;
                self.bind_and_advance(*result, value);
            }
            InstrKind::Phi { result, args } => {
                let frame = self.stack.top().unwrap();
                let value = self.evaluate_phi(frame, args)?;
                self.bind_and_advance(*result, value);
            }
            InstrKind::Conversion { result, operand } => {
                let frame = self.stack.top().unwrap();
                let value = self.evaluate(frame, operand)?;
                let converted = convert_constant(value, result_ty.unwrap())?;
                self.bind_and_advance(*result, converted);
            }
            InstrKind::BoolNot { result, operand } => {
                let frame = self.stack.top().unwrap();
                let Constant::Bool(b) = self.evaluate(frame, operand)? else {
                    return Err(InterpretError::InvalidConversion(Constant::Bool(false), Type::Bool));
                };
                self.bind_and_advance(*result, Constant::Bool(!b));
            }
            InstrKind::BoolBinary { op, result, lhs, rhs } => {
                let frame = self.stack.top().unwrap();
                let (a, b) = (self.evaluate(frame, lhs)?, self.evaluate(frame, rhs)?);
                let (Constant::Bool(a), Constant::Bool(b)) = (a, b) else {
                    return Err(InterpretError::InvalidConversion(a, Type::Bool));
                };
                self.bind_and_advance(*result, Constant::Bool(op.apply(a, b)));
            }
            InstrKind::IntUnary { op, result, operand } => {
                let frame = self.stack.top().unwrap();
                let value = self.evaluate_int(frame, operand)?;
                self.bind_and_advance(*result, Constant::Int(value.unary(*op)));
            }
            InstrKind::IntCompare { op, result, lhs, rhs } => {
                let frame = self.stack.top().unwrap();
                let (a, b) = (self.evaluate_int(frame, lhs)?, self.evaluate_int(frame, rhs)?);
                let outcome = a.compare(*op, b)?;
                self.bind_and_advance(*result, Constant::Bool(outcome));
            }
            InstrKind::IntBinary { op, result, lhs, rhs } => {
                let frame = self.stack.top().unwrap();
                let (a, b) = (self.evaluate_int(frame, lhs)?, self.evaluate_int(frame, rhs)?);
                let outcome = a.binary(*op, b)?;
                self.bind_and_advance(*result, Constant::Int(outcome));
            }
            InstrKind::IntShift { op, result, operand, amount } => {
                let frame = self.stack.top().unwrap();
                let (value, amount) =
                    (self.evaluate_int(frame, operand)?, self.evaluate_int(frame, amount)?);
                let outcome = value.shift(*op, amount)?;
                self.bind_and_advance(*result, Constant::Int(outcome));
            }
            InstrKind::PointerOffset { result, pointer, offset } => {
                let frame = self.stack.top().unwrap();
                let Constant::Pointer(Some(address)) = self.evaluate(frame, pointer)? else {
                    return Err(InterpretError::NilDereference);
                };
                let new_address = (address as i64).wrapping_add(*offset) as u64;
                self.bind_and_advance(*result, Constant::Pointer(Some(new_address)));
            }
            InstrKind::NilTest { result, tested } => {
                let frame = self.stack.top().unwrap();
                let is_nil = match self.evaluate(frame, tested)? {
                    Constant::Pointer(p) => p.is_none(),
                    Constant::Func(f) => f.is_none(),
                    other => return Err(InterpretError::InvalidConversion(other, Type::Pointer)),
                };
                self.bind_and_advance(*result, Constant::Bool(is_nil));
            }
            InstrKind::Malloc { result, size } => {
                let frame = self.stack.top().unwrap();
                let size = self.evaluate_int(frame, size)?.to_i64();
                let address = self.heap.malloc(size)?;
                self.bind_and_advance(*result, Constant::Pointer(Some(address as u64)));
            }
            InstrKind::Free { pointer } => {
                let frame = self.stack.top().unwrap();
                let Constant::Pointer(Some(address)) = self.evaluate(frame, pointer)? else {
                    return Err(InterpretError::NilDereference);
                };
                self.heap.free(address as i64)?;
                self.advance();
            }
            InstrKind::Load { result, address } => {
                let frame = self.stack.top().unwrap();
                let Constant::Pointer(Some(address)) = self.evaluate(frame, address)? else {
                    return Err(InterpretError::NilDereference);
                };
                let ty = result_ty.unwrap();
                let bits = self.heap.load(address as i64, byte_size(ty))?;
                self.bind_and_advance(*result, bits_to_constant(bits, ty));
            }
            InstrKind::Store { address, value } => {
                let frame = self.stack.top().unwrap();
                let Constant::Pointer(Some(address)) = self.evaluate(frame, address)? else {
                    return Err(InterpretError::NilDereference);
                };
                let value = self.evaluate(frame, value)?;
                self.heap.store(address as i64, byte_size(value.ty()), constant_to_bits(value))?;
                self.advance();
            }
            InstrKind::Jump { target } => {
                self.stack.top_mut().unwrap().jump_to(*target);
            }
            InstrKind::JumpCond { condition, true_target, false_target } => {
                let frame = self.stack.top().unwrap();
                let Constant::Bool(cond) = self.evaluate(frame, condition)? else {
                    return Err(InterpretError::InvalidConversion(Constant::Bool(false), Type::Bool));
                };
                let target = if cond { *true_target } else { *false_target };
                self.stack.top_mut().unwrap().jump_to(target);
            }
            InstrKind::Call { callee, args, .. } => {
                let frame = self.stack.top().unwrap();
                let Constant::Func(Some(target)) = self.evaluate(frame, callee)? else {
                    return Err(InterpretError::CallToUnknownFunction);
                };
                let arg_values: Vec<Constant> =
                    args.iter().map(|a| self.evaluate(frame, a)).collect::<InterpretResult<_>>()?;
                let func =
                    self.program.get_func(target).ok_or(InterpretError::UnknownFunc(target))?;
                let entry = func.entry_block().ok_or(InterpretError::UnknownFunc(target))?;
                let mut callee_frame = Frame::at_func_entry(target, entry);
                for (param, arg) in func.params().iter().zip(arg_values) {
                    callee_frame.bind(*param, arg);
                }
                // Caller's next_instr_index is left pointing at this Call
                // so that Return can find its result value numbers.
                self.stack.push(callee_frame);
            }
            InstrKind::Return { args } => {
                let frame = self.stack.top().unwrap();
                let values: Vec<Constant> =
                    args.iter().map(|a| self.evaluate(frame, a)).collect::<InterpretResult<_>>()?;
                self.stack.pop();
                if self.stack.is_empty() {
                    self.heap.check_all_freed()?;
                    let exit_code = values.first().map(constant_to_bits).unwrap_or(0) as i64;
                    self.exit_code = Some(exit_code);
                    return Ok(StepOutcome::Terminated { exit_code });
                }
                let caller_instr = self.current_instr().clone();
                let InstrKind::Call { results, .. } = &caller_instr.kind else {
                    unreachable!("caller's saved instruction pointer always points at its Call")
                };
                let caller = self.stack.top_mut().unwrap();
                for (result, value) in results.iter().zip(values) {
                    caller.bind(*result, value);
                }
                caller.advance_to_next_instr();
            }
            InstrKind::Ext(_) => {
                // Opaque to the core interpreter (spec.md §6: the
                // language-specific checker and runtime give these
                // meaning; the core only needs to carry them through).
                self.advance();
            }
        }
        Ok(StepOutcome::Continue)
    }

    fn evaluate_int(&self, frame: &Frame, value: &Value) -> InterpretResult<Int> {
        match self.evaluate(frame, value)? {
            Constant::Int(i) => Ok(i),
            other => Err(InterpretError::InvalidConversion(other, value.ty())),
        }
    }

    fn bind_and_advance(&mut self, result: ValueNum, value: Constant) {
        let frame = self.stack.top_mut().unwrap();
        frame.bind(result, value);
        frame.advance_to_next_instr();
    }

    fn advance(&mut self) {
        self.stack.top_mut().unwrap().advance_to_next_instr();
    }

    /// Steps until the program terminates, returning its exit code.
    pub fn run_to_completion(&mut self) -> InterpretResult<i64> {
        loop {
            if let StepOutcome::Terminated { exit_code } = self.step()? {
                return Ok(exit_code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use katara_ir::text::parse_program;

    #[test]
    fn sum_loop_returns_45() {
        let src = "\
@func entry 0 () => (i64) {\n\
  0 entry: {\n\
    jmp 1\n\
  }\n\
  1: {\n\
    %0:i64 = phi (0:i64 @ 0, %3:i64 @ 1)\n\
    %1:i64 = phi (0:i64 @ 0, %4:i64 @ 1)\n\
    %2:bool = ilss %0:i64, 10:i64\n\
    jcc %2:bool, 2, 3\n\
  }\n\
  2: {\n\
    %3:i64 = iadd %0:i64, 1:i64\n\
    %4:i64 = iadd %1:i64, %0:i64\n\
    jmp 1\n\
  }\n\
  3: {\n\
    ret %1:i64\n\
  }\n\
}\n";
        let program = parse_program(src).unwrap();
        let mut interp = Interpreter::new(&program, true).unwrap();
        let exit_code = interp.run_to_completion().unwrap();
        assert_eq!(exit_code, 45);
    }

    #[test]
    fn heap_round_trip_and_double_free() {
        let src = "\
@func entry 0 () => (i64) {\n\
  0 entry: {\n\
    %0:ptr = malloc 8:i64\n\
    store %0:ptr, 42:i64\n\
    %1:i64 = load %0:ptr\n\
    free %0:ptr\n\
    ret %1:i64\n\
  }\n\
}\n";
        let program = parse_program(src).unwrap();
        let mut interp = Interpreter::new(&program, true).unwrap();
        let exit_code = interp.run_to_completion().unwrap();
        assert_eq!(exit_code, 42);
    }

    #[test]
    fn pointer_round_trip_through_a_callee() {
        let src = "\
@func entry 0 () => (i64) {\n\
  0 entry: {\n\
    %0:ptr = malloc 8:i64\n\
    store %0:ptr, 42:i64\n\
    %1:i64 = call 1:func(%0:ptr)\n\
    free %0:ptr\n\
    ret %1:i64\n\
  }\n\
}\n\
@func 1 (ptr) => (i64) {\n\
  0 entry: {\n\
    %1:i64 = load %0:ptr\n\
    %2:i64 = imul %1:i64, 3:i64\n\
    %3:i64 = iadd %2:i64, 1:i64\n\
    store %0:ptr, %3:i64\n\
    ret %3:i64\n\
  }\n\
}\n";
        let program = parse_program(src).unwrap();
        let mut interp = Interpreter::new(&program, true).unwrap();
        let exit_code = interp.run_to_completion().unwrap();
        assert_eq!(exit_code, 127);
    }

    #[test]
    fn uninitialized_read_fails_deterministically() {
        let src = "\
@func entry 0 () => (i64) {\n\
  0 entry: {\n\
    %0:ptr = malloc 8:i64\n\
    store %0:ptr, 1:i8\n\
    %1:i64 = load %0:ptr\n\
    ret %1:i64\n\
  }\n\
}\n";
        let program = parse_program(src).unwrap();
        let mut interp = Interpreter::new(&program, true).unwrap();
        let err = interp.run_to_completion().unwrap_err();
        assert_eq!(err.to_string(), "attempted to read uninitialized memory");
    }
}
