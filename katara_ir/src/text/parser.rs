//! Recursive-descent parser for the grammar `text::printer` emits. Every
//! value occurrence is self-typed (`%N:ty`, `123:i64`, `nil:ptr`, …), so
//! the parser never needs a forward-reference pass over a function body:
//! it can resolve a `Value`'s type from the token stream alone (spec.md
//! §4.3: "Parsers for program/function/block/instruction/value/type...
//! record, per entity, structured source ranges").

use crate::extension::{ExtensionInstrParser, NoExtensions};
use crate::representation::block::Block;
use crate::representation::function::Function;
use crate::representation::ids::{BlockNum, FuncNum, ValueNum};
use crate::representation::instr::{ExtInstr, Instr, InstrKind};
use crate::representation::types::{Signature, Type};
use crate::representation::value::{Constant, Value};
use crate::text::scanner::{ScanError, ScanErrorKind, Scanner, Token};
use crate::Program;
use katara_atomics::{BoolBinaryOp, Int, IntBinaryOp, IntCompareOp, IntShiftOp, IntType, IntUnaryOp};
use katara_common::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ScanErrorKind,
    pub span: Span,
    pub message: String,
}

impl From<ScanError> for ParseError {
    fn from(err: ScanError) -> Self {
        ParseError { kind: err.kind, span: err.span, message: err.message }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.span)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse_program(source: &str) -> ParseResult<Program> {
    Parser::new(source, &NoExtensions)?.parse_program()
}

pub fn parse_program_with_extension(source: &str, ext: &dyn ExtensionInstrParser) -> ParseResult<Program> {
    Parser::new(source, ext)?.parse_program()
}

pub struct Parser<'a> {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    ext: &'a dyn ExtensionInstrParser,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, ext: &'a dyn ExtensionInstrParser) -> ParseResult<Self> {
        let tokens = Scanner::new(source).scan_all()?;
        Ok(Self { tokens, pos: 0, ext })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].1
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn skip_newlines(&mut self) {
        while *self.peek() == Token::NewLine {
            self.bump();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError { kind: ScanErrorKind::UnexpectedToken, span: self.span(), message: message.into() }
    }

    fn expect(&mut self, expected: &Token) -> ParseResult<()> {
        if self.peek() == expected {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", expected, self.peek())))
        }
    }

    fn expect_identifier(&mut self, text: &str) -> ParseResult<()> {
        match self.peek().clone() {
            Token::Identifier(s) if s == text => {
                self.bump();
                Ok(())
            }
            other => Err(self.error(format!("expected '{}', found {}", text, other))),
        }
    }

    fn eat_identifier(&mut self, text: &str) -> bool {
        if matches!(self.peek(), Token::Identifier(s) if s == text) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_number(&mut self) -> ParseResult<u32> {
        match self.bump() {
            Token::Number(text) => text.parse::<u32>().map_err(|_| self.error("number out of range")),
            other => Err(self.error(format!("expected a number, found {}", other))),
        }
    }

    fn expect_any_identifier(&mut self) -> ParseResult<String> {
        match self.bump() {
            Token::Identifier(s) => Ok(s),
            other => Err(self.error(format!("expected an identifier, found {}", other))),
        }
    }

    // ---- program ----

    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut program = Program::new();
        self.skip_newlines();
        while *self.peek() != Token::Eof {
            self.parse_function(&mut program)?;
            self.skip_newlines();
        }
        Ok(program)
    }

    fn parse_function(&mut self, program: &mut Program) -> ParseResult<()> {
        let start = self.span();
        self.expect(&Token::At)?;
        self.expect_identifier("func")?;
        let is_entry = self.eat_identifier("entry");
        let num = self.expect_number()?;
        let name = match self.peek().clone() {
            Token::Identifier(s) if s != "entry" => {
                self.bump();
                Some(s)
            }
            _ => None,
        };

        let mut func = Function::new(FuncNum(num), start);

        self.expect(&Token::LParen)?;
        let param_types = self.parse_type_list(program)?;
        self.expect(&Token::RParen)?;
        self.expect(&Token::Arrow)?;
        self.expect(&Token::LParen)?;
        let result_types = self.parse_type_list(program)?;
        self.expect(&Token::RParen)?;
        self.expect(&Token::LBrace)?;
        self.skip_newlines();

        func.name = name;
        func.result_types = result_types;
        for ty in &param_types {
            func.add_param(*ty);
        }

        while *self.peek() != Token::RBrace {
            self.parse_block(&mut func, program)?;
            self.skip_newlines();
        }
        self.expect(&Token::RBrace)?;
        func.span = start.merge(self.span());

        program.put_func(func).map_err(|e| self.error(e.to_string()))?;
        if is_entry {
            program.set_entry_func(FuncNum(num));
        }
        Ok(())
    }

    fn parse_type_list(&mut self, program: &mut Program) -> ParseResult<Vec<Type>> {
        let mut types = Vec::new();
        if *self.peek() == Token::RParen {
            return Ok(types);
        }
        loop {
            types.push(self.parse_type(program)?);
            if *self.peek() == Token::Comma {
                self.bump();
            } else {
                break;
            }
        }
        Ok(types)
    }

    fn parse_type(&mut self, program: &mut Program) -> ParseResult<Type> {
        let name = self.expect_any_identifier()?;
        match name.as_str() {
            "bool" => Ok(Type::Bool),
            "ptr" => Ok(Type::Pointer),
            "func" => {
                self.expect(&Token::LParen)?;
                let params = self.parse_type_list(program)?;
                self.expect(&Token::RParen)?;
                self.expect(&Token::Arrow)?;
                self.expect(&Token::LParen)?;
                let results = self.parse_type_list(program)?;
                self.expect(&Token::RParen)?;
                let id = program.types.intern(Signature::new(params, results));
                Ok(Type::Func(id))
            }
            other => IntType::parse(other)
                .map(Type::Int)
                .ok_or_else(|| self.error(format!("'{}' is not a known type", other))),
        }
    }

    fn parse_block(&mut self, func: &mut Function, program: &mut Program) -> ParseResult<()> {
        let start = self.span();
        let num = self.expect_number()?;
        let is_entry = self.eat_identifier("entry");
        self.expect(&Token::Colon)?;
        self.expect(&Token::LBrace)?;
        self.skip_newlines();
        func.insert_block_with_number(BlockNum(num), start);
        if is_entry {
            func.set_entry_block(BlockNum(num));
        }
        while *self.peek() != Token::RBrace {
            let instr = self.parse_instr(func, program)?;
            func.push_instr(BlockNum(num), instr);
            self.skip_newlines();
        }
        self.expect(&Token::RBrace)?;
        func.rebuild_control_flow_from_terminators();
        Ok(())
    }

    // ---- instructions ----

    fn parse_instr(&mut self, func: &mut Function, program: &mut Program) -> ParseResult<Instr> {
        let start = self.span();
        let mut results: Vec<(ValueNum, Type)> = Vec::new();
        if *self.peek() == Token::Percent {
            loop {
                self.expect(&Token::Percent)?;
                let num = self.expect_number()?;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type(program)?;
                func.observe_value_num(ValueNum(num));
                results.push((ValueNum(num), ty));
                if *self.peek() == Token::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect(&Token::Equal)?;
        }

        let mnemonic = self.expect_any_identifier()?;
        let kind = self.parse_instr_kind(&mnemonic, &results, func, program)?;
        let end = self.span();
        let result_types = results.iter().map(|(_, ty)| *ty).collect();
        Ok(Instr::new(kind, start.merge(end), result_types))
    }

    fn single_result(&self, results: &[(ValueNum, Type)]) -> ValueNum {
        results.first().map(|(n, _)| *n).unwrap_or(ValueNum(0))
    }

    fn parse_instr_kind(
        &mut self,
        mnemonic: &str,
        results: &[(ValueNum, Type)],
        func: &mut Function,
        program: &mut Program,
    ) -> ParseResult<InstrKind> {
        let result = self.single_result(results);
        Ok(match mnemonic {
            "mov" => InstrKind::Mov { result, origin: self.parse_value(func, program)? },
            "phi" => {
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if *self.peek() != Token::RParen {
                    loop {
                        args.push(self.parse_value(func, program)?);
                        if *self.peek() == Token::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RParen)?;
                InstrKind::Phi { result, args }
            }
            "conv" => InstrKind::Conversion { result, operand: self.parse_value(func, program)? },
            "bnot" => InstrKind::BoolNot { result, operand: self.parse_value(func, program)? },
            "beq" | "bneq" | "band" | "bor" => {
                let op = BoolBinaryOp::parse(mnemonic).unwrap();
                let lhs = self.parse_value(func, program)?;
                self.expect(&Token::Comma)?;
                let rhs = self.parse_value(func, program)?;
                InstrKind::BoolBinary { op, result, lhs, rhs }
            }
            "ineg" | "inot" => {
                let op = IntUnaryOp::parse(mnemonic).unwrap();
                InstrKind::IntUnary { op, result, operand: self.parse_value(func, program)? }
            }
            "ieq" | "ineq" | "ilss" | "ileq" | "igeq" | "igtr" => {
                let op = IntCompareOp::parse(mnemonic).unwrap();
                let lhs = self.parse_value(func, program)?;
                self.expect(&Token::Comma)?;
                let rhs = self.parse_value(func, program)?;
                InstrKind::IntCompare { op, result, lhs, rhs }
            }
            "iadd" | "isub" | "imul" | "idiv" | "irem" | "iand" | "ior" | "ixor" | "iandnot" => {
                let op = IntBinaryOp::parse(mnemonic).unwrap();
                let lhs = self.parse_value(func, program)?;
                self.expect(&Token::Comma)?;
                let rhs = self.parse_value(func, program)?;
                InstrKind::IntBinary { op, result, lhs, rhs }
            }
            "ishl" | "ishr" => {
                let op = IntShiftOp::parse(mnemonic).unwrap();
                let operand = self.parse_value(func, program)?;
                self.expect(&Token::Comma)?;
                let amount = self.parse_value(func, program)?;
                InstrKind::IntShift { op, result, operand, amount }
            }
            "pcopy" => {
                let pointer = self.parse_value(func, program)?;
                self.expect(&Token::Comma)?;
                let offset = self.parse_signed_integer()?;
                InstrKind::PointerOffset { result, pointer, offset }
            }
            "niltest" => InstrKind::NilTest { result, tested: self.parse_value(func, program)? },
            "malloc" => InstrKind::Malloc { result, size: self.parse_value(func, program)? },
            "free" => InstrKind::Free { pointer: self.parse_value(func, program)? },
            "load" => InstrKind::Load { result, address: self.parse_value(func, program)? },
            "store" => {
                let address = self.parse_value(func, program)?;
                self.expect(&Token::Comma)?;
                let value = self.parse_value(func, program)?;
                InstrKind::Store { address, value }
            }
            "jmp" => InstrKind::Jump { target: BlockNum(self.expect_number()?) },
            "jcc" => {
                let condition = self.parse_value(func, program)?;
                self.expect(&Token::Comma)?;
                let true_target = BlockNum(self.expect_number()?);
                self.expect(&Token::Comma)?;
                let false_target = BlockNum(self.expect_number()?);
                InstrKind::JumpCond { condition, true_target, false_target }
            }
            "call" => {
                let callee = self.parse_value(func, program)?;
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if *self.peek() != Token::RParen {
                    loop {
                        args.push(self.parse_value(func, program)?);
                        if *self.peek() == Token::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RParen)?;
                InstrKind::Call { callee, results: results.iter().map(|(n, _)| *n).collect(), args }
            }
            "ret" => {
                let mut args = Vec::new();
                if !matches!(self.peek(), Token::NewLine | Token::Eof) {
                    loop {
                        args.push(self.parse_value(func, program)?);
                        if *self.peek() == Token::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                InstrKind::Return { args }
            }
            other if self.ext.recognizes(other) => {
                let mut args = Vec::new();
                if !matches!(self.peek(), Token::NewLine | Token::Eof) {
                    loop {
                        args.push(self.parse_value(func, program)?);
                        if *self.peek() == Token::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                InstrKind::Ext(ExtInstr {
                    mnemonic: other.to_string(),
                    results: results.iter().map(|(n, _)| *n).collect(),
                    args,
                })
            }
            other => return Err(self.error(format!("'{}' is not a recognized instruction mnemonic", other))),
        })
    }

    fn parse_signed_integer(&mut self) -> ParseResult<i64> {
        match self.bump() {
            Token::Number(text) => text.parse::<i64>().map_err(|_| self.error("not a valid offset")),
            other => Err(self.error(format!("expected an integer, found {}", other))),
        }
    }

    fn parse_value(&mut self, func: &mut Function, program: &mut Program) -> ParseResult<Value> {
        let base = self.parse_base_value(func, program)?;
        if *self.peek() == Token::At {
            self.bump();
            let block = BlockNum(self.expect_number()?);
            Ok(Value::inherited(base, block))
        } else {
            Ok(base)
        }
    }

    fn parse_base_value(&mut self, func: &mut Function, program: &mut Program) -> ParseResult<Value> {
        match self.peek().clone() {
            Token::Percent => {
                self.bump();
                let num = self.expect_number()?;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type(program)?;
                Ok(Value::computed(ValueNum(num), ty))
            }
            Token::Identifier(s) if s == "true" || s == "false" => {
                self.bump();
                Ok(Value::Constant(Constant::Bool(s == "true")))
            }
            Token::Identifier(s) if s == "nil" => {
                self.bump();
                self.expect(&Token::Colon)?;
                let tag = self.expect_any_identifier()?;
                match tag.as_str() {
                    "ptr" => Ok(Value::Constant(Constant::Pointer(None))),
                    "func" => Ok(Value::Constant(Constant::Func(None))),
                    other => Err(self.error(format!("'nil:{}' is not a known nil constant", other))),
                }
            }
            Token::Address(text) => {
                self.bump();
                self.expect(&Token::Colon)?;
                self.expect_identifier("ptr")?;
                let digits = text.trim_start_matches("0x").trim_start_matches("0X");
                let addr = u64::from_str_radix(digits, 16).map_err(|_| self.error("invalid address literal"))?;
                Ok(Value::Constant(Constant::Pointer(Some(addr))))
            }
            Token::Number(num_text) => {
                self.bump();
                self.expect(&Token::Colon)?;
                let tag = self.expect_any_identifier()?;
                if tag == "func" {
                    let func_num: u32 = num_text.parse().map_err(|_| self.error("invalid function number"))?;
                    return Ok(Value::Constant(Constant::Func(Some(FuncNum(func_num)))));
                }
                let int_ty = IntType::parse(&tag).ok_or_else(|| self.error(format!("'{}' is not a known type", tag)))?;
                let int = Int::parse(&num_text, int_ty, 10).map_err(|e| self.error(e.to_string()))?;
                Ok(Value::Constant(Constant::Int(int)))
            }
            other => Err(self.error(format!("expected a value, found {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::printer::print_program;

    #[test]
    fn round_trips_a_straight_line_function() {
        let mut program = Program::new();
        let func_num = program.add_func(Span::synthetic());
        let func = program.get_func_mut(func_num).unwrap();
        let a = func.add_param(Type::Int(IntType::I64));
        let b = func.fresh_value_num();
        let entry = func.add_block(Span::synthetic());
        func.set_entry_block(entry);
        func.result_types = vec![Type::Int(IntType::I64)];
        func.push_instr(
            entry,
            Instr::new(
                InstrKind::IntBinary {
                    op: IntBinaryOp::Add,
                    result: b,
                    lhs: Value::computed(a, Type::Int(IntType::I64)),
                    rhs: Value::Constant(Constant::Int(Int::new(IntType::I64, 1))),
                },
                Span::synthetic(),
                vec![Type::Int(IntType::I64)],
            ),
        );
        func.push_instr(
            entry,
            Instr::new(
                InstrKind::Return { args: vec![Value::computed(b, Type::Int(IntType::I64))] },
                Span::synthetic(),
                vec![],
            ),
        );
        program.set_entry_func(func_num);

        let text = print_program(&program);
        let parsed = parse_program(&text).expect("round trip should parse");
        let text2 = print_program(&parsed);
        assert_eq!(text, text2);
    }

    #[test]
    fn round_trips_a_loop_with_backward_phi() {
        let mut program = Program::new();
        let func_num = program.add_func(Span::synthetic());
        let func = program.get_func_mut(func_num).unwrap();
        let i64_ty = Type::Int(IntType::I64);
        let header = func.add_block(Span::synthetic());
        let body = func.add_block(Span::synthetic());
        let exit = func.add_block(Span::synthetic());
        func.set_entry_block(header);
        func.result_types = vec![i64_ty];

        let sum_phi = func.fresh_value_num();
        let sum_next = func.fresh_value_num();
        let cond = func.fresh_value_num();
        let zero = Value::Constant(Constant::Int(Int::new(IntType::I64, 0)));
        let one = Value::Constant(Constant::Int(Int::new(IntType::I64, 1)));

        func.push_instr(
            header,
            Instr::new(
                InstrKind::Phi {
                    result: sum_phi,
                    args: vec![
                        Value::inherited(zero.clone(), header),
                        Value::inherited(Value::computed(sum_next, i64_ty), body),
                    ],
                },
                Span::synthetic(),
                vec![i64_ty],
            ),
        );
        func.push_instr(
            header,
            Instr::new(
                InstrKind::IntCompare {
                    op: IntCompareOp::Lss,
                    result: cond,
                    lhs: Value::computed(sum_phi, i64_ty),
                    rhs: one.clone(),
                },
                Span::synthetic(),
                vec![Type::Bool],
            ),
        );
        func.push_instr(
            header,
            Instr::new(
                InstrKind::JumpCond { condition: Value::computed(cond, Type::Bool), true_target: body, false_target: exit },
                Span::synthetic(),
                vec![],
            ),
        );
        func.push_instr(
            body,
            Instr::new(
                InstrKind::IntBinary {
                    op: IntBinaryOp::Add,
                    result: sum_next,
                    lhs: Value::computed(sum_phi, i64_ty),
                    rhs: one,
                },
                Span::synthetic(),
                vec![i64_ty],
            ),
        );
        func.push_instr(body, Instr::new(InstrKind::Jump { target: header }, Span::synthetic(), vec![]));
        func.push_instr(
            exit,
            Instr::new(InstrKind::Return { args: vec![Value::computed(sum_phi, i64_ty)] }, Span::synthetic(), vec![]),
        );
        program.set_entry_func(func_num);

        let text = print_program(&program);
        let parsed = parse_program(&text).expect("loop should parse");
        assert_eq!(print_program(&parsed), text);
    }

    #[test]
    fn unknown_mnemonic_is_a_parse_error() {
        let err = parse_program("@func 0 () => () {\n0: {\n  bogus\n}\n}\n").unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::UnexpectedToken);
    }
}
