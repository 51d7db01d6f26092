//! A basic block: an ordered, non-empty sequence of instructions plus its
//! parent/child sets within the owning function's control-flow graph.

use crate::representation::ids::BlockNum;
use crate::representation::instr::Instr;
use katara_common::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub number: BlockNum,
    pub span: Span,
    instrs: Vec<Instr>,
    parents: BTreeSet<BlockNum>,
    children: BTreeSet<BlockNum>,
}

impl Block {
    pub fn new(number: BlockNum, span: Span) -> Self {
        Self { number, span, instrs: Vec::new(), parents: BTreeSet::new(), children: BTreeSet::new() }
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn push_instr(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// The terminator instruction, if the block has one (spec.md §4.4
    /// "empty block" and "missing terminator" are distinct verifier
    /// issues, so this returns `None` in both cases rather than
    /// panicking).
    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().filter(|instr| instr.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    /// Non-terminator instructions, i.e. all but a well-formed last one.
    pub fn non_terminators(&self) -> &[Instr] {
        if self.is_terminated() {
            &self.instrs[..self.instrs.len() - 1]
        } else {
            &self.instrs
        }
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instr> {
        self.instrs.iter().take_while(|instr| instr.is_phi())
    }

    pub fn parents(&self) -> &BTreeSet<BlockNum> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<BlockNum> {
        &self.children
    }

    pub(crate) fn add_parent(&mut self, parent: BlockNum) {
        self.parents.insert(parent);
    }

    pub(crate) fn add_child(&mut self, child: BlockNum) {
        self.children.insert(child);
    }
}
