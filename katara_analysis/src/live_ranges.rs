//! Per-block liveness (spec.md §4.5 "per-block back-walk"), grounded on
//! `examples/original_source/src/ir/info/block_live_ranges.h`/`.cc` and
//! `src/ir/processors/live_range_analyzer.cc`.
//!
//! A value's range within a block is `(start, end)` where either bound
//! can be absent: no `start` means the value is already live when the
//! block is entered (it is in the block's **entry set**); no `end` means
//! the value is still live past the block's last instruction (it is in
//! the **exit set**, and its range gets extended there by the backward
//! fixed point below).

use katara_ir::{Function, ValueNum};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ValueRange {
    start: Option<usize>,
    end: Option<usize>,
}

/// The liveness information for a single block: every value that is live
/// anywhere within it, and the instruction-index range over which it is
/// live.
#[derive(Debug, Clone, Default)]
pub struct BlockLiveRanges {
    ranges: HashMap<ValueNum, ValueRange>,
}

impl BlockLiveRanges {
    pub fn has_value(&self, value: ValueNum) -> bool {
        self.ranges.contains_key(&value)
    }

    pub fn has_value_definition(&self, value: ValueNum) -> bool {
        matches!(self.ranges.get(&value), Some(r) if r.start.is_some())
    }

    /// Records that `value` is defined at `instr_idx` within this block,
    /// ending its range there unless a later use already extended it.
    pub fn add_value_definition(&mut self, value: ValueNum, instr_idx: usize) {
        let range = self.ranges.entry(value).or_insert(ValueRange { start: None, end: None });
        range.start = Some(instr_idx);
        if range.end.is_none() {
            range.end = Some(instr_idx);
        }
    }

    /// Records a use of `value` at `instr_idx`, extending its start
    /// (earliest-seen-from-the-back) and, if the value has no recorded
    /// end yet, its end as well — the back-walk visits uses before the
    /// value's own definition, so the first use seen is the range's end.
    pub fn add_value_use(&mut self, value: ValueNum, instr_idx: usize) {
        let range = self.ranges.entry(value).or_insert(ValueRange { start: None, end: None });
        if range.end.is_none() {
            range.end = Some(instr_idx);
        }
        range.start = Some(range.start.map_or(instr_idx, |s| s.min(instr_idx)));
    }

    /// Adds `value` to this block's entry set, i.e. marks it live when
    /// the block is entered without a local definition.
    fn mark_entering_at_head(&mut self, value: ValueNum) {
        let range = self.ranges.entry(value).or_insert(ValueRange { start: None, end: None });
        range.start = None;
    }

    /// Adds `value` to this block's exit set, extending its range to the
    /// end of the block (spec.md §4.5: "propagated to exit" extends the
    /// range to the end of the predecessor during the backward fixed
    /// point).
    pub fn propagate_into_exit_set(&mut self, value: ValueNum) -> bool {
        let range = self.ranges.entry(value).or_insert(ValueRange { start: None, end: None });
        if range.end.is_none() {
            false
        } else {
            range.end = None;
            true
        }
    }

    pub fn entry_set(&self) -> impl Iterator<Item = ValueNum> + '_ {
        self.ranges.iter().filter(|(_, r)| r.start.is_none()).map(|(v, _)| *v)
    }

    pub fn exit_set(&self) -> impl Iterator<Item = ValueNum> + '_ {
        self.ranges.iter().filter(|(_, r)| r.end.is_none()).map(|(v, _)| *v)
    }

    /// The values live at instruction index `idx` (i.e. whose range
    /// covers it): `start <= idx <= end`, with an absent bound treated as
    /// `-inf`/`+inf` respectively.
    pub fn live_set_at(&self, idx: usize) -> impl Iterator<Item = ValueNum> + '_ {
        self.ranges.iter().filter(move |(_, r)| {
            r.start.map_or(true, |s| s <= idx) && r.end.map_or(true, |e| idx <= e)
        }).map(|(v, _)| *v)
    }

    pub fn values(&self) -> impl Iterator<Item = ValueNum> + '_ {
        self.ranges.keys().copied()
    }
}

/// The complete per-block liveness for a function, keyed by block.
#[derive(Debug, Clone, Default)]
pub struct LiveRanges {
    blocks: HashMap<katara_ir::BlockNum, BlockLiveRanges>,
}

impl LiveRanges {
    pub fn block(&self, block: katara_ir::BlockNum) -> Option<&BlockLiveRanges> {
        self.blocks.get(&block)
    }
}

/// Computes liveness for every block in `func`: a per-block back-walk
/// followed by a backward fixed point that propagates each block's entry
/// set into every predecessor's exit set (spec.md §4.5).
pub fn find_live_ranges(func: &Function) -> LiveRanges {
    let mut result = LiveRanges::default();
    for block in func.blocks() {
        result.blocks.insert(block.number, backtrace_block(func, block));
    }
    propagate_backwards(func, &mut result);
    result
}

fn backtrace_block(func: &Function, block: &katara_ir::Block) -> BlockLiveRanges {
    let mut ranges = BlockLiveRanges::default();
    let instrs = block.instrs();
    for idx in (0..instrs.len()).rev() {
        let instr = &instrs[idx];
        for defined in instr.defined_values() {
            ranges.add_value_definition(defined, idx);
        }
        if instr.is_phi() {
            // Phi uses are `Inherited` values that live out of the named
            // predecessor, not in this block — they never extend a range
            // here (spec.md §4.5).
            continue;
        }
        for used in instr.used_values() {
            if let Some(number) = used.as_computed_number() {
                ranges.add_value_use(number, idx);
            }
        }
    }
    let _ = func;
    // Any value used but never (re-)defined inside the block enters
    // through the block's head.
    let defined_locally: HashSet<ValueNum> =
        instrs.iter().flat_map(|i| i.defined_values()).collect();
    let entering: Vec<ValueNum> =
        ranges.values().filter(|v| !defined_locally.contains(v)).collect();
    for value in entering {
        ranges.mark_entering_at_head(value);
    }
    ranges
}

/// Worklist fixed point: whenever a value enters through a block's head,
/// it must also be live at the exit of every predecessor. Terminates
/// because exit sets only grow and are bounded by the function's value
/// universe (spec.md §4.5).
fn propagate_backwards(func: &Function, ranges: &mut LiveRanges) {
    let mut queue: VecDeque<katara_ir::BlockNum> = func.blocks().map(|b| b.number).collect();
    let mut queued: HashSet<katara_ir::BlockNum> = queue.iter().copied().collect();
    while let Some(block_num) = queue.pop_front() {
        queued.remove(&block_num);
        let entry_values: Vec<ValueNum> = match ranges.block(block_num) {
            Some(b) => b.entry_set().collect(),
            None => continue,
        };
        let Some(block) = func.get_block(block_num) else { continue };
        for &pred in block.parents() {
            let Some(pred_ranges) = ranges.blocks.get_mut(&pred) else { continue };
            let mut grew = false;
            for &value in &entry_values {
                if pred_ranges.propagate_into_exit_set(value) {
                    grew = true;
                }
            }
            if grew && queued.insert(pred) {
                queue.push_back(pred);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use katara_ir::text::parse_program;

    #[test]
    fn value_used_across_a_jump_is_live_at_the_predecessors_exit() {
        let src = "\
@func entry 0 () => (i64) {\n\
  0 entry: {\n\
    %0:i64 = mov 1:i64\n\
    jmp 1\n\
  }\n\
  1: {\n\
    ret %0:i64\n\
  }\n\
}\n";
        let program = parse_program(src).unwrap();
        let func = program.funcs().next().unwrap();
        let live = find_live_ranges(func);
        let entry_block = func.entry_block().unwrap();
        let exit = func.get_block(entry_block).unwrap().children().iter().next().copied().unwrap();
        let _ = exit;
        let entry_ranges = live.block(entry_block).unwrap();
        let value = func
            .blocks()
            .flat_map(|b| b.instrs().iter().flat_map(|i| i.defined_values()))
            .next()
            .unwrap();
        assert!(entry_ranges.exit_set().any(|v| v == value));
    }
}
