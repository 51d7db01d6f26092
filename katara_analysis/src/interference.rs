//! Interference-graph construction (spec.md §4.5 "interference graph"),
//! grounded on `examples/original_source/src/ir/info/interference_graph.h`
//! and the second back-walk in
//! `src/ir/processors/live_range_analyzer.cc`'s `BuildInterferenceGraph`.
//!
//! Resolves an open question (see DESIGN.md): the original's two entry
//! points into this construction are aliases of one algorithm, so this
//! crate exposes exactly one public function.

use crate::live_ranges::LiveRanges;
use hashbrown::HashMap;
use katara_ir::{Function, ValueNum};
use std::collections::BTreeSet;

/// An undirected graph over value numbers: two values interfere when
/// they are simultaneously live and therefore cannot share a register.
/// Self-edges are never recorded. Adjacency lists are ordered
/// (`BTreeSet`) for deterministic coloring; the outer map, which is only
/// ever looked up by key, is `hashbrown` for its lookup speed on the
/// dense per-function value-number universe.
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    values: BTreeSet<ValueNum>,
    edges: HashMap<ValueNum, BTreeSet<ValueNum>>,
}

impl InterferenceGraph {
    pub fn add_value(&mut self, value: ValueNum) {
        self.values.insert(value);
        self.edges.entry(value).or_default();
    }

    pub fn add_edge(&mut self, a: ValueNum, b: ValueNum) {
        if a == b {
            return;
        }
        self.add_value(a);
        self.add_value(b);
        self.edges.get_mut(&a).unwrap().insert(b);
        self.edges.get_mut(&b).unwrap().insert(a);
    }

    /// Adds edges between every pair in `clique`, i.e. marks all of them
    /// as pairwise interfering (used to seed a block's working live set
    /// as a clique at the start of the backward walk).
    pub fn add_edges_in(&mut self, clique: impl IntoIterator<Item = ValueNum>) {
        let members: Vec<ValueNum> = clique.into_iter().collect();
        for value in &members {
            self.add_value(*value);
        }
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                self.add_edge(members[i], members[j]);
            }
        }
    }

    /// Adds an edge from `value` to every member of `others`.
    pub fn add_edges_between(&mut self, value: ValueNum, others: impl IntoIterator<Item = ValueNum>) {
        self.add_value(value);
        for other in others {
            self.add_edge(value, other);
        }
    }

    pub fn values(&self) -> impl Iterator<Item = ValueNum> + '_ {
        self.values.iter().copied()
    }

    pub fn neighbors(&self, value: ValueNum) -> impl Iterator<Item = ValueNum> + '_ {
        self.edges.get(&value).into_iter().flat_map(|set| set.iter().copied())
    }

    pub fn degree(&self, value: ValueNum) -> usize {
        self.edges.get(&value).map_or(0, |s| s.len())
    }

    pub fn interferes(&self, a: ValueNum, b: ValueNum) -> bool {
        self.edges.get(&a).is_some_and(|set| set.contains(&b))
    }
}

/// Builds the interference graph for `func` from its (already computed)
/// per-block liveness. Per block: seed a working set from the exit set
/// as a clique, then walk backward; a defined value already in the
/// working set is removed, otherwise it interferes with everything still
/// in the working set (the "dead def" case); a used computed value
/// (skipping phi uses, accounted for at predecessor exits) is added with
/// edges to the current working set if not already present.
pub fn build_interference_graph(func: &Function, live_ranges: &LiveRanges) -> InterferenceGraph {
    let mut graph = InterferenceGraph::default();
    for block in func.blocks() {
        let Some(block_ranges) = live_ranges.block(block.number) else { continue };
        let mut working: BTreeSet<ValueNum> = block_ranges.exit_set().collect();
        graph.add_edges_in(working.iter().copied());

        let instrs = block.instrs();
        for idx in (0..instrs.len()).rev() {
            let instr = &instrs[idx];
            for defined in instr.defined_values() {
                if working.remove(&defined) {
                    // was live past this point; simply stops being live here.
                } else {
                    graph.add_edges_between(defined, working.iter().copied());
                }
                graph.add_value(defined);
            }
            if instr.is_phi() {
                continue;
            }
            for used in instr.used_values() {
                if let Some(number) = used.as_computed_number() {
                    if working.insert(number) {
                        graph.add_edges_between(number, working.iter().copied().filter(|v| *v != number));
                    }
                }
            }
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_ranges::find_live_ranges;
    use katara_ir::text::parse_program;

    #[test]
    fn values_simultaneously_live_interfere() {
        let src = "\
@func entry 0 () => (i64) {\n\
  0 entry: {\n\
    %0:i64 = mov 1:i64\n\
    %1:i64 = mov 2:i64\n\
    %2:i64 = iadd %0:i64, %1:i64\n\
    ret %2:i64\n\
  }\n\
}\n";
        let program = parse_program(src).unwrap();
        let func = program.funcs().next().unwrap();
        let live = find_live_ranges(func);
        let graph = build_interference_graph(func, &live);
        let values: Vec<ValueNum> = func
            .blocks()
            .flat_map(|b| b.instrs().iter().flat_map(|i| i.defined_values()))
            .collect();
        assert!(graph.interferes(values[0], values[1]));
        assert!(!graph.interferes(values[0], values[2]));
    }
}
