//! Architecture-independent graph-coloring register allocator (spec.md
//! §4.6). No reference implementation of the coloring algorithm itself
//! survives in `examples/original_source/` (only the x86-64-specific
//! `register_allocator.h` header declares its API, with no matching
//! `.cc`); the Kempe/Chaitin-Briggs simplify-spill-select loop below is
//! written directly from spec.md §4.6, using `katara_analysis`'s
//! `InterferenceGraph` as input and the workspace's ordered-collection
//! determinism convention (spec.md §8: "the allocator is deterministic
//! across runs").

use hashbrown::HashMap;
use katara_analysis::InterferenceGraph;
use katara_ir::ValueNum;
use std::collections::BTreeSet;

/// A non-negative color. Colors `0..config.num_registers` name concrete
/// registers; colors at or above that are spill slots. The concrete
/// color → location mapping is an x86-64-specific concern (spec.md
/// §4.6: "target-specific mapping... lives in the lowering layer").
pub type Color = u32;

#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    pub num_registers: usize,
}

/// The coloring produced for one function: every value number that
/// appeared in the interference graph (including pre-colored ones) maps
/// to exactly one color.
#[derive(Debug, Clone, Default)]
pub struct Coloring {
    colors: HashMap<ValueNum, Color>,
}

impl Coloring {
    pub fn get(&self, value: ValueNum) -> Option<Color> {
        self.colors.get(&value).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueNum, Color)> + '_ {
        self.colors.iter().map(|(v, c)| (*v, *c))
    }
}

/// Allocates a color to every value in `graph`. `precolored` fixes
/// function-parameter values to their argument-passing color and
/// return-argument values to their result color (spec.md §4.6); those
/// nodes are never simplified or reassigned. Clobbered colors for an
/// instruction that clobbers fixed registers are expected to already be
/// represented as extra interference edges added to `graph` by the
/// caller, per spec.md §4.6's third bullet.
pub fn allocate(
    graph: &InterferenceGraph,
    precolored: &HashMap<ValueNum, Color>,
    config: &AllocatorConfig,
) -> Coloring {
    let mut colors: HashMap<ValueNum, Color> = precolored.clone();

    let mut removed: BTreeSet<ValueNum> = precolored.keys().copied().collect();
    let mut stack: Vec<ValueNum> = Vec::new();

    let mut pending: BTreeSet<ValueNum> =
        graph.values().filter(|v| !precolored.contains_key(v)).collect();

    while !pending.is_empty() {
        let degree_of = |v: ValueNum| -> usize {
            graph.neighbors(v).filter(|n| !removed.contains(n)).count()
        };
        let simplifiable = pending.iter().copied().find(|&v| degree_of(v) < config.num_registers);
        let chosen = match simplifiable {
            Some(v) => v,
            // No node is simplifiable below the register count: the
            // lowest-numbered remaining node becomes a spill candidate
            // (spec.md §4.6: "tie-break on value number").
            None => *pending.iter().next().unwrap(),
        };
        pending.remove(&chosen);
        removed.insert(chosen);
        stack.push(chosen);
    }

    while let Some(value) = stack.pop() {
        let used: BTreeSet<Color> = graph
            .neighbors(value)
            .filter_map(|n| colors.get(&n).copied())
            .collect();
        let mut candidate: Color = 0;
        while used.contains(&candidate) {
            candidate += 1;
        }
        colors.insert(value, candidate);
    }

    Coloring { colors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use katara_analysis::InterferenceGraph;

    fn v(n: u32) -> ValueNum {
        ValueNum(n)
    }

    #[test]
    fn disjoint_values_can_share_a_color() {
        let mut graph = InterferenceGraph::default();
        graph.add_value(v(0));
        graph.add_value(v(1));
        let coloring = allocate(&graph, &HashMap::new(), &AllocatorConfig { num_registers: 2 });
        assert_eq!(coloring.get(v(0)), Some(0));
        assert_eq!(coloring.get(v(1)), Some(0));
    }

    #[test]
    fn a_triangle_needs_three_distinct_colors() {
        let mut graph = InterferenceGraph::default();
        graph.add_edge(v(0), v(1));
        graph.add_edge(v(1), v(2));
        graph.add_edge(v(0), v(2));
        let coloring = allocate(&graph, &HashMap::new(), &AllocatorConfig { num_registers: 8 });
        let c0 = coloring.get(v(0)).unwrap();
        let c1 = coloring.get(v(1)).unwrap();
        let c2 = coloring.get(v(2)).unwrap();
        assert_ne!(c0, c1);
        assert_ne!(c1, c2);
        assert_ne!(c0, c2);
    }

    #[test]
    fn allocation_is_deterministic_across_runs() {
        let mut graph = InterferenceGraph::default();
        graph.add_edge(v(0), v(1));
        graph.add_edge(v(1), v(2));
        graph.add_edge(v(2), v(3));
        graph.add_edge(v(3), v(0));
        let config = AllocatorConfig { num_registers: 2 };
        let first = allocate(&graph, &HashMap::new(), &config);
        let second = allocate(&graph, &HashMap::new(), &config);
        let mut first_sorted: Vec<_> = first.iter().collect();
        let mut second_sorted: Vec<_> = second.iter().collect();
        first_sorted.sort();
        second_sorted.sort();
        assert_eq!(first_sorted, second_sorted);
    }

    #[test]
    fn precolored_values_keep_their_fixed_color() {
        let mut graph = InterferenceGraph::default();
        graph.add_edge(v(0), v(1));
        let mut precolored = HashMap::new();
        precolored.insert(v(0), 3);
        let coloring = allocate(&graph, &precolored, &AllocatorConfig { num_registers: 4 });
        assert_eq!(coloring.get(v(0)), Some(3));
        assert_ne!(coloring.get(v(1)), Some(3));
    }
}
