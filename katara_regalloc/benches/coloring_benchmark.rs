use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hashbrown::HashMap;
use katara_analysis::InterferenceGraph;
use katara_ir::ValueNum;
use katara_regalloc::{allocate, AllocatorConfig};

/// A ring of `n` values, each interfering with its two neighbors, which
/// forces the simplify/spill loop to walk the whole pending set on every
/// iteration once fewer than three nodes remain below the register count.
fn ring_graph(n: u32) -> InterferenceGraph {
    let mut graph = InterferenceGraph::default();
    for i in 0..n {
        graph.add_edge(ValueNum(i), ValueNum((i + 1) % n));
    }
    graph
}

fn benchmark_coloring(c: &mut Criterion) {
    let graph = ring_graph(500);
    let config = AllocatorConfig { num_registers: 14 };
    c.bench_function("color_500_value_ring", |b| {
        b.iter(|| black_box(allocate(black_box(&graph), &HashMap::new(), &config)))
    });
}

criterion_group!(benches, benchmark_coloring);
criterion_main!(benches);
