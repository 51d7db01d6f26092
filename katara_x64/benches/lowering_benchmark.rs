use criterion::{black_box, criterion_group, criterion_main, Criterion};
use katara_ir::text::parse_program;
use katara_x64::lower_program;
use std::collections::HashMap;

const SUM_LOOP: &str = "\
@func entry 0 () => (i64) {
  0 entry: {
    jmp 1
  }
  1: {
    %0:i64 = phi (0:i64 @ 0, %3:i64 @ 1)
    %1:i64 = phi (0:i64 @ 0, %4:i64 @ 1)
    %2:bool = ilss %0:i64, 10:i64
    jcc %2:bool, 2, 3
  }
  2: {
    %3:i64 = iadd %0:i64, 1:i64
    %4:i64 = iadd %1:i64, %0:i64
    jmp 1
  }
  3: {
    ret %1:i64
  }
}
";

fn benchmark_lowering(c: &mut Criterion) {
    let ir = parse_program(SUM_LOOP).unwrap();
    c.bench_function("lower_sum_loop", |b| b.iter(|| black_box(lower_program(black_box(&ir))).unwrap()));
}

fn benchmark_lower_and_link(c: &mut Criterion) {
    let ir = parse_program(SUM_LOOP).unwrap();
    c.bench_function("lower_and_link_sum_loop", |b| {
        b.iter(|| {
            let x64 = lower_program(black_box(&ir)).unwrap();
            black_box(x64.link(&HashMap::new())).unwrap()
        })
    });
}

criterion_group!(benches, benchmark_lowering, benchmark_lower_and_link);
criterion_main!(benches);
