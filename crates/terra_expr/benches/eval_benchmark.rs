//! Benchmark for expression evaluation.
//!
//! TARGET: 10,000,000 evaluations per second for a typical density formula
//!
//! Run with: cargo bench --package terra_expr --bench eval_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use terra_expr::{Evaluator, Expression, Scope};

const DENSITY: &str = "(64 + 12 * hills - y) + (y < 40 ? 6 * caves : 0) - max(0, abs(x) - 30000)";

fn scope() -> Scope {
    Scope::with_variables(["x", "y", "z", "hills", "caves"]).unwrap()
}

fn benchmark_compile(c: &mut Criterion) {
    let scope = scope();
    c.bench_function("compile_density", |b| {
        b.iter(|| black_box(Expression::compile(black_box(DENSITY), &scope).unwrap()));
    });
}

fn benchmark_single_eval(c: &mut Criterion) {
    let expr = Expression::compile(DENSITY, &scope()).unwrap();
    let mut evaluator = Evaluator::new();

    c.bench_function("single_density_eval", |b| {
        let mut y = 0.0f64;
        b.iter(|| {
            y = (y + 1.0) % 128.0;
            black_box(expr.evaluate_with(&mut evaluator, black_box(&[3.0, y, 5.0, 0.4, -0.2])))
        });
    });
}

fn benchmark_chunk_column_sweep(c: &mut Criterion) {
    let expr = Expression::compile(DENSITY, &scope()).unwrap();
    let mut evaluator = Evaluator::new();

    // One 16x256x16 chunk worth of samples.
    let mut group = c.benchmark_group("chunk_sweep");
    group.throughput(Throughput::Elements(16 * 256 * 16));
    group.sample_size(20);

    group.bench_function("65536_density_evals", |b| {
        b.iter(|| {
            let mut solid = 0u32;
            for x in 0..16 {
                for z in 0..16 {
                    for y in 0..256 {
                        let slots = [f64::from(x), f64::from(y), f64::from(z), 0.3, 0.1];
                        if expr.evaluate_with(&mut evaluator, &slots).unwrap_or(-1.0) > 0.0 {
                            solid += 1;
                        }
                    }
                }
            }
            black_box(solid)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_compile,
    benchmark_single_eval,
    benchmark_chunk_column_sweep,
);
criterion_main!(benches);
