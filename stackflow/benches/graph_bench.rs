//! Benchmarks for dependency graph construction and ordering.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stackflow::graph::DependencyGraph;
use stackflow::testing::fixtures::{layered_descriptors, todo_app_waves};

fn graph_build_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    for (width, depth) in [(10, 10), (50, 20), (200, 10)] {
        let descriptors = layered_descriptors(width, depth);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{depth}")),
            &descriptors,
            |b, descriptors| {
                b.iter(|| DependencyGraph::build(black_box(descriptors.clone())));
            },
        );
    }
    group.finish();
}

fn closure_benchmark(c: &mut Criterion) {
    let waves = DependencyGraph::build(layered_descriptors(50, 20)).unwrap();
    let targets = ["s-19-0", "s-19-25", "s-19-49"];

    c.bench_function("upstream_closure_50x20", |b| {
        b.iter(|| waves.upstream_closure(black_box(&targets[..])));
    });
    c.bench_function("transitive_dependents_50x20", |b| {
        b.iter(|| waves.transitive_dependents(black_box("s-0-0")));
    });
}

fn catalog_benchmark(c: &mut Criterion) {
    c.bench_function("todo_app_catalog", |b| {
        b.iter(|| todo_app_waves(black_box(Some("1.4.2"))));
    });
}

criterion_group!(benches, graph_build_benchmark, closure_benchmark, catalog_benchmark);
criterion_main!(benches);
