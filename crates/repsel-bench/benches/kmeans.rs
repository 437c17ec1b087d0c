// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use repsel_bench::blob_points;
use repsel_cluster::{kmeans, select_cluster_count};
use repsel_core::{Bounds, ExecutionContext, KMeansConfig, RunConfig};

fn bench_kmeans(c: &mut Criterion, case_id: &str, n: usize, dim: usize, k: usize) {
    let points = blob_points(n, dim, k, 7);
    let config = KMeansConfig::default();
    let ctx = ExecutionContext::new();

    c.bench_function(case_id, |b| {
        b.iter(|| {
            kmeans(black_box(&points), k, &config, 42, &ctx)
                .expect("kmeans benchmark should succeed");
        })
    });
}

fn benchmark_kmeans_n1e4_d6_k5(c: &mut Criterion) {
    bench_kmeans(c, "kmeans_n1e4_d6_k5", 10_000, 6, 5);
}

fn benchmark_kmeans_n1e3_d20_k15(c: &mut Criterion) {
    bench_kmeans(c, "kmeans_n1e3_d20_k15", 1_000, 20, 15);
}

fn benchmark_cluster_count_n2e3(c: &mut Criterion) {
    let points = blob_points(2_000, 6, 4, 11);
    let config = RunConfig {
        cluster_range: Bounds::new(2, 8),
        ..RunConfig::default()
    };
    let ctx = ExecutionContext::new();

    c.bench_function("cluster_count_n2e3_k2_8", |b| {
        b.iter(|| {
            select_cluster_count(black_box(&points), &config, &ctx)
                .expect("cluster count benchmark should succeed");
        })
    });
}

criterion_group!(
    benches,
    benchmark_kmeans_n1e4_d6_k5,
    benchmark_kmeans_n1e3_d20_k15,
    benchmark_cluster_count_n2e3
);
criterion_main!(benches);
