// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use repsel_bench::synthetic_records;
use repsel_core::{Bounds, ExecutionContext, RunConfig};
use repsel_pipeline::execute_pipeline;

fn benchmark_pipeline_n2e3(c: &mut Criterion) {
    let records = synthetic_records(2_000, 1).expect("synthetic records");
    let config = RunConfig {
        cluster_range: Bounds::new(2, 6),
        ..RunConfig::default()
    };
    let ctx = ExecutionContext::new();

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.bench_function("pipeline_n2e3_k2_6", |b| {
        b.iter(|| {
            execute_pipeline(black_box(&records), &config, &ctx)
                .expect("pipeline benchmark should succeed")
        })
    });
    group.finish();
}

criterion_group!(benches, benchmark_pipeline_n2e3);
criterion_main!(benches);
