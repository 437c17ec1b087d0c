// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use repsel_bench::{normal_sample, synthetic_records};
use repsel_core::{LeveneCenter, RunConfig};
use repsel_stats::{Grouping, assess_attributes, dagostino_pearson, levene, shapiro_wilk};

fn benchmark_shapiro_wilk_n5000(c: &mut Criterion) {
    let sample = normal_sample(5_000, 3);
    c.bench_function("shapiro_wilk_n5000", |b| {
        b.iter(|| shapiro_wilk(black_box(&sample)).expect("shapiro-wilk should succeed"))
    });
}

fn benchmark_dagostino_pearson_n1e5(c: &mut Criterion) {
    let sample = normal_sample(100_000, 5);
    c.bench_function("dagostino_pearson_n1e5", |b| {
        b.iter(|| dagostino_pearson(black_box(&sample)).expect("omnibus test should succeed"))
    });
}

fn benchmark_brown_forsythe_4x2500(c: &mut Criterion) {
    let groups: Vec<Vec<f64>> = (0..4).map(|g| normal_sample(2_500, 20 + g)).collect();
    let slices: Vec<&[f64]> = groups.iter().map(Vec::as_slice).collect();
    c.bench_function("brown_forsythe_4x2500", |b| {
        b.iter(|| levene(black_box(&slices), LeveneCenter::Median).expect("levene should succeed"))
    });
}

fn benchmark_assess_attributes_n1e4(c: &mut Criterion) {
    let records = synthetic_records(10_000, 9).expect("synthetic records");
    let config = RunConfig::default();
    let attributes = ["EchoTime", "RepetitionTime", "SliceThickness"];
    c.bench_function("assess_attributes_n1e4_by_vendor", |b| {
        b.iter(|| {
            assess_attributes(
                black_box(&records),
                &attributes,
                Some(&Grouping::Provenance),
                &config,
            )
            .expect("assumption benchmark should succeed")
        })
    });
}

criterion_group!(
    benches,
    benchmark_shapiro_wilk_n5000,
    benchmark_dagostino_pearson_n1e5,
    benchmark_brown_forsythe_4x2500,
    benchmark_assess_attributes_n1e4
);
criterion_main!(benches);
