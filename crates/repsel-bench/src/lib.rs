// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Synthetic acquisition data shared by the benchmarks.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use repsel_core::{RecordSet, RepselError, SeriesRecord};

const VENDORS: [&str; 4] = ["GE", "PHILIPS", "SIEMENS", "TOSHIBA"];

/// `n` series with bimodal slice thickness, two timing parameters and a vendor tag.
/// About 5% of echo times are absent.
pub fn synthetic_records(n: usize, seed: u64) -> Result<RecordSet, RepselError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let jitter = Normal::new(0.0, 0.2)
        .map_err(|err| RepselError::invalid_input(format!("jitter distribution: {err}")))?;
    let timing = Normal::new(0.0, 1.0)
        .map_err(|err| RepselError::invalid_input(format!("timing distribution: {err}")))?;

    let records = (0..n)
        .map(|i| {
            let vendor = VENDORS[rng.gen_range(0..VENDORS.len())];
            let thickness = if rng.gen_bool(0.6) { 1.0 } else { 5.0 } + jitter.sample(&mut rng);
            let echo = (!rng.gen_bool(0.05)).then(|| 30.0 + 8.0 * timing.sample(&mut rng));
            SeriesRecord::new(format!("bench-{i:06}"), Some(vendor))
                .with_continuous("SliceThickness", Some(thickness))
                .with_continuous("EchoTime", echo)
                .with_continuous("RepetitionTime", Some(2000.0 + 300.0 * timing.sample(&mut rng)))
                .with_categorical("Manufacturer", Some(vendor))
        })
        .collect();
    RecordSet::new(records)
}

/// Gaussian blobs in `dim` dimensions around `centers` evenly spaced centres.
pub fn blob_points(n: usize, dim: usize, centers: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let center = (i % centers.max(1)) as f64 * 4.0;
            (0..dim)
                .map(|_| center + rng.r#gen::<f64>() - 0.5)
                .collect()
        })
        .collect()
}

/// Standard normal sample of length `n`.
pub fn normal_sample(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| rng.sample::<f64, _>(rand_distr::StandardNormal))
        .collect()
}
