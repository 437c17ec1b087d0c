// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;
use repsel_core::{Bounds, ExecutionContext, RecordSet, RunConfig, SeriesRecord};
use repsel_pipeline::execute_pipeline;

const VENDORS: [&str; 3] = ["GE", "PHILIPS", "SIEMENS"];
const PROTOCOLS: [&str; 5] = ["HEAD", "CHEST", "ABDOMEN", "SPINE", "KNEE"];
const MAX_RECORDS: usize = 256;

/// Four bytes per record: thickness, echo time (0 = absent), vendor, protocol (0 = absent).
fn records_from_bytes(data: &[u8]) -> Vec<SeriesRecord> {
    data.chunks_exact(4)
        .take(MAX_RECORDS)
        .enumerate()
        .map(|(i, chunk)| {
            let echo = (chunk[1] != 0).then(|| f64::from(chunk[1]) * 0.5);
            let protocol = (chunk[3] != 0).then(|| PROTOCOLS[usize::from(chunk[3]) % PROTOCOLS.len()]);
            SeriesRecord::new(format!("f{i:03}"), Some(VENDORS[usize::from(chunk[2]) % VENDORS.len()]))
                .with_continuous("SliceThickness", Some(f64::from(chunk[0]) / 16.0))
                .with_continuous("EchoTime", echo)
                .with_categorical("ProtocolName", protocol)
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let Some((&k_seed, rest)) = data.split_first() else {
        return;
    };
    let Ok(records) = RecordSet::new(records_from_bytes(rest)) else {
        return;
    };
    let lower = 1 + usize::from(k_seed % 3);
    let config = RunConfig {
        cluster_range: Bounds::new(lower, lower + usize::from(k_seed / 64)),
        per_cluster_bounds: Bounds::new(1, 3),
        total_bounds: Bounds::new(1, 20),
        seed: u64::from(k_seed),
        ..RunConfig::default()
    };

    // Errors are fine; panics are not.
    if let Ok(report) = execute_pipeline(&records, &config, &ExecutionContext::new()) {
        assert!(report.representatives.len() <= config.total_bounds.upper);
        assert_eq!(
            report.assignments.len() + report.excluded_series.len(),
            records.len()
        );
    }
});
