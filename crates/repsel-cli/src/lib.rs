// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use repsel_core::{ExecutionContext, RecordSet, RepselError, RunConfig, SeriesRecord};
use repsel_pipeline::{
    RunReport, assignment_table, execute_pipeline, id_list, representative_ids,
    representative_rows, representatives_csv,
};

/// Parses a JSON array of series records and validates it as one batch.
pub fn parse_records_json(raw: &str) -> Result<RecordSet, RepselError> {
    let records: Vec<SeriesRecord> = serde_json::from_str(raw)
        .map_err(|err| RepselError::invalid_input(format!("invalid records JSON: {err}")))?;
    RecordSet::new(records)
}

/// Parses a JSON run configuration; missing fields take their defaults.
pub fn parse_config_json(raw: &str) -> Result<RunConfig, RepselError> {
    let config: RunConfig = serde_json::from_str(raw)
        .map_err(|err| RepselError::invalid_configuration(format!("invalid config JSON: {err}")))?;
    config.validate()?;
    Ok(config)
}

/// Flag overrides layered on top of a loaded configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigOverrides {
    pub seed: Option<u64>,
    pub k_min: Option<usize>,
    pub k_max: Option<usize>,
}

impl ConfigOverrides {
    pub fn apply(self, mut config: RunConfig) -> Result<RunConfig, RepselError> {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(k_min) = self.k_min {
            config.cluster_range.lower = k_min;
        }
        if let Some(k_max) = self.k_max {
            config.cluster_range.upper = k_max;
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn run_pipeline(records: &RecordSet, config: &RunConfig) -> Result<RunReport, RepselError> {
    execute_pipeline(records, config, &ExecutionContext::new())
}

/// Rendered export files of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunArtifacts {
    pub assignments_csv: String,
    pub representatives_csv: String,
    pub representative_ids: String,
}

pub const ASSIGNMENTS_FILE: &str = "assignments.csv";
pub const REPRESENTATIVES_FILE: &str = "representatives.csv";
pub const REPRESENTATIVE_IDS_FILE: &str = "representative_ids.txt";
pub const REPORT_FILE: &str = "report.json";

pub fn render_artifacts(records: &RecordSet, report: &RunReport) -> RunArtifacts {
    RunArtifacts {
        assignments_csv: assignment_table(records, report).to_csv(),
        representatives_csv: representatives_csv(&representative_rows(report)),
        representative_ids: id_list(&representative_ids(report)),
    }
}
