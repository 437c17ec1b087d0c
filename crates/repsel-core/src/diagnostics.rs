// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::config::Bounds;
use crate::procedure::Procedure;
use std::fmt;

/// Metadata schema version for run reports.
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Why an attribute was left out of the feature space.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "reason", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum ExclusionReason {
    LowPresence { presence_rate: f64, threshold: f64 },
    ZeroVariance,
    SingleLevel,
}

/// A recovered statistical failure: the requested procedure was replaced.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct FallbackRecord {
    pub context: String,
    pub requested: Procedure,
    pub applied: Procedure,
    pub reason: String,
}

/// Non-fatal condition recorded in run metadata. Never silently dropped.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum RunWarning {
    AttributeExclusion {
        attribute: String,
        reason: ExclusionReason,
    },
    RecordExcluded {
        series_id: String,
        missing: usize,
        considered: usize,
    },
    DegenerateFeatureSpace {
        requested: usize,
        distinct: usize,
    },
    InsufficientSample {
        attribute: String,
        group: Option<String>,
        size: usize,
        minimum: usize,
    },
    ProcedureFallback(FallbackRecord),
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeExclusion { attribute, reason } => match reason {
                ExclusionReason::LowPresence {
                    presence_rate,
                    threshold,
                } => write!(
                    f,
                    "attribute '{attribute}' excluded: presence {presence_rate:.3} below threshold {threshold:.3}"
                ),
                ExclusionReason::ZeroVariance => {
                    write!(f, "attribute '{attribute}' excluded: zero variance")
                }
                ExclusionReason::SingleLevel => {
                    write!(f, "attribute '{attribute}' excluded: single category level")
                }
            },
            Self::RecordExcluded {
                series_id,
                missing,
                considered,
            } => write!(
                f,
                "series '{series_id}' excluded: {missing} of {considered} feature attributes missing"
            ),
            Self::DegenerateFeatureSpace {
                requested,
                distinct,
            } => write!(
                f,
                "cluster count capped from {requested} to {distinct}: only {distinct} distinct feature vectors"
            ),
            Self::InsufficientSample {
                attribute,
                group,
                size,
                minimum,
            } => match group {
                Some(group) => write!(
                    f,
                    "assumption test for '{attribute}' group '{group}' inconclusive: n={size} < {minimum}"
                ),
                None => write!(
                    f,
                    "assumption test for '{attribute}' inconclusive: n={size} < {minimum}"
                ),
            },
            Self::ProcedureFallback(record) => write!(
                f,
                "{}: {} replaced by {} ({})",
                record.context,
                record.requested.as_str(),
                record.applied.as_str(),
                record.reason
            ),
        }
    }
}

/// How a missing value on an included attribute was filled.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "method", content = "value", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum ImputationMethod {
    Mean(f64),
    Mode(String),
}

/// Explicit record of every imputation applied to one attribute.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ImputationReport {
    pub attribute: String,
    pub method: ImputationMethod,
    pub series_ids: Vec<String>,
}

impl ImputationReport {
    pub fn count(&self) -> usize {
        self.series_ids.len()
    }
}

/// Structured metadata captured from one pipeline run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RunMetadata {
    pub schema_version: u32,
    pub engine_version: Option<String>,
    pub seed: u64,
    pub record_count: usize,
    pub feature_count: usize,
    pub clustered_count: usize,
    pub requested_cluster_range: Option<Bounds>,
    pub selected_k: Option<usize>,
    pub runtime_ms: Option<u64>,
    pub notes: Vec<String>,
    pub warnings: Vec<RunWarning>,
    pub imputations: Vec<ImputationReport>,
    pub fallbacks: Vec<FallbackRecord>,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            schema_version: METADATA_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            seed: 0,
            record_count: 0,
            feature_count: 0,
            clustered_count: 0,
            requested_cluster_range: None,
            selected_k: None,
            runtime_ms: None,
            notes: vec![],
            warnings: vec![],
            imputations: vec![],
            fallbacks: vec![],
        }
    }
}

impl RunMetadata {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Records a warning and logs it. Fallback warnings are also indexed in `fallbacks`.
    pub fn push_warning(&mut self, warning: RunWarning) {
        tracing::warn!(warning = %warning, "run warning");
        if let RunWarning::ProcedureFallback(record) = &warning {
            self.fallbacks.push(record.clone());
        }
        self.warnings.push(warning);
    }

    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = RunWarning>) {
        for warning in warnings {
            self.push_warning(warning);
        }
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Attributes reported as excluded from the feature space.
    pub fn excluded_attributes(&self) -> Vec<&str> {
        self.warnings
            .iter()
            .filter_map(|warning| match warning {
                RunWarning::AttributeExclusion { attribute, .. } => Some(attribute.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ExclusionReason, FallbackRecord, ImputationMethod, ImputationReport,
        METADATA_SCHEMA_VERSION, RunMetadata, RunWarning,
    };
    use crate::Procedure;

    #[test]
    fn metadata_default_sets_schema_and_engine_version() {
        let metadata = RunMetadata::default();
        assert_eq!(metadata.schema_version, METADATA_SCHEMA_VERSION);
        assert_eq!(
            metadata.engine_version,
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
        assert!(metadata.warnings.is_empty());
        assert!(metadata.selected_k.is_none());
    }

    #[test]
    fn fallback_warnings_are_indexed() {
        let mut metadata = RunMetadata::new(9);
        let record = FallbackRecord {
            context: "correlation EchoTime~RepetitionTime".to_string(),
            requested: Procedure::Pearson,
            applied: Procedure::Spearman,
            reason: "zero variance".to_string(),
        };
        metadata.push_warning(RunWarning::ProcedureFallback(record.clone()));
        metadata.push_warning(RunWarning::AttributeExclusion {
            attribute: "ContrastBolusVolume".to_string(),
            reason: ExclusionReason::LowPresence {
                presence_rate: 0.4,
                threshold: 0.7,
            },
        });

        assert_eq!(metadata.seed, 9);
        assert_eq!(metadata.fallbacks, vec![record]);
        assert_eq!(metadata.warnings.len(), 2);
        assert_eq!(metadata.excluded_attributes(), vec!["ContrastBolusVolume"]);
    }

    #[test]
    fn warning_display_is_human_readable() {
        let warning = RunWarning::AttributeExclusion {
            attribute: "PixelBandwidth".to_string(),
            reason: ExclusionReason::LowPresence {
                presence_rate: 0.4,
                threshold: 0.7,
            },
        };
        assert_eq!(
            warning.to_string(),
            "attribute 'PixelBandwidth' excluded: presence 0.400 below threshold 0.700"
        );

        let warning = RunWarning::DegenerateFeatureSpace {
            requested: 4,
            distinct: 2,
        };
        assert_eq!(
            warning.to_string(),
            "cluster count capped from 4 to 2: only 2 distinct feature vectors"
        );
    }

    #[test]
    fn imputation_report_counts_series() {
        let report = ImputationReport {
            attribute: "Manufacturer".to_string(),
            method: ImputationMethod::Mode("GE".to_string()),
            series_ids: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(report.count(), 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn metadata_serde_roundtrip() {
        let mut metadata = RunMetadata::new(3);
        metadata.selected_k = Some(2);
        metadata.push_warning(RunWarning::InsufficientSample {
            attribute: "EchoTime".to_string(),
            group: Some("TOSHIBA".to_string()),
            size: 2,
            minimum: 3,
        });
        metadata.imputations.push(ImputationReport {
            attribute: "EchoTime".to_string(),
            method: ImputationMethod::Mean(2.5),
            series_ids: vec!["x".to_string()],
        });

        let encoded = serde_json::to_string(&metadata).expect("metadata should serialize");
        let decoded: RunMetadata =
            serde_json::from_str(&encoded).expect("metadata should deserialize");
        assert_eq!(decoded, metadata);
    }
}
