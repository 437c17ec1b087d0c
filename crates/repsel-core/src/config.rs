// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::RepselError;
use crate::repro::DEFAULT_SEED;

pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;
pub const DEFAULT_MIN_GROUP_SIZE: usize = 3;
pub const DEFAULT_SHAPIRO_WILK_MAX_N: usize = 5000;
pub const DEFAULT_PRESENCE_THRESHOLD: f64 = 0.70;
pub const DEFAULT_MAX_RECORD_MISSING_FRACTION: f64 = 0.5;
pub const DEFAULT_CARDINALITY_THRESHOLD: usize = 15;
pub const DEFAULT_CATEGORICAL_WEIGHT: f64 = 0.25;
pub const DEFAULT_SILHOUETTE_TOLERANCE: f64 = 0.02;
pub const DEFAULT_SILHOUETTE_SAMPLE_LIMIT: usize = 5000;
pub const DEFAULT_MAX_ITERATIONS: usize = 300;
pub const DEFAULT_KMEANS_TOLERANCE: f64 = 1.0e-6;
pub const DEFAULT_RESTARTS: usize = 4;

/// Smallest sample the Shapiro-Wilk approximation is defined for.
const SHAPIRO_WILK_MIN_N: usize = 3;
/// Largest sample the Shapiro-Wilk p-value approximation is calibrated for.
const SHAPIRO_WILK_MAX_SUPPORTED_N: usize = 5000;
/// D'Agostino-Pearson needs at least this many observations for its skewness term.
const OMNIBUS_MIN_N: usize = 8;

/// Inclusive `lower..=upper` bound.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub lower: usize,
    pub upper: usize,
}

impl Bounds {
    pub const fn new(lower: usize, upper: usize) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: usize) -> bool {
        (self.lower..=self.upper).contains(&value)
    }
}

/// Variance-equality test centering.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LeveneCenter {
    /// Brown-Forsythe variant; robust to non-normal groups.
    #[default]
    Median,
    Mean,
}

/// How continuous attributes are scaled into the feature space.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContinuousScaling {
    #[default]
    ZScore,
    /// Rank-transform attributes whose normality does not hold, z-score the rest.
    RankWhenNonNormal,
}

/// Normality test selection policy.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalityConfig {
    /// Largest sample tested with Shapiro-Wilk; larger samples use D'Agostino-Pearson.
    pub shapiro_wilk_max_n: usize,
}

impl Default for NormalityConfig {
    fn default() -> Self {
        Self {
            shapiro_wilk_max_n: DEFAULT_SHAPIRO_WILK_MAX_N,
        }
    }
}

#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KMeansConfig {
    pub max_iterations: usize,
    /// Convergence threshold on the largest centroid shift (Euclidean).
    pub tolerance: f64,
    /// Independently seeded initializations; the lowest within-cluster sum of squares wins.
    pub restarts: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_KMEANS_TOLERANCE,
            restarts: DEFAULT_RESTARTS,
        }
    }
}

/// Complete configuration surface for one run.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub significance: f64,
    pub min_group_size: usize,
    pub normality: NormalityConfig,
    pub levene_center: LeveneCenter,
    pub presence_threshold: f64,
    pub max_record_missing_fraction: f64,
    pub cardinality_threshold: usize,
    /// Value of a one-hot indicator. A level mismatch adds `2 * weight^2` to the squared
    /// distance, against 1.0 for a one standard deviation continuous difference.
    pub categorical_weight: f64,
    pub continuous_scaling: ContinuousScaling,
    pub cluster_range: Bounds,
    pub silhouette_tolerance: f64,
    pub silhouette_sample_limit: Option<usize>,
    pub kmeans: KMeansConfig,
    pub per_cluster_bounds: Bounds,
    pub total_bounds: Bounds,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            significance: DEFAULT_SIGNIFICANCE,
            min_group_size: DEFAULT_MIN_GROUP_SIZE,
            normality: NormalityConfig::default(),
            levene_center: LeveneCenter::Median,
            presence_threshold: DEFAULT_PRESENCE_THRESHOLD,
            max_record_missing_fraction: DEFAULT_MAX_RECORD_MISSING_FRACTION,
            cardinality_threshold: DEFAULT_CARDINALITY_THRESHOLD,
            categorical_weight: DEFAULT_CATEGORICAL_WEIGHT,
            continuous_scaling: ContinuousScaling::ZScore,
            cluster_range: Bounds::new(2, 15),
            silhouette_tolerance: DEFAULT_SILHOUETTE_TOLERANCE,
            silhouette_sample_limit: Some(DEFAULT_SILHOUETTE_SAMPLE_LIMIT),
            kmeans: KMeansConfig::default(),
            per_cluster_bounds: Bounds::new(5, 10),
            total_bounds: Bounds::new(50, 100),
            seed: DEFAULT_SEED,
        }
    }
}

impl RunConfig {
    /// Checks every threshold and bound. Must pass before any stage runs.
    pub fn validate(&self) -> Result<(), RepselError> {
        if !(self.significance.is_finite() && self.significance > 0.0 && self.significance < 1.0)
        {
            return Err(RepselError::invalid_configuration(format!(
                "significance must be in (0, 1); got {}",
                self.significance
            )));
        }

        if self.min_group_size < SHAPIRO_WILK_MIN_N {
            return Err(RepselError::invalid_configuration(format!(
                "min_group_size must be >= {SHAPIRO_WILK_MIN_N}; got {}",
                self.min_group_size
            )));
        }

        let max_n = self.normality.shapiro_wilk_max_n;
        if max_n < OMNIBUS_MIN_N.max(self.min_group_size) || max_n > SHAPIRO_WILK_MAX_SUPPORTED_N
        {
            return Err(RepselError::invalid_configuration(format!(
                "normality.shapiro_wilk_max_n must be in [max({OMNIBUS_MIN_N}, min_group_size={}), {SHAPIRO_WILK_MAX_SUPPORTED_N}]; got {max_n}",
                self.min_group_size
            )));
        }

        check_unit_interval("presence_threshold", self.presence_threshold)?;
        check_unit_interval(
            "max_record_missing_fraction",
            self.max_record_missing_fraction,
        )?;

        if self.cardinality_threshold == 0 {
            return Err(RepselError::invalid_configuration(
                "cardinality_threshold must be >= 1; got 0",
            ));
        }

        if !(self.categorical_weight.is_finite() && self.categorical_weight > 0.0) {
            return Err(RepselError::invalid_configuration(format!(
                "categorical_weight must be finite and > 0; got {}",
                self.categorical_weight
            )));
        }

        check_bounds("cluster_range", self.cluster_range)?;

        if !(self.silhouette_tolerance.is_finite() && self.silhouette_tolerance >= 0.0) {
            return Err(RepselError::invalid_configuration(format!(
                "silhouette_tolerance must be finite and >= 0; got {}",
                self.silhouette_tolerance
            )));
        }

        if let Some(limit) = self.silhouette_sample_limit {
            if limit < 2 {
                return Err(RepselError::invalid_configuration(format!(
                    "silhouette_sample_limit must be >= 2 when provided; got {limit}"
                )));
            }
        }

        if self.kmeans.max_iterations == 0 {
            return Err(RepselError::invalid_configuration(
                "kmeans.max_iterations must be >= 1; got 0",
            ));
        }
        if !(self.kmeans.tolerance.is_finite() && self.kmeans.tolerance >= 0.0) {
            return Err(RepselError::invalid_configuration(format!(
                "kmeans.tolerance must be finite and >= 0; got {}",
                self.kmeans.tolerance
            )));
        }
        if self.kmeans.restarts == 0 {
            return Err(RepselError::invalid_configuration(
                "kmeans.restarts must be >= 1; got 0",
            ));
        }

        check_bounds("per_cluster_bounds", self.per_cluster_bounds)?;
        check_bounds("total_bounds", self.total_bounds)?;

        let floor = self
            .cluster_range
            .upper
            .checked_mul(self.per_cluster_bounds.lower)
            .ok_or_else(|| {
                RepselError::invalid_configuration(
                    "cluster_range.upper * per_cluster_bounds.lower overflows",
                )
            })?;
        if floor > self.total_bounds.upper {
            return Err(RepselError::invalid_configuration(format!(
                "cluster_range.upper ({}) * per_cluster_bounds.lower ({}) = {floor} exceeds total_bounds.upper ({}); per-cluster and total bounds cannot both hold",
                self.cluster_range.upper, self.per_cluster_bounds.lower, self.total_bounds.upper
            )));
        }

        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<(), RepselError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RepselError::invalid_configuration(format!(
            "{name} must be in [0, 1]; got {value}"
        )))
    }
}

fn check_bounds(name: &str, bounds: Bounds) -> Result<(), RepselError> {
    if bounds.lower == 0 {
        return Err(RepselError::invalid_configuration(format!(
            "{name}.lower must be >= 1; got 0"
        )));
    }
    if bounds.lower > bounds.upper {
        return Err(RepselError::invalid_configuration(format!(
            "{name} must satisfy lower <= upper; got lower={}, upper={}",
            bounds.lower, bounds.upper
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Bounds, ContinuousScaling, LeveneCenter, RunConfig};

    #[test]
    fn default_config_matches_documented_defaults_and_validates() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.significance, 0.05);
        assert_eq!(cfg.min_group_size, 3);
        assert_eq!(cfg.presence_threshold, 0.70);
        assert_eq!(cfg.cardinality_threshold, 15);
        assert_eq!(cfg.categorical_weight, 0.25);
        assert_eq!(cfg.cluster_range, Bounds::new(2, 15));
        assert_eq!(cfg.silhouette_tolerance, 0.02);
        assert_eq!(cfg.per_cluster_bounds, Bounds::new(5, 10));
        assert_eq!(cfg.total_bounds, Bounds::new(50, 100));
        assert_eq!(cfg.kmeans.max_iterations, 300);
        assert_eq!(cfg.levene_center, LeveneCenter::Median);
        assert_eq!(cfg.continuous_scaling, ContinuousScaling::ZScore);
        cfg.validate().expect("defaults must validate");
    }

    #[test]
    fn validate_rejects_out_of_range_thresholds() {
        let cases: Vec<(RunConfig, &str)> = vec![
            (
                RunConfig {
                    significance: 0.0,
                    ..RunConfig::default()
                },
                "significance",
            ),
            (
                RunConfig {
                    presence_threshold: 1.2,
                    ..RunConfig::default()
                },
                "presence_threshold",
            ),
            (
                RunConfig {
                    min_group_size: 2,
                    ..RunConfig::default()
                },
                "min_group_size",
            ),
            (
                RunConfig {
                    cardinality_threshold: 0,
                    ..RunConfig::default()
                },
                "cardinality_threshold",
            ),
            (
                RunConfig {
                    categorical_weight: 0.0,
                    ..RunConfig::default()
                },
                "categorical_weight",
            ),
            (
                RunConfig {
                    silhouette_tolerance: -0.1,
                    ..RunConfig::default()
                },
                "silhouette_tolerance",
            ),
            (
                RunConfig {
                    cluster_range: Bounds::new(6, 2),
                    ..RunConfig::default()
                },
                "cluster_range",
            ),
            (
                RunConfig {
                    per_cluster_bounds: Bounds::new(0, 10),
                    ..RunConfig::default()
                },
                "per_cluster_bounds.lower",
            ),
        ];

        for (cfg, needle) in cases {
            let err = cfg.validate().expect_err("config should be rejected");
            assert_eq!(err.code(), "invalid_configuration");
            assert!(
                err.to_string().contains(needle),
                "message '{err}' should mention '{needle}'"
            );
        }
    }

    #[test]
    fn validate_rejects_unsatisfiable_representative_bounds() {
        let cfg = RunConfig {
            cluster_range: Bounds::new(2, 30),
            ..RunConfig::default()
        };
        let err = cfg.validate().expect_err("30 * 5 > 100 must be rejected");
        assert!(err.to_string().contains("cannot both hold"));
    }

    #[test]
    fn bounds_contains_is_inclusive() {
        let bounds = Bounds::new(5, 10);
        assert!(bounds.contains(5));
        assert!(bounds.contains(10));
        assert!(!bounds.contains(11));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: RunConfig = serde_json::from_str(
            r#"{"seed": 7, "cluster_range": {"lower": 2, "upper": 6}, "kmeans": {"restarts": 2}}"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.cluster_range, Bounds::new(2, 6));
        assert_eq!(cfg.kmeans.restarts, 2);
        assert_eq!(cfg.kmeans.max_iterations, 300);
        assert_eq!(cfg.significance, 0.05);
    }
}
