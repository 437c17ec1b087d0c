// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::descriptive::{mean, median};
use crate::special::{chi_square_sf, f_sf, normal_ppf, normal_sf};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use repsel_core::{AttributeKind, LeveneCenter, RecordSet, RepselError, RunConfig, RunWarning};
use std::collections::BTreeMap;

// Royston (1995) polynomial coefficients, constant term first.
const SW_C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const SW_C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const SW_C3: [f64; 4] = [0.5440, -0.39978, 0.025054, -6.714e-4];
const SW_C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const SW_C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const SW_C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const SW_G: [f64; 2] = [-2.273, 0.459];
const SW_MIN_N: usize = 3;
const SW_MAX_N: usize = 5000;
const SW_SMALL_N: usize = 11;
const OMNIBUS_MIN_N: usize = 8;

/// Group label for records without a provenance tag.
pub const UNKNOWN_GROUP: &str = "<unknown>";

#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestKind {
    ShapiroWilk,
    DagostinoPearson,
    Levene,
    BrownForsythe,
}

/// Raw statistic and p-value of one assumption test.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct TestOutcome {
    pub test: TestKind,
    pub statistic: f64,
    pub p_value: f64,
    pub n: usize,
}

#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "reason", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum InconclusiveReason {
    InsufficientSample { size: usize, minimum: usize },
    Degenerate { detail: String },
}

/// Decision on one assumption. Inconclusive must be treated as violated by callers.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "verdict", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Holds(TestOutcome),
    Violated(TestOutcome),
    Inconclusive(InconclusiveReason),
}

impl Verdict {
    /// `Holds` iff the p-value exceeds `significance`.
    pub fn decide(outcome: TestOutcome, significance: f64) -> Self {
        if outcome.p_value > significance {
            Self::Holds(outcome)
        } else {
            Self::Violated(outcome)
        }
    }

    pub fn holds(&self) -> bool {
        matches!(self, Self::Holds(_))
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Self::Inconclusive(_))
    }

    pub fn outcome(&self) -> Option<&TestOutcome> {
        match self {
            Self::Holds(outcome) | Self::Violated(outcome) => Some(outcome),
            Self::Inconclusive(_) => None,
        }
    }

    fn from_error(err: RepselError) -> Self {
        match err {
            RepselError::InsufficientSample { size, minimum, .. } => {
                Self::Inconclusive(InconclusiveReason::InsufficientSample { size, minimum })
            }
            other => Self::Inconclusive(InconclusiveReason::Degenerate {
                detail: other.to_string(),
            }),
        }
    }
}

/// Normality and variance-equality decisions for one attribute, optionally one subgroup.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AssumptionResult {
    pub attribute: String,
    pub group: Option<String>,
    pub normality: Verdict,
    /// Between-group verdict; `None` when no grouping was requested.
    pub homoscedasticity: Option<Verdict>,
}

impl AssumptionResult {
    pub fn is_normal(&self) -> bool {
        self.normality.holds()
    }

    pub fn is_homoscedastic(&self) -> bool {
        self.homoscedasticity.as_ref().is_some_and(Verdict::holds)
    }

    /// Insufficient-sample conditions surfaced as run warnings.
    pub fn warnings(&self) -> Vec<RunWarning> {
        let mut warnings = vec![];
        if let Verdict::Inconclusive(InconclusiveReason::InsufficientSample { size, minimum }) =
            &self.normality
        {
            warnings.push(RunWarning::InsufficientSample {
                attribute: self.attribute.clone(),
                group: self.group.clone(),
                size: *size,
                minimum: *minimum,
            });
        }
        // The between-group verdict is shared by every row, so report it once on the overall row.
        if self.group.is_none() {
            if let Some(Verdict::Inconclusive(InconclusiveReason::InsufficientSample {
                size,
                minimum,
            })) = &self.homoscedasticity
            {
                warnings.push(RunWarning::InsufficientSample {
                    attribute: self.attribute.clone(),
                    group: Some("<between-groups>".to_string()),
                    size: *size,
                    minimum: *minimum,
                });
            }
        }
        warnings
    }
}

/// How records are partitioned for homoscedasticity tests.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "by", content = "name", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grouping {
    /// By the record's provenance tag (hardware vendor).
    Provenance,
    /// By the value of a categorical attribute.
    Attribute(String),
}

fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, coefficient| acc * x + coefficient)
}

/// Shapiro-Wilk W with Royston's p-value approximation, valid for 3 <= n <= 5000.
pub fn shapiro_wilk(sample: &[f64]) -> Result<TestOutcome, RepselError> {
    let n = sample.len();
    if n < SW_MIN_N {
        return Err(RepselError::insufficient_sample(
            "shapiro-wilk",
            n,
            SW_MIN_N,
        ));
    }
    if n > SW_MAX_N {
        return Err(RepselError::invalid_input(format!(
            "shapiro-wilk supports n <= {SW_MAX_N}; got {n}"
        )));
    }

    let mut x = sample.to_vec();
    x.sort_by(f64::total_cmp);
    let range = x[n - 1] - x[0];
    if range <= f64::EPSILON * x[n - 1].abs().max(1.0) {
        return Err(RepselError::numerical_issue(
            "shapiro-wilk is undefined for a constant sample",
        ));
    }

    let half = n / 2;
    let an = n as f64;
    let mut a = vec![0.0; half];
    if n == 3 {
        a[0] = std::f64::consts::FRAC_1_SQRT_2;
    } else {
        let an25 = an + 0.25;
        let m: Vec<f64> = (1..=half)
            .map(|i| normal_ppf((i as f64 - 0.375) / an25))
            .collect();
        let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
        let ssumm2 = summ2.sqrt();
        let rsn = 1.0 / an.sqrt();
        let a1 = poly(&SW_C1, rsn) - m[0] / ssumm2;

        let (first_plain, fac) = if n > 5 {
            let a2 = -m[1] / ssumm2 + poly(&SW_C2, rsn);
            let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
                / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
                .sqrt();
            a[1] = a2;
            (2, fac)
        } else {
            let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
            (1, fac)
        };
        a[0] = a1;
        for i in first_plain..half {
            a[i] = -m[i] / fac;
        }
    }

    let mu = x.iter().sum::<f64>() / an;
    let ss: f64 = x.iter().map(|v| (v - mu) * (v - mu)).sum();
    let numerator: f64 = a
        .iter()
        .enumerate()
        .map(|(i, coefficient)| coefficient * (x[n - 1 - i] - x[i]))
        .sum();
    let w = (numerator * numerator / ss).min(1.0);

    let p_value = shapiro_wilk_p_value(w, n);
    Ok(TestOutcome {
        test: TestKind::ShapiroWilk,
        statistic: w,
        p_value,
        n,
    })
}

fn shapiro_wilk_p_value(w: f64, n: usize) -> f64 {
    let an = n as f64;
    if n == 3 {
        let pi6 = 6.0 / std::f64::consts::PI;
        let stqr = std::f64::consts::FRAC_PI_3;
        return (pi6 * (w.sqrt().asin() - stqr)).clamp(0.0, 1.0);
    }

    let mut y = (1.0 - w).ln();
    let (m, s) = if n <= SW_SMALL_N {
        let gamma = poly(&SW_G, an);
        if y >= gamma {
            return 0.0;
        }
        y = -(gamma - y).ln();
        (poly(&SW_C3, an), poly(&SW_C4, an).exp())
    } else {
        let ln_n = an.ln();
        (poly(&SW_C5, ln_n), poly(&SW_C6, ln_n).exp())
    };

    normal_sf((y - m) / s).clamp(0.0, 1.0)
}

/// D'Agostino-Pearson K² omnibus test from sample skewness and kurtosis.
pub fn dagostino_pearson(sample: &[f64]) -> Result<TestOutcome, RepselError> {
    let n = sample.len();
    if n < OMNIBUS_MIN_N {
        return Err(RepselError::insufficient_sample(
            "d'agostino-pearson",
            n,
            OMNIBUS_MIN_N,
        ));
    }

    let nf = n as f64;
    let mu = sample.iter().sum::<f64>() / nf;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for value in sample {
        let d = value - mu;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= nf;
    m3 /= nf;
    m4 /= nf;
    if m2 <= f64::EPSILON * mu.abs().max(1.0) * f64::EPSILON {
        return Err(RepselError::numerical_issue(
            "d'agostino-pearson is undefined for a constant sample",
        ));
    }

    let skewness = m3 / m2.powf(1.5);
    let kurtosis = m4 / (m2 * m2);
    let z_skew = skewness_z(skewness, nf);
    let z_kurt = kurtosis_z(kurtosis, nf)?;
    let k2 = z_skew * z_skew + z_kurt * z_kurt;

    Ok(TestOutcome {
        test: TestKind::DagostinoPearson,
        statistic: k2,
        p_value: chi_square_sf(k2, 2.0),
        n,
    })
}

fn skewness_z(skewness: f64, n: f64) -> f64 {
    let y = skewness * (((n + 1.0) * (n + 3.0)) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    delta * (y / alpha).asinh()
}

fn kurtosis_z(kurtosis: f64, n: f64) -> Result<f64, RepselError> {
    let expected = 3.0 * (n - 1.0) / (n + 1.0);
    let variance = 24.0 * n * (n - 2.0) * (n - 3.0)
        / ((n + 1.0) * (n + 1.0) * (n + 3.0) * (n + 5.0));
    let x = (kurtosis - expected) / variance.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * ((6.0 * (n + 3.0) * (n + 5.0)) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0
        + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    if denom == 0.0 {
        return Err(RepselError::numerical_issue(
            "kurtosis test denominator is zero",
        ));
    }
    let term2 = denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt();
    Ok((term1 - term2) / (2.0 / (9.0 * a)).sqrt())
}

/// Levene's test for equal variances. `Median` centering is the Brown-Forsythe variant.
pub fn levene(groups: &[&[f64]], center: LeveneCenter) -> Result<TestOutcome, RepselError> {
    if groups.len() < 2 {
        return Err(RepselError::invalid_input(format!(
            "levene requires at least 2 groups; got {}",
            groups.len()
        )));
    }
    if let Some(smallest) = groups.iter().map(|g| g.len()).min() {
        if smallest < 2 {
            return Err(RepselError::insufficient_sample("levene group", smallest, 2));
        }
    }

    let k = groups.len();
    let total: usize = groups.iter().map(|g| g.len()).sum();

    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|group| {
            let c = match center {
                LeveneCenter::Median => median(group),
                LeveneCenter::Mean => mean(group),
            }
            .unwrap_or(0.0);
            group.iter().map(|v| (v - c).abs()).collect()
        })
        .collect();

    let group_means: Vec<f64> = deviations
        .iter()
        .map(|z| z.iter().sum::<f64>() / z.len() as f64)
        .collect();
    let grand_mean = deviations.iter().flatten().sum::<f64>() / total as f64;

    let between: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, zm)| z.len() as f64 * (zm - grand_mean) * (zm - grand_mean))
        .sum();
    let within: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, zm)| z.iter().map(|v| (v - zm) * (v - zm)).sum::<f64>())
        .sum();

    let d1 = (k - 1) as f64;
    let d2 = (total - k) as f64;
    let (statistic, p_value) = if within <= 0.0 {
        if between <= 0.0 {
            (0.0, 1.0)
        } else {
            (f64::INFINITY, 0.0)
        }
    } else {
        let w = (d2 / d1) * (between / within);
        (w, f_sf(w, d1, d2))
    };

    Ok(TestOutcome {
        test: match center {
            LeveneCenter::Median => TestKind::BrownForsythe,
            LeveneCenter::Mean => TestKind::Levene,
        },
        statistic,
        p_value,
        n: total,
    })
}

/// Normality decision for one sample under the configured test policy.
pub fn test_normality(sample: &[f64], config: &RunConfig) -> Verdict {
    let n = sample.len();
    if n < config.min_group_size {
        return Verdict::Inconclusive(InconclusiveReason::InsufficientSample {
            size: n,
            minimum: config.min_group_size,
        });
    }

    let outcome = if n <= config.normality.shapiro_wilk_max_n {
        shapiro_wilk(sample)
    } else {
        dagostino_pearson(sample)
    };

    match outcome {
        Ok(outcome) => Verdict::decide(outcome, config.significance),
        Err(err) => Verdict::from_error(err),
    }
}

/// Variance-equality decision across groups.
pub fn test_homoscedasticity(groups: &[&[f64]], config: &RunConfig) -> Verdict {
    if groups.len() < 2 {
        return Verdict::Inconclusive(InconclusiveReason::Degenerate {
            detail: format!("need at least 2 groups; got {}", groups.len()),
        });
    }
    if let Some(smallest) = groups.iter().map(|g| g.len()).min() {
        if smallest < config.min_group_size {
            return Verdict::Inconclusive(InconclusiveReason::InsufficientSample {
                size: smallest,
                minimum: config.min_group_size,
            });
        }
    }

    match levene(groups, config.levene_center) {
        Ok(outcome) => Verdict::decide(outcome, config.significance),
        Err(err) => Verdict::from_error(err),
    }
}

/// Present values of a continuous attribute partitioned by `grouping`, keyed by group label.
pub fn group_values(
    records: &RecordSet,
    attribute: &str,
    grouping: &Grouping,
) -> Result<BTreeMap<String, Vec<f64>>, RepselError> {
    ensure_kind(records, attribute, AttributeKind::Continuous)?;
    if let Grouping::Attribute(name) = grouping {
        ensure_kind(records, name, AttributeKind::Categorical)?;
    }

    let mut groups = BTreeMap::<String, Vec<f64>>::new();
    for record in records.records() {
        let Some(value) = record.continuous(attribute) else {
            continue;
        };
        let label = match grouping {
            Grouping::Provenance => record.provenance().unwrap_or(UNKNOWN_GROUP),
            Grouping::Attribute(name) => match record.categorical(name) {
                Some(label) => label,
                None => continue,
            },
        };
        groups.entry(label.to_string()).or_default().push(value);
    }
    Ok(groups)
}

/// Tests one continuous attribute.
///
/// The first result covers the whole sample; with a grouping, one result per group
/// follows in label order, each carrying the shared between-group verdict.
pub fn assess_attribute(
    records: &RecordSet,
    attribute: &str,
    grouping: Option<&Grouping>,
    config: &RunConfig,
) -> Result<Vec<AssumptionResult>, RepselError> {
    ensure_kind(records, attribute, AttributeKind::Continuous)?;
    let overall_sample: Vec<f64> = records
        .continuous_column(attribute)
        .into_iter()
        .flatten()
        .collect();
    let overall_normality = test_normality(&overall_sample, config);

    let Some(grouping) = grouping else {
        return Ok(vec![AssumptionResult {
            attribute: attribute.to_string(),
            group: None,
            normality: overall_normality,
            homoscedasticity: None,
        }]);
    };

    let groups = group_values(records, attribute, grouping)?;
    let slices: Vec<&[f64]> = groups.values().map(Vec::as_slice).collect();
    let homoscedasticity = test_homoscedasticity(&slices, config);

    let mut results = Vec::with_capacity(groups.len() + 1);
    results.push(AssumptionResult {
        attribute: attribute.to_string(),
        group: None,
        normality: overall_normality,
        homoscedasticity: Some(homoscedasticity.clone()),
    });
    for (label, values) in &groups {
        results.push(AssumptionResult {
            attribute: attribute.to_string(),
            group: Some(label.clone()),
            normality: test_normality(values, config),
            homoscedasticity: Some(homoscedasticity.clone()),
        });
    }

    tracing::debug!(
        attribute,
        groups = groups.len(),
        normal = results[0].is_normal(),
        homoscedastic = results[0].is_homoscedastic(),
        "assessed attribute assumptions"
    );
    Ok(results)
}

/// Tests several attributes independently; runs in parallel with the `rayon` feature.
pub fn assess_attributes(
    records: &RecordSet,
    attributes: &[&str],
    grouping: Option<&Grouping>,
    config: &RunConfig,
) -> Result<BTreeMap<String, Vec<AssumptionResult>>, RepselError> {
    #[cfg(feature = "rayon")]
    let assessed: Vec<(String, Vec<AssumptionResult>)> = attributes
        .par_iter()
        .map(|attribute| {
            assess_attribute(records, attribute, grouping, config)
                .map(|results| (attribute.to_string(), results))
        })
        .collect::<Result<_, _>>()?;

    #[cfg(not(feature = "rayon"))]
    let assessed: Vec<(String, Vec<AssumptionResult>)> = attributes
        .iter()
        .map(|attribute| {
            assess_attribute(records, attribute, grouping, config)
                .map(|results| (attribute.to_string(), results))
        })
        .collect::<Result<_, _>>()?;

    Ok(assessed.into_iter().collect())
}

fn ensure_kind(
    records: &RecordSet,
    attribute: &str,
    expected: AttributeKind,
) -> Result<(), RepselError> {
    match records.kind_of(attribute) {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(RepselError::invalid_input(format!(
            "attribute '{attribute}' is {}, expected {}",
            kind.as_str(),
            expected.as_str()
        ))),
        None => Err(RepselError::invalid_input(format!(
            "unknown attribute '{attribute}'"
        ))),
    }
}
