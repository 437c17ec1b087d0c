// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use repsel_core::{
    AttributeKind, ContinuousScaling, ExclusionReason, ImputationMethod, ImputationReport,
    RecordSet, RepselError, RunConfig, RunWarning,
};
use repsel_stats::descriptive::{average_ranks, sample_std};
use repsel_stats::{AssumptionResult, AttributeProfile};
use std::collections::BTreeMap;

#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnEncoding {
    ZScore { mean: f64, std: f64 },
    /// Average ranks, z-scored; used for attributes whose normality does not hold.
    RankZScore,
    /// Indicator column taking `weight` for the level and 0.0 otherwise.
    OneHot { level: String, weight: f64 },
    /// Relative frequency of the category among present values.
    Frequency,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub attribute: String,
    pub encoding: ColumnEncoding,
}

/// Encoded point for one retained record.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    pub series_id: String,
    /// Index of the source record in the input [`RecordSet`].
    pub record_index: usize,
    pub values: Vec<f64>,
}

impl AsRef<[f64]> for FeatureVector {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodedFeatures {
    pub columns: Vec<FeatureColumn>,
    pub vectors: Vec<FeatureVector>,
    /// Attributes that contributed at least one column, in column order.
    pub included_attributes: Vec<String>,
    /// Series identifiers dropped for exceeding the missing-value fraction.
    pub excluded_records: Vec<String>,
    pub warnings: Vec<RunWarning>,
    pub imputations: Vec<ImputationReport>,
}

impl EncodedFeatures {
    pub fn dimension(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

struct RankScale {
    by_record: Vec<Option<f64>>,
    center: f64,
    spread: f64,
}

enum Plan {
    Continuous {
        mean: f64,
        std: f64,
        ranks: Option<RankScale>,
    },
    OneHot {
        levels: Vec<String>,
        mode: String,
        weight: f64,
    },
    Frequency {
        frequencies: BTreeMap<String, f64>,
        mode: String,
    },
}

struct AttributePlan<'a> {
    attribute: &'a str,
    plan: Plan,
}

/// Builds the numeric feature space.
///
/// Columns are continuous attributes by name, then categorical attributes by name with
/// one-hot levels in category order. Indicators take `config.categorical_weight` so a
/// low-cardinality attribute cannot outweigh the continuous structure. The result is a
/// pure function of its inputs.
pub fn encode_features(
    records: &RecordSet,
    profiles: &[AttributeProfile],
    assumptions: &BTreeMap<String, Vec<AssumptionResult>>,
    config: &RunConfig,
) -> Result<EncodedFeatures, RepselError> {
    config.validate()?;

    let mut warnings = vec![];
    let mut plans = vec![];
    for kind in [AttributeKind::Continuous, AttributeKind::Categorical] {
        let mut of_kind: Vec<&AttributeProfile> =
            profiles.iter().filter(|p| p.kind == kind).collect();
        of_kind.sort_by(|a, b| a.name.cmp(&b.name));

        for profile in of_kind {
            match plan_attribute(records, profile, assumptions, config) {
                Ok(plan) => plans.push(plan),
                Err(reason) => warnings.push(RunWarning::AttributeExclusion {
                    attribute: profile.name.clone(),
                    reason,
                }),
            }
        }
    }

    if plans.is_empty() {
        return Err(RepselError::invalid_input(format!(
            "no attributes remain after exclusion ({} profiled)",
            profiles.len()
        )));
    }

    let columns = build_columns(&plans);
    let considered = plans.len();
    let mut vectors = Vec::with_capacity(records.len());
    let mut excluded_records = vec![];
    let mut imputed: Vec<Vec<String>> = vec![vec![]; plans.len()];

    for (record_index, record) in records.records().iter().enumerate() {
        let present: Vec<bool> = plans
            .iter()
            .map(|plan| {
                record
                    .attribute(plan.attribute)
                    .is_some_and(|value| value.is_present())
            })
            .collect();
        let missing = present.iter().filter(|p| !**p).count();
        if missing as f64 / considered as f64 > config.max_record_missing_fraction {
            excluded_records.push(record.id().to_string());
            warnings.push(RunWarning::RecordExcluded {
                series_id: record.id().to_string(),
                missing,
                considered,
            });
            continue;
        }

        let mut values = Vec::with_capacity(columns.len());
        for (slot, plan) in plans.iter().enumerate() {
            if !present[slot] {
                imputed[slot].push(record.id().to_string());
            }
            encode_value(plan, record_index, records, &mut values);
        }
        vectors.push(FeatureVector {
            series_id: record.id().to_string(),
            record_index,
            values,
        });
    }

    let imputations = plans
        .iter()
        .zip(imputed)
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(plan, series_ids)| ImputationReport {
            attribute: plan.attribute.to_string(),
            method: match &plan.plan {
                Plan::Continuous { mean, .. } => ImputationMethod::Mean(*mean),
                Plan::OneHot { mode, .. } | Plan::Frequency { mode, .. } => {
                    ImputationMethod::Mode(mode.clone())
                }
            },
            series_ids,
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        columns = columns.len(),
        vectors = vectors.len(),
        excluded_attributes = profiles.len() - plans.len(),
        excluded_records = excluded_records.len(),
        imputed_attributes = imputations.len(),
        "encoded feature space"
    );

    Ok(EncodedFeatures {
        included_attributes: plans.iter().map(|p| p.attribute.to_string()).collect(),
        columns,
        vectors,
        excluded_records,
        warnings,
        imputations,
    })
}

fn plan_attribute<'a>(
    records: &RecordSet,
    profile: &'a AttributeProfile,
    assumptions: &BTreeMap<String, Vec<AssumptionResult>>,
    config: &RunConfig,
) -> Result<AttributePlan<'a>, ExclusionReason> {
    let presence_rate = profile.presence_rate();
    if presence_rate < config.presence_threshold {
        return Err(ExclusionReason::LowPresence {
            presence_rate,
            threshold: config.presence_threshold,
        });
    }

    let plan = match profile.kind {
        AttributeKind::Continuous => {
            let summary = profile.continuous().ok_or(ExclusionReason::ZeroVariance)?;
            if summary.std <= 0.0 {
                return Err(ExclusionReason::ZeroVariance);
            }
            let non_normal = !assumptions
                .get(&profile.name)
                .and_then(|results| results.iter().find(|r| r.group.is_none()))
                .is_some_and(AssumptionResult::is_normal);
            let ranks = (config.continuous_scaling == ContinuousScaling::RankWhenNonNormal
                && non_normal)
                .then(|| rank_scale(records, &profile.name))
                .flatten();
            Plan::Continuous {
                mean: summary.mean,
                std: summary.std,
                ranks,
            }
        }
        AttributeKind::Categorical => {
            let summary = profile.categorical().ok_or(ExclusionReason::SingleLevel)?;
            if summary.distinct() < 2 {
                return Err(ExclusionReason::SingleLevel);
            }
            if summary.distinct() <= config.cardinality_threshold {
                Plan::OneHot {
                    levels: summary.frequencies.keys().cloned().collect(),
                    mode: summary.mode.clone(),
                    weight: config.categorical_weight,
                }
            } else {
                let total = summary.frequencies.values().sum::<usize>() as f64;
                Plan::Frequency {
                    frequencies: summary
                        .frequencies
                        .iter()
                        .map(|(level, &count)| (level.clone(), count as f64 / total))
                        .collect(),
                    mode: summary.mode.clone(),
                }
            }
        }
    };

    Ok(AttributePlan {
        attribute: &profile.name,
        plan,
    })
}

fn rank_scale(records: &RecordSet, attribute: &str) -> Option<RankScale> {
    let column = records.continuous_column(attribute);
    let present: Vec<f64> = column.iter().flatten().copied().collect();
    let ranking = average_ranks(&present);
    let spread = sample_std(&ranking.ranks)?;
    if spread <= 0.0 {
        return None;
    }

    let mut ranks = ranking.ranks.into_iter();
    let by_record = column
        .iter()
        .map(|value| value.and_then(|_| ranks.next()))
        .collect();
    Some(RankScale {
        by_record,
        center: (present.len() as f64 + 1.0) / 2.0,
        spread,
    })
}

fn build_columns(plans: &[AttributePlan<'_>]) -> Vec<FeatureColumn> {
    let mut columns = vec![];
    for plan in plans {
        match &plan.plan {
            Plan::Continuous { mean, std, ranks } => columns.push(FeatureColumn {
                name: plan.attribute.to_string(),
                attribute: plan.attribute.to_string(),
                encoding: if ranks.is_some() {
                    ColumnEncoding::RankZScore
                } else {
                    ColumnEncoding::ZScore {
                        mean: *mean,
                        std: *std,
                    }
                },
            }),
            Plan::OneHot { levels, weight, .. } => {
                columns.extend(levels.iter().map(|level| FeatureColumn {
                    name: format!("{}={level}", plan.attribute),
                    attribute: plan.attribute.to_string(),
                    encoding: ColumnEncoding::OneHot {
                        level: level.clone(),
                        weight: *weight,
                    },
                }))
            }
            Plan::Frequency { .. } => columns.push(FeatureColumn {
                name: format!("{}#frequency", plan.attribute),
                attribute: plan.attribute.to_string(),
                encoding: ColumnEncoding::Frequency,
            }),
        }
    }
    columns
}

fn encode_value(
    plan: &AttributePlan<'_>,
    record_index: usize,
    records: &RecordSet,
    out: &mut Vec<f64>,
) {
    let record = &records.records()[record_index];
    match &plan.plan {
        Plan::Continuous { mean, std, ranks } => match ranks {
            Some(scale) => {
                let rank = scale.by_record[record_index].unwrap_or(scale.center);
                out.push((rank - scale.center) / scale.spread);
            }
            None => {
                let value = record.continuous(plan.attribute).unwrap_or(*mean);
                out.push((value - mean) / std);
            }
        },
        Plan::OneHot {
            levels,
            mode,
            weight,
        } => {
            let value = record.categorical(plan.attribute).unwrap_or(mode);
            out.extend(
                levels
                    .iter()
                    .map(|level| if level == value { *weight } else { 0.0 }),
            );
        }
        Plan::Frequency { frequencies, mode } => {
            let value = record.categorical(plan.attribute).unwrap_or(mode);
            out.push(frequencies.get(value).copied().unwrap_or(0.0));
        }
    }
}
