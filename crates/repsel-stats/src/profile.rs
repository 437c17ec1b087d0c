// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::descriptive::{mean, quantile_sorted, sample_std};
use repsel_core::{AttributeKind, RecordSet};
use std::collections::BTreeMap;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousSummary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct CategoricalSummary {
    pub frequencies: BTreeMap<String, usize>,
    /// Most frequent level; ties resolve to the lexicographically smallest.
    pub mode: String,
}

impl CategoricalSummary {
    pub fn distinct(&self) -> usize {
        self.frequencies.len()
    }
}

#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeSummary {
    Continuous(ContinuousSummary),
    Categorical(CategoricalSummary),
}

/// Completeness and summary statistics of one attribute over one run's records.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeProfile {
    pub name: String,
    pub kind: AttributeKind,
    pub present: usize,
    pub absent: usize,
    /// `None` when the attribute has no present values.
    pub summary: Option<AttributeSummary>,
}

impl AttributeProfile {
    pub fn presence_rate(&self) -> f64 {
        let total = self.present + self.absent;
        if total == 0 {
            0.0
        } else {
            self.present as f64 / total as f64
        }
    }

    pub fn continuous(&self) -> Option<&ContinuousSummary> {
        match &self.summary {
            Some(AttributeSummary::Continuous(summary)) => Some(summary),
            _ => None,
        }
    }

    pub fn categorical(&self) -> Option<&CategoricalSummary> {
        match &self.summary {
            Some(AttributeSummary::Categorical(summary)) => Some(summary),
            _ => None,
        }
    }
}

/// Profiles every attribute in the record schema, ordered by name.
pub fn profile_records(records: &RecordSet) -> Vec<AttributeProfile> {
    let profiles: Vec<AttributeProfile> = records
        .schema()
        .iter()
        .map(|(name, kind)| profile_attribute(records, name, *kind))
        .collect();
    tracing::debug!(
        records = records.len(),
        attributes = profiles.len(),
        "profiled attributes"
    );
    profiles
}

/// Profiles one attribute. Absent values are excluded from statistics, never imputed.
pub fn profile_attribute(records: &RecordSet, name: &str, kind: AttributeKind) -> AttributeProfile {
    match kind {
        AttributeKind::Continuous => {
            let mut values: Vec<f64> = records
                .continuous_column(name)
                .into_iter()
                .flatten()
                .collect();
            let present = values.len();
            values.sort_by(f64::total_cmp);
            AttributeProfile {
                name: name.to_string(),
                kind,
                present,
                absent: records.len() - present,
                summary: summarize_continuous(&values).map(AttributeSummary::Continuous),
            }
        }
        AttributeKind::Categorical => {
            let mut frequencies = BTreeMap::<String, usize>::new();
            for value in records.categorical_column(name).into_iter().flatten() {
                *frequencies.entry(value.to_string()).or_default() += 1;
            }
            let present = frequencies.values().sum::<usize>();
            AttributeProfile {
                name: name.to_string(),
                kind,
                present,
                absent: records.len() - present,
                summary: summarize_categorical(frequencies).map(AttributeSummary::Categorical),
            }
        }
    }
}

fn summarize_continuous(sorted: &[f64]) -> Option<ContinuousSummary> {
    Some(ContinuousSummary {
        count: sorted.len(),
        mean: mean(sorted)?,
        std: sample_std(sorted)?,
        min: *sorted.first()?,
        q1: quantile_sorted(sorted, 0.25)?,
        median: quantile_sorted(sorted, 0.5)?,
        q3: quantile_sorted(sorted, 0.75)?,
        max: *sorted.last()?,
    })
}

fn summarize_categorical(frequencies: BTreeMap<String, usize>) -> Option<CategoricalSummary> {
    // BTreeMap iterates in ascending key order, so `>` keeps the smallest key on ties.
    let mut best: Option<(&String, usize)> = None;
    for (level, &count) in &frequencies {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((level, count));
        }
    }
    let mode = best?.0.clone();
    Some(CategoricalSummary { frequencies, mode })
}
