// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::assumptions::{AssumptionResult, Grouping, group_values};
use crate::contingency::{Axis, ContingencyTable};
use crate::descriptive::average_ranks;
use crate::selector::{SelectionEvidence, select_procedure};
use crate::special::{chi_square_sf, f_sf, ln_binomial, student_t_two_sided};
use repsel_core::{AttributeKind, FallbackRecord, Intent, Procedure, RecordSet, RepselError};
use std::collections::BTreeMap;

/// Relative tolerance when comparing hypergeometric probabilities in Fisher's test.
const FISHER_RELATIVE_TOLERANCE: f64 = 1.0e-7;
const MIN_CORRELATION_PAIRS: usize = 3;

#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectMeasure {
    PearsonR,
    SpearmanRho,
    EtaSquared,
    /// Rank-based eta squared derived from the Kruskal-Wallis H.
    EtaSquaredH,
    /// Cramér's V; equals phi on a 2x2 table.
    CramersV,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectSize {
    pub measure: EffectMeasure,
    pub value: f64,
}

/// Result of one association or difference test.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AssociationOutcome {
    pub intent: Intent,
    /// Procedure the caller asked for.
    pub requested: Procedure,
    /// Procedure whose statistic is reported.
    pub procedure: Procedure,
    pub statistic: f64,
    pub p_value: f64,
    pub effect_size: EffectSize,
    pub n: usize,
    pub fallback: Option<FallbackRecord>,
    pub notes: Vec<String>,
}

struct Computed {
    procedure: Procedure,
    statistic: f64,
    p_value: f64,
    effect_size: EffectSize,
    n: usize,
}

fn ensure_intent(requested: Procedure, intent: Intent) -> Result<(), RepselError> {
    if requested.intent() == intent {
        Ok(())
    } else {
        Err(RepselError::invalid_input(format!(
            "procedure '{}' does not serve intent '{}'",
            requested.as_str(),
            intent.as_str()
        )))
    }
}

fn finish(
    context: &str,
    intent: Intent,
    requested: Procedure,
    computed: Computed,
    fallback_reason: Option<String>,
    notes: Vec<String>,
) -> AssociationOutcome {
    let fallback = fallback_reason.map(|reason| FallbackRecord {
        context: context.to_string(),
        requested,
        applied: computed.procedure,
        reason,
    });
    AssociationOutcome {
        intent,
        requested,
        procedure: computed.procedure,
        statistic: computed.statistic,
        p_value: computed.p_value,
        effect_size: computed.effect_size,
        n: computed.n,
        fallback,
        notes,
    }
}

/// Correlation between two paired columns over pairwise-complete observations.
///
/// Pearson falls back to Spearman when the coefficient cannot be computed.
pub fn correlate(
    context: &str,
    x: &[Option<f64>],
    y: &[Option<f64>],
    requested: Procedure,
) -> Result<AssociationOutcome, RepselError> {
    ensure_intent(requested, Intent::Correlation)?;
    if x.len() != y.len() {
        return Err(RepselError::invalid_input(format!(
            "correlation inputs differ in length: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .unzip();
    if xs.len() < MIN_CORRELATION_PAIRS {
        return Err(RepselError::insufficient_sample(
            format!("{context}: complete pairs"),
            xs.len(),
            MIN_CORRELATION_PAIRS,
        ));
    }

    match requested {
        Procedure::Pearson => match pearson(&xs, &ys) {
            Ok(computed) => Ok(finish(context, Intent::Correlation, requested, computed, None, vec![])),
            Err(err) => {
                let computed = spearman(&xs, &ys)?;
                Ok(finish(
                    context,
                    Intent::Correlation,
                    requested,
                    computed,
                    Some(err.to_string()),
                    vec![],
                ))
            }
        },
        _ => {
            let computed = spearman(&xs, &ys)?;
            Ok(finish(context, Intent::Correlation, requested, computed, None, vec![]))
        }
    }
}

fn pearson_r(xs: &[f64], ys: &[f64]) -> Result<f64, RepselError> {
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return Err(RepselError::numerical_issue(
            "correlation is undefined for a zero-variance input",
        ));
    }
    if !(sxx.is_finite() && syy.is_finite() && sxy.is_finite()) {
        return Err(RepselError::numerical_issue(
            "correlation sums of squares overflow",
        ));
    }
    let r = sxy / (sxx.sqrt() * syy.sqrt());
    if !r.is_finite() {
        return Err(RepselError::numerical_issue(format!(
            "correlation coefficient is not finite ({r})"
        )));
    }
    Ok(r.clamp(-1.0, 1.0))
}

fn correlation_p_value(r: f64, n: usize) -> f64 {
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return 0.0;
    }
    student_t_two_sided(r * (df / denom).sqrt(), df)
}

fn pearson(xs: &[f64], ys: &[f64]) -> Result<Computed, RepselError> {
    let r = pearson_r(xs, ys)?;
    Ok(Computed {
        procedure: Procedure::Pearson,
        statistic: r,
        p_value: correlation_p_value(r, xs.len()),
        effect_size: EffectSize {
            measure: EffectMeasure::PearsonR,
            value: r,
        },
        n: xs.len(),
    })
}

fn spearman(xs: &[f64], ys: &[f64]) -> Result<Computed, RepselError> {
    let rx = average_ranks(xs).ranks;
    let ry = average_ranks(ys).ranks;
    let rho = pearson_r(&rx, &ry)?;
    Ok(Computed {
        procedure: Procedure::Spearman,
        statistic: rho,
        p_value: correlation_p_value(rho, xs.len()),
        effect_size: EffectSize {
            measure: EffectMeasure::SpearmanRho,
            value: rho,
        },
        n: xs.len(),
    })
}

/// Difference test across independent groups.
///
/// ANOVA with zero within-group variance falls back to Kruskal-Wallis.
pub fn compare_groups(
    context: &str,
    groups: &[&[f64]],
    requested: Procedure,
) -> Result<AssociationOutcome, RepselError> {
    ensure_intent(requested, Intent::GroupComparison)?;
    if groups.len() < 2 {
        return Err(RepselError::insufficient_sample(
            format!("{context}: groups"),
            groups.len(),
            2,
        ));
    }
    if groups.iter().any(|g| g.is_empty()) {
        return Err(RepselError::invalid_input(format!(
            "{context}: group comparison received an empty group"
        )));
    }
    let total: usize = groups.iter().map(|g| g.len()).sum();
    if total <= groups.len() {
        return Err(RepselError::insufficient_sample(
            format!("{context}: observations"),
            total,
            groups.len() + 1,
        ));
    }

    match requested {
        Procedure::OneWayAnova => match one_way_anova(groups) {
            Ok(computed) => Ok(finish(
                context,
                Intent::GroupComparison,
                requested,
                computed,
                None,
                vec![],
            )),
            Err(err) => {
                let computed = kruskal_wallis(groups)?;
                Ok(finish(
                    context,
                    Intent::GroupComparison,
                    requested,
                    computed,
                    Some(err.to_string()),
                    vec![],
                ))
            }
        },
        _ => {
            let computed = kruskal_wallis(groups)?;
            Ok(finish(
                context,
                Intent::GroupComparison,
                requested,
                computed,
                None,
                vec![],
            ))
        }
    }
}

fn one_way_anova(groups: &[&[f64]]) -> Result<Computed, RepselError> {
    let k = groups.len();
    let n: usize = groups.iter().map(|g| g.len()).sum();
    let grand = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;

    let mut ssb = 0.0;
    let mut ssw = 0.0;
    for group in groups {
        let m = group.iter().sum::<f64>() / group.len() as f64;
        ssb += group.len() as f64 * (m - grand) * (m - grand);
        ssw += group.iter().map(|v| (v - m) * (v - m)).sum::<f64>();
    }
    if ssw <= 0.0 {
        return Err(RepselError::numerical_issue(
            "one-way ANOVA is undefined with zero within-group variance",
        ));
    }

    let d1 = (k - 1) as f64;
    let d2 = (n - k) as f64;
    let f = (ssb / d1) / (ssw / d2);
    Ok(Computed {
        procedure: Procedure::OneWayAnova,
        statistic: f,
        p_value: f_sf(f, d1, d2),
        effect_size: EffectSize {
            measure: EffectMeasure::EtaSquared,
            value: ssb / (ssb + ssw),
        },
        n,
    })
}

fn kruskal_wallis(groups: &[&[f64]]) -> Result<Computed, RepselError> {
    let k = groups.len();
    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = pooled.len();
    let nf = n as f64;
    let ranking = average_ranks(&pooled);

    let correction = 1.0 - ranking.tie_term() / (nf * nf * nf - nf);
    if correction <= 0.0 {
        return Err(RepselError::numerical_issue(
            "kruskal-wallis is undefined when every observation is tied",
        ));
    }

    let mut offset = 0;
    let mut sum = 0.0;
    for group in groups {
        let rank_sum: f64 = ranking.ranks[offset..offset + group.len()].iter().sum();
        sum += rank_sum * rank_sum / group.len() as f64;
        offset += group.len();
    }
    let h = (12.0 / (nf * (nf + 1.0)) * sum - 3.0 * (nf + 1.0)) / correction;
    let h = h.max(0.0);
    let eta = ((h - k as f64 + 1.0) / (n - k) as f64).clamp(0.0, 1.0);

    Ok(Computed {
        procedure: Procedure::KruskalWallis,
        statistic: h,
        p_value: chi_square_sf(h, (k - 1) as f64),
        effect_size: EffectSize {
            measure: EffectMeasure::EtaSquaredH,
            value: eta,
        },
        n,
    })
}

/// Association between two categorical variables.
///
/// The chi-square precondition is rechecked here; when it fails the table goes to
/// Fisher's exact test (2x2) or is merged, and the switch is recorded as a fallback.
pub fn associate_categories(
    context: &str,
    table: &ContingencyTable,
    requested: Procedure,
) -> Result<AssociationOutcome, RepselError> {
    ensure_intent(requested, Intent::CategoricalAssociation)?;
    let mut table = table.drop_empty();
    let levels = table.rows().min(table.cols());
    if levels < 2 {
        return Err(RepselError::insufficient_sample(
            format!("{context}: levels per axis"),
            levels,
            2,
        ));
    }

    let summary = table.expected_summary();
    let mut notes = vec![];
    let mut fallback_reason = None;

    let computed = match requested {
        Procedure::ChiSquare if summary.satisfies_chi_square() => chi_square(&table)?,
        Procedure::FisherExact if table.is_two_by_two() => fisher_exact(&table)?,
        Procedure::ChiSquare | Procedure::FisherExact => {
            fallback_reason = Some(if requested == Procedure::ChiSquare {
                format!(
                    "only {}/{} expected cells >= 5",
                    summary.cells_at_least_five, summary.cells
                )
            } else {
                format!("table is {}x{}, not 2x2", table.rows(), table.cols())
            });
            if table.is_two_by_two() {
                fisher_exact(&table)?
            } else {
                merge_until_adequate(&mut table, &mut notes)?
            }
        }
        _ => merge_until_adequate(&mut table, &mut notes)?,
    };

    tracing::debug!(
        context,
        requested = requested.as_str(),
        applied = computed.procedure.as_str(),
        merges = notes.len(),
        "categorical association"
    );
    let merged = !notes.is_empty();
    let mut outcome = finish(
        context,
        Intent::CategoricalAssociation,
        requested,
        computed,
        fallback_reason,
        notes,
    );
    if merged {
        if let Some(fallback) = outcome.fallback.as_mut() {
            fallback.applied = Procedure::MergeCategories;
        }
    }
    Ok(outcome)
}

fn merge_until_adequate(
    table: &mut ContingencyTable,
    notes: &mut Vec<String>,
) -> Result<Computed, RepselError> {
    loop {
        if table.expected_summary().satisfies_chi_square() {
            return chi_square(table);
        }
        if table.is_two_by_two() {
            return fisher_exact(table);
        }

        let (axis, from, into) = smallest_merge(table);
        let labels = match axis {
            Axis::Row => table.row_labels(),
            Axis::Column => table.col_labels(),
        };
        notes.push(format!(
            "merged {} '{}' into '{}'",
            match axis {
                Axis::Row => "row",
                Axis::Column => "column",
            },
            labels[from],
            labels[into]
        ));
        *table = table.merge(axis, from, into)?;
    }
}

/// Picks the smallest marginal on an axis that still has more than two levels, and the
/// next-smallest sibling on the same axis. Rows win ties.
fn smallest_merge(table: &ContingencyTable) -> (Axis, usize, usize) {
    fn two_smallest(totals: &[u64]) -> (usize, usize) {
        let mut order: Vec<usize> = (0..totals.len()).collect();
        order.sort_by_key(|&i| (totals[i], i));
        (order[0], order[1])
    }

    let row_totals = table.row_totals();
    let col_totals = table.col_totals();
    let row_candidate = (table.rows() > 2).then(|| two_smallest(&row_totals));
    let col_candidate = (table.cols() > 2).then(|| two_smallest(&col_totals));

    match (row_candidate, col_candidate) {
        (Some((rf, ri)), Some((cf, ci))) => {
            if col_totals[cf] < row_totals[rf] {
                (Axis::Column, cf, ci)
            } else {
                (Axis::Row, rf, ri)
            }
        }
        (Some((rf, ri)), None) => (Axis::Row, rf, ri),
        (None, Some((cf, ci))) => (Axis::Column, cf, ci),
        // Only reached for 2x2, which the caller handles first.
        (None, None) => (Axis::Row, 0, 1),
    }
}

fn chi_square_statistic(table: &ContingencyTable) -> f64 {
    let expected = table.expected();
    table
        .counts()
        .iter()
        .zip(&expected)
        .flat_map(|(observed, expected)| observed.iter().zip(expected))
        .filter(|(_, e)| **e > 0.0)
        .map(|(o, e)| {
            let d = *o as f64 - e;
            d * d / e
        })
        .sum()
}

fn cramers_v(chi2: f64, table: &ContingencyTable) -> f64 {
    let n = table.total() as f64;
    let min_dim = table.rows().min(table.cols());
    if n == 0.0 || min_dim < 2 {
        return 0.0;
    }
    (chi2 / (n * (min_dim - 1) as f64)).sqrt().clamp(0.0, 1.0)
}

fn chi_square(table: &ContingencyTable) -> Result<Computed, RepselError> {
    let chi2 = chi_square_statistic(table);
    let df = ((table.rows() - 1) * (table.cols() - 1)) as f64;
    Ok(Computed {
        procedure: Procedure::ChiSquare,
        statistic: chi2,
        p_value: chi_square_sf(chi2, df),
        effect_size: EffectSize {
            measure: EffectMeasure::CramersV,
            value: cramers_v(chi2, table),
        },
        n: table.total() as usize,
    })
}

/// Two-sided Fisher's exact test; the reported statistic is the sample odds ratio.
fn fisher_exact(table: &ContingencyTable) -> Result<Computed, RepselError> {
    if !table.is_two_by_two() {
        return Err(RepselError::invalid_input(format!(
            "fisher's exact test needs a 2x2 table; got {}x{}",
            table.rows(),
            table.cols()
        )));
    }
    let c = table.counts();
    let (a, b, cc, d) = (c[0][0], c[0][1], c[1][0], c[1][1]);
    let n = a + b + cc + d;
    let row1 = a + b;
    let col1 = a + cc;

    let ln_denominator = ln_binomial(n, col1);
    let ln_probability =
        |x: u64| ln_binomial(row1, x) + ln_binomial(n - row1, col1 - x) - ln_denominator;

    let lo = (row1 + col1).saturating_sub(n);
    let hi = row1.min(col1);
    let observed = ln_probability(a).exp();
    let cutoff = observed * (1.0 + FISHER_RELATIVE_TOLERANCE);
    let p_value: f64 = (lo..=hi)
        .map(|x| ln_probability(x).exp())
        .filter(|&p| p <= cutoff)
        .sum();

    let cross = (a * d) as f64;
    let off = (b * cc) as f64;
    let odds_ratio = if off == 0.0 {
        if cross == 0.0 { 1.0 } else { f64::INFINITY }
    } else {
        cross / off
    };

    Ok(Computed {
        procedure: Procedure::FisherExact,
        statistic: odds_ratio,
        p_value: p_value.clamp(0.0, 1.0),
        effect_size: EffectSize {
            measure: EffectMeasure::CramersV,
            value: cramers_v(chi_square_statistic(table), table),
        },
        n: n as usize,
    })
}

/// Overall (ungrouped) result for an attribute, if one was computed.
fn overall<'a>(
    assumptions: &'a BTreeMap<String, Vec<AssumptionResult>>,
    attribute: &str,
) -> Option<&'a AssumptionResult> {
    assumptions
        .get(attribute)?
        .iter()
        .find(|result| result.group.is_none())
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationEntry {
    pub left: String,
    pub right: String,
    pub outcome: AssociationOutcome,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedPair {
    pub left: String,
    pub right: String,
    pub reason: String,
}

/// Pairwise correlations; each pair uses the procedure the selector picks for it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrelationMatrix {
    pub attributes: Vec<String>,
    pub entries: Vec<CorrelationEntry>,
    pub skipped: Vec<SkippedPair>,
}

impl CorrelationMatrix {
    pub fn get(&self, left: &str, right: &str) -> Option<&AssociationOutcome> {
        self.entries
            .iter()
            .find(|e| (e.left == left && e.right == right) || (e.left == right && e.right == left))
            .map(|e| &e.outcome)
    }

    pub fn fallbacks(&self) -> impl Iterator<Item = &FallbackRecord> {
        self.entries.iter().filter_map(|e| e.outcome.fallback.as_ref())
    }
}

pub fn correlation_matrix(
    records: &RecordSet,
    attributes: &[&str],
    assumptions: &BTreeMap<String, Vec<AssumptionResult>>,
) -> Result<CorrelationMatrix, RepselError> {
    let mut columns = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        if records.kind_of(attribute) != Some(AttributeKind::Continuous) {
            return Err(RepselError::invalid_input(format!(
                "correlation requires continuous attribute; '{attribute}' is not"
            )));
        }
        columns.push(records.continuous_column(attribute));
    }

    let mut matrix = CorrelationMatrix {
        attributes: attributes.iter().map(|a| a.to_string()).collect(),
        ..CorrelationMatrix::default()
    };
    for i in 0..attributes.len() {
        for j in (i + 1)..attributes.len() {
            let (left, right) = (attributes[i], attributes[j]);
            let evidence: Vec<AssumptionResult> = [overall(assumptions, left), overall(assumptions, right)]
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            // Both attributes need evidence before a parametric test is allowed.
            let evidence = if evidence.len() == 2 { evidence } else { vec![] };
            let selection =
                select_procedure(Intent::Correlation, &SelectionEvidence::Assumptions(&evidence))?;

            let context = format!("{left}~{right}");
            match correlate(&context, &columns[i], &columns[j], selection.procedure) {
                Ok(outcome) => matrix.entries.push(CorrelationEntry {
                    left: left.to_string(),
                    right: right.to_string(),
                    outcome,
                }),
                Err(
                    err @ (RepselError::InsufficientSample { .. } | RepselError::NumericalIssue(_)),
                ) => matrix.skipped.push(SkippedPair {
                    left: left.to_string(),
                    right: right.to_string(),
                    reason: err.to_string(),
                }),
                Err(err) => return Err(err),
            }
        }
    }
    tracing::debug!(
        pairs = matrix.entries.len(),
        skipped = matrix.skipped.len(),
        "computed correlation matrix"
    );
    Ok(matrix)
}

/// Compares a continuous attribute across groups, choosing the procedure from the per-group
/// rows of `assumptions`.
pub fn group_comparison(
    records: &RecordSet,
    attribute: &str,
    grouping: &Grouping,
    assumptions: &[AssumptionResult],
) -> Result<AssociationOutcome, RepselError> {
    let groups = group_values(records, attribute, grouping)?;
    // The pooled row mixes groups; location shifts alone would make it non-normal.
    let per_group: Vec<AssumptionResult> = assumptions
        .iter()
        .filter(|result| result.group.is_some())
        .cloned()
        .collect();
    let selection = select_procedure(
        Intent::GroupComparison,
        &SelectionEvidence::Assumptions(&per_group),
    )?;
    let slices: Vec<&[f64]> = groups.values().map(Vec::as_slice).collect();
    compare_groups(attribute, &slices, selection.procedure)
}

/// Cross-tabulates two categorical attributes (or one against provenance) and tests them.
pub fn categorical_association(
    records: &RecordSet,
    attribute: &str,
    against: &Grouping,
) -> Result<AssociationOutcome, RepselError> {
    if records.kind_of(attribute) != Some(AttributeKind::Categorical) {
        return Err(RepselError::invalid_input(format!(
            "categorical association requires categorical attribute; '{attribute}' is not"
        )));
    }
    let pairs = records.records().iter().filter_map(|record| {
        let value = record.categorical(attribute)?;
        let other = match against {
            Grouping::Provenance => record.provenance().unwrap_or(crate::assumptions::UNKNOWN_GROUP),
            Grouping::Attribute(name) => record.categorical(name)?,
        };
        Some((other, value))
    });
    let table = ContingencyTable::from_pairs(pairs);
    let selection = select_procedure(
        Intent::CategoricalAssociation,
        &SelectionEvidence::ExpectedCounts(table.expected_summary()),
    )?;
    associate_categories(attribute, &table, selection.procedure)
}

#[cfg(test)]
mod tests {
    use super::{
        EffectMeasure, associate_categories, compare_groups, correlate, correlation_matrix,
        group_comparison,
    };
    use crate::assumptions::{Grouping, assess_attribute, assess_attributes};
    use crate::special::normal_ppf;
    use crate::contingency::ContingencyTable;
    use repsel_core::{Procedure, RecordSet, RunConfig, SeriesRecord};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tol={tol}"
        );
    }

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn pearson_matches_reference() {
        let x = some(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = some(&[2.0, 4.0, 5.0, 4.0, 5.0]);
        let outcome = correlate("x~y", &x, &y, Procedure::Pearson).expect("pearson");
        // r = 6 / sqrt(10 * 6)
        assert_close(outcome.statistic, 0.7745966692, 1e-9);
        assert_close(outcome.p_value, 0.1240, 1e-3);
        assert_eq!(outcome.effect_size.measure, EffectMeasure::PearsonR);
        assert!(outcome.fallback.is_none());
    }

    #[test]
    fn spearman_uses_pairwise_complete_ranks() {
        let x = vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)];
        let y = vec![Some(10.0), Some(20.0), Some(0.0), Some(400.0), Some(5000.0)];
        let outcome = correlate("x~y", &x, &y, Procedure::Spearman).expect("spearman");
        assert_eq!(outcome.n, 4);
        assert_close(outcome.statistic, 1.0, 1e-12);
        assert_eq!(outcome.p_value, 0.0);
    }

    #[test]
    fn pearson_overflow_falls_back_to_spearman() {
        let x = some(&[1e200, -1e200, 3e200, 2e200]);
        let y = some(&[1.0, 0.0, 3.0, 2.0]);
        let outcome = correlate("x~y", &x, &y, Procedure::Pearson).expect("fallback");
        assert_eq!(outcome.procedure, Procedure::Spearman);
        let fallback = outcome.fallback.expect("fallback recorded");
        assert_eq!(fallback.requested, Procedure::Pearson);
        assert_eq!(fallback.applied, Procedure::Spearman);
        assert_close(outcome.statistic, 1.0, 1e-12);
    }

    #[test]
    fn constant_input_fails_after_fallback() {
        let x = some(&[3.0, 3.0, 3.0, 3.0]);
        let y = some(&[1.0, 2.0, 3.0, 4.0]);
        let err = correlate("x~y", &x, &y, Procedure::Pearson).expect_err("no fallback works");
        assert_eq!(err.code(), "numerical_issue");

        let err = correlate("x~y", &some(&[1.0]), &some(&[2.0]), Procedure::Spearman)
            .expect_err("too few pairs");
        assert_eq!(err.code(), "insufficient_sample");
    }

    #[test]
    fn anova_matches_reference() {
        let a = [4.0, 5.0, 6.0];
        let b = [6.0, 7.0, 8.0];
        let c = [9.0, 10.0, 11.0];
        let outcome = compare_groups("t", &[&a, &b, &c], Procedure::OneWayAnova).expect("anova");
        // SSB = 3*(5-22/3)^2 + 3*(7-22/3)^2 + 3*(10-22/3)^2 = 38, SSW = 6
        assert_close(outcome.statistic, (38.0 / 2.0) / (6.0 / 6.0), 1e-9);
        assert_close(outcome.effect_size.value, 38.0 / 44.0, 1e-9);
        assert!(outcome.p_value < 0.01);
    }

    #[test]
    fn anova_without_within_variance_falls_back_to_kruskal_wallis() {
        let a = [1.0, 1.0, 1.0];
        let b = [2.0, 2.0, 2.0];
        let outcome = compare_groups("t", &[&a, &b], Procedure::OneWayAnova).expect("fallback");
        assert_eq!(outcome.procedure, Procedure::KruskalWallis);
        assert!(outcome.fallback.is_some());
        // Ranks 2,2,2 and 5,5,5 with two tie groups of 3: H = 5.0
        assert_close(outcome.statistic, 5.0, 1e-9);
        assert_close(outcome.effect_size.value, (5.0 - 1.0) / 4.0, 1e-9);

        let err = compare_groups("t", &[&a, &a], Procedure::OneWayAnova)
            .expect_err("all ties cannot be tested");
        assert_eq!(err.code(), "numerical_issue");
    }

    #[test]
    fn shifted_normal_groups_use_anova_despite_bimodal_pool() {
        let n = 40;
        let records = ["GE", "SIEMENS"]
            .into_iter()
            .enumerate()
            .flat_map(|(g, vendor)| {
                (0..n).map(move |i| {
                    let z = normal_ppf((i as f64 + 0.5) / n as f64);
                    SeriesRecord::new(format!("{vendor}-{i:02}"), Some(vendor))
                        .with_continuous("EchoTime", Some(10.0 + 20.0 * g as f64 + z))
                })
            })
            .collect();
        let set = RecordSet::new(records).expect("records");
        let assumptions =
            assess_attribute(&set, "EchoTime", Some(&Grouping::Provenance), &RunConfig::default())
                .expect("assumptions");
        let pooled = assumptions
            .iter()
            .find(|r| r.group.is_none())
            .expect("pooled row");
        assert!(!pooled.is_normal());
        assert!(
            assumptions
                .iter()
                .filter(|r| r.group.is_some())
                .all(|r| r.is_normal() && r.is_homoscedastic())
        );

        let outcome = group_comparison(&set, "EchoTime", &Grouping::Provenance, &assumptions)
            .expect("comparison");
        assert_eq!(outcome.procedure, Procedure::OneWayAnova);
        assert!(outcome.fallback.is_none());
    }

    #[test]
    fn kruskal_wallis_without_ties() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let outcome = compare_groups("t", &[&a, &b], Procedure::KruskalWallis).expect("kw");
        // H = 12/(6*7) * (36/3 + 225/3) - 21 = 3.857142857
        assert_close(outcome.statistic, 27.0 / 7.0, 1e-9);
        assert_close(outcome.p_value, 0.049535, 1e-5);
    }

    #[test]
    fn chi_square_with_adequate_counts() {
        let table = ContingencyTable::new(
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into()],
            vec![vec![30, 10], vec![10, 30]],
        )
        .expect("table");
        let outcome = associate_categories("t", &table, Procedure::ChiSquare).expect("chi2");
        assert_eq!(outcome.procedure, Procedure::ChiSquare);
        assert_close(outcome.statistic, 20.0, 1e-9);
        assert_close(outcome.effect_size.value, 0.5, 1e-12);
        assert!(outcome.fallback.is_none());
    }

    #[test]
    fn chi_square_refuses_sparse_two_by_two() {
        let table = ContingencyTable::new(
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into()],
            vec![vec![3, 1], vec![1, 3]],
        )
        .expect("table");
        let outcome = associate_categories("t", &table, Procedure::ChiSquare).expect("fisher");
        assert_eq!(outcome.procedure, Procedure::FisherExact);
        // Two-sided Fisher p for [[3,1],[1,3]] is 34/70.
        assert_close(outcome.p_value, 34.0 / 70.0, 1e-9);
        assert_close(outcome.statistic, 9.0, 1e-12);
        let fallback = outcome.fallback.expect("fallback recorded");
        assert_eq!(fallback.applied, Procedure::FisherExact);
    }

    #[test]
    fn sparse_tables_merge_smallest_categories() {
        // 30% of expected cells are below 5.
        let table = ContingencyTable::new(
            vec![
                "GE".into(),
                "PHILIPS".into(),
                "SIEMENS".into(),
                "TOSHIBA".into(),
                "HITACHI".into(),
            ],
            vec!["CT".into(), "MR".into()],
            vec![vec![40, 35], vec![30, 45], vec![38, 42], vec![3, 2], vec![2, 8]],
        )
        .expect("table");
        let summary = table.expected_summary();
        assert_eq!(summary.cells - summary.cells_at_least_five, 3);

        let outcome =
            associate_categories("t", &table, Procedure::MergeCategories).expect("merge");
        assert_eq!(outcome.procedure, Procedure::ChiSquare);
        assert!(outcome.fallback.is_none());
        assert_eq!(outcome.notes, vec!["merged row 'TOSHIBA' into 'HITACHI'".to_string()]);
        assert_eq!(outcome.n, 245);

        let outcome = associate_categories("t", &table, Procedure::ChiSquare).expect("merge");
        let fallback = outcome.fallback.expect("fallback recorded");
        assert_eq!(fallback.requested, Procedure::ChiSquare);
        assert_eq!(fallback.applied, Procedure::MergeCategories);
        assert_eq!(outcome.procedure, Procedure::ChiSquare);
    }

    #[test]
    fn wrong_intent_is_rejected() {
        let err = compare_groups("t", &[&[1.0], &[2.0]], Procedure::Pearson)
            .expect_err("pearson is not a group comparison");
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn correlation_matrix_selects_per_pair() {
        let records: Vec<SeriesRecord> = (0..30)
            .map(|i| {
                let t = i as f64;
                SeriesRecord::new(format!("s{i}"), None)
                    .with_continuous("a", Some(t))
                    .with_continuous("b", Some(2.0 * t + 1.0))
                    .with_continuous("c", if i == 0 { None } else { Some(5.0) })
            })
            .collect();
        let set = RecordSet::new(records).expect("records");
        let cfg = RunConfig::default();
        let assumptions =
            assess_attributes(&set, &["a", "b", "c"], None, &cfg).expect("assumptions");
        let matrix = correlation_matrix(&set, &["a", "b", "c"], &assumptions).expect("matrix");

        let ab = matrix.get("b", "a").expect("a~b computed");
        assert_close(ab.statistic, 1.0, 1e-12);
        // Constant c cannot be correlated with anything.
        assert_eq!(matrix.skipped.len(), 2);
        assert_eq!(matrix.entries.len(), 1);
    }
}
