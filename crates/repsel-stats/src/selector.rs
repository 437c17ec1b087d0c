// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::assumptions::AssumptionResult;
use crate::contingency::{ExpectedCountSummary, MIN_ADEQUATE_FRACTION};
use repsel_core::{Intent, Procedure, RepselError};

/// Evidence the selector decides from.
#[derive(Clone, Copy, Debug)]
pub enum SelectionEvidence<'a> {
    /// Assumption results for every sample involved (correlation, group comparison).
    Assumptions(&'a [AssumptionResult]),
    /// Expected-count adequacy of a contingency table (categorical association).
    ExpectedCounts(ExpectedCountSummary),
}

/// A chosen procedure with the reasons it was chosen.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub procedure: Procedure,
    pub assumptions_hold: bool,
    pub rationale: Vec<String>,
}

/// Maps an analysis intent plus assumption evidence to a procedure.
///
/// Inconclusive verdicts count as violated. An empty assumption slice is treated the
/// same way, so parametric procedures are never chosen without evidence.
pub fn select_procedure(
    intent: Intent,
    evidence: &SelectionEvidence<'_>,
) -> Result<Selection, RepselError> {
    match (intent, evidence) {
        (Intent::Correlation, SelectionEvidence::Assumptions(results)) => {
            let mut rationale = vec![];
            let normal = all_hold(results, &mut rationale, |r| r.is_normal(), "normal");
            Ok(if normal {
                Selection {
                    procedure: Procedure::Pearson,
                    assumptions_hold: true,
                    rationale: vec!["all samples normal".to_string()],
                }
            } else {
                Selection {
                    procedure: Procedure::Spearman,
                    assumptions_hold: false,
                    rationale,
                }
            })
        }
        (Intent::GroupComparison, SelectionEvidence::Assumptions(results)) => {
            let mut rationale = vec![];
            let normal = all_hold(results, &mut rationale, |r| r.is_normal(), "normal");
            let equal_variance = all_hold(
                results,
                &mut rationale,
                |r| r.is_homoscedastic(),
                "homoscedastic",
            );
            Ok(if normal && equal_variance {
                Selection {
                    procedure: Procedure::OneWayAnova,
                    assumptions_hold: true,
                    rationale: vec!["all groups normal with equal variances".to_string()],
                }
            } else {
                Selection {
                    procedure: Procedure::KruskalWallis,
                    assumptions_hold: false,
                    rationale,
                }
            })
        }
        (Intent::CategoricalAssociation, SelectionEvidence::ExpectedCounts(summary)) => {
            let adequacy = format!(
                "{}/{} expected cells >= 5 ({:.1}%, need {:.0}%)",
                summary.cells_at_least_five,
                summary.cells,
                summary.fraction() * 100.0,
                MIN_ADEQUATE_FRACTION * 100.0
            );
            Ok(if summary.satisfies_chi_square() {
                Selection {
                    procedure: Procedure::ChiSquare,
                    assumptions_hold: true,
                    rationale: vec![adequacy],
                }
            } else if summary.is_two_by_two() {
                Selection {
                    procedure: Procedure::FisherExact,
                    assumptions_hold: false,
                    rationale: vec![adequacy, "2x2 table: exact test".to_string()],
                }
            } else {
                Selection {
                    procedure: Procedure::MergeCategories,
                    assumptions_hold: false,
                    rationale: vec![
                        adequacy,
                        format!("{}x{} table: merge sparse categories", summary.rows, summary.cols),
                    ],
                }
            })
        }
        (intent, _) => Err(RepselError::invalid_input(format!(
            "evidence does not match intent '{}'",
            intent.as_str()
        ))),
    }
}

fn all_hold(
    results: &[AssumptionResult],
    rationale: &mut Vec<String>,
    predicate: impl Fn(&AssumptionResult) -> bool,
    property: &str,
) -> bool {
    if results.is_empty() {
        rationale.push(format!("no evidence that samples are {property}"));
        return false;
    }
    let mut ok = true;
    for result in results.iter().filter(|r| !predicate(r)) {
        ok = false;
        let scope = match &result.group {
            Some(group) => format!("{}[{group}]", result.attribute),
            None => result.attribute.clone(),
        };
        rationale.push(format!("{scope} not {property}"));
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::{SelectionEvidence, select_procedure};
    use crate::assumptions::{
        AssumptionResult, InconclusiveReason, TestKind, TestOutcome, Verdict,
    };
    use crate::contingency::ExpectedCountSummary;
    use repsel_core::{Intent, Procedure};

    fn verdict(p_value: f64) -> Verdict {
        Verdict::decide(
            TestOutcome {
                test: TestKind::ShapiroWilk,
                statistic: 0.9,
                p_value,
                n: 30,
            },
            0.05,
        )
    }

    fn result(attribute: &str, normal_p: f64, homo_p: Option<f64>) -> AssumptionResult {
        AssumptionResult {
            attribute: attribute.to_string(),
            group: None,
            normality: verdict(normal_p),
            homoscedasticity: homo_p.map(verdict),
        }
    }

    fn summary(cells: usize, at_least_five: usize, rows: usize, cols: usize) -> ExpectedCountSummary {
        ExpectedCountSummary {
            rows,
            cols,
            cells,
            cells_at_least_five: at_least_five,
            min_expected: 1.0,
        }
    }

    #[test]
    fn correlation_requires_normality_of_both_samples() {
        let both = [result("a", 0.4, None), result("b", 0.3, None)];
        let selection = select_procedure(Intent::Correlation, &SelectionEvidence::Assumptions(&both))
            .expect("selection");
        assert_eq!(selection.procedure, Procedure::Pearson);
        assert!(selection.assumptions_hold);

        let one_bad = [result("a", 0.4, None), result("b", 0.01, None)];
        let selection =
            select_procedure(Intent::Correlation, &SelectionEvidence::Assumptions(&one_bad))
                .expect("selection");
        assert_eq!(selection.procedure, Procedure::Spearman);
        assert_eq!(selection.rationale, vec!["b not normal".to_string()]);
    }

    #[test]
    fn group_comparison_needs_normality_and_equal_variance() {
        let good = [result("x", 0.5, Some(0.5))];
        let selection =
            select_procedure(Intent::GroupComparison, &SelectionEvidence::Assumptions(&good))
                .expect("selection");
        assert_eq!(selection.procedure, Procedure::OneWayAnova);

        let unequal = [result("x", 0.5, Some(0.001))];
        let selection =
            select_procedure(Intent::GroupComparison, &SelectionEvidence::Assumptions(&unequal))
                .expect("selection");
        assert_eq!(selection.procedure, Procedure::KruskalWallis);

        let untested = [result("x", 0.5, None)];
        let selection =
            select_procedure(Intent::GroupComparison, &SelectionEvidence::Assumptions(&untested))
                .expect("selection");
        assert_eq!(selection.procedure, Procedure::KruskalWallis);
    }

    #[test]
    fn inconclusive_and_missing_evidence_select_nonparametric() {
        let inconclusive = [AssumptionResult {
            attribute: "a".into(),
            group: Some("TOSHIBA".into()),
            normality: Verdict::Inconclusive(InconclusiveReason::InsufficientSample {
                size: 2,
                minimum: 3,
            }),
            homoscedasticity: None,
        }];
        let selection =
            select_procedure(Intent::Correlation, &SelectionEvidence::Assumptions(&inconclusive))
                .expect("selection");
        assert_eq!(selection.procedure, Procedure::Spearman);
        assert_eq!(selection.rationale, vec!["a[TOSHIBA] not normal".to_string()]);

        let selection = select_procedure(Intent::Correlation, &SelectionEvidence::Assumptions(&[]))
            .expect("selection");
        assert_eq!(selection.procedure, Procedure::Spearman);
    }

    #[test]
    fn categorical_association_applies_eighty_percent_rule() {
        let evidence = SelectionEvidence::ExpectedCounts(summary(10, 8, 2, 5));
        let selection =
            select_procedure(Intent::CategoricalAssociation, &evidence).expect("selection");
        assert_eq!(selection.procedure, Procedure::ChiSquare);

        // 70% adequate.
        let evidence = SelectionEvidence::ExpectedCounts(summary(10, 7, 2, 5));
        let selection =
            select_procedure(Intent::CategoricalAssociation, &evidence).expect("selection");
        assert_eq!(selection.procedure, Procedure::MergeCategories);
        assert!(!selection.assumptions_hold);

        let evidence = SelectionEvidence::ExpectedCounts(summary(4, 3, 2, 2));
        let selection =
            select_procedure(Intent::CategoricalAssociation, &evidence).expect("selection");
        assert_eq!(selection.procedure, Procedure::FisherExact);
    }

    #[test]
    fn mismatched_evidence_is_rejected() {
        let evidence = SelectionEvidence::ExpectedCounts(summary(4, 4, 2, 2));
        let err = select_procedure(Intent::Correlation, &evidence).expect_err("mismatch");
        assert_eq!(err.code(), "invalid_input");
    }
}
