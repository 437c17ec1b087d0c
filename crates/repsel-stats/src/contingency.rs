// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use repsel_core::RepselError;
use std::collections::BTreeMap;

/// Minimum expected count a cell needs for the chi-square approximation.
pub const MIN_EXPECTED_COUNT: f64 = 5.0;
/// Share of cells that must reach [`MIN_EXPECTED_COUNT`].
pub const MIN_ADEQUATE_FRACTION: f64 = 0.80;

/// Axis of a contingency table.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Row,
    Column,
}

/// Labelled two-way table of observed counts.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ContingencyTable {
    row_labels: Vec<String>,
    col_labels: Vec<String>,
    counts: Vec<Vec<u64>>,
}

impl ContingencyTable {
    pub fn new(
        row_labels: Vec<String>,
        col_labels: Vec<String>,
        counts: Vec<Vec<u64>>,
    ) -> Result<Self, RepselError> {
        if counts.len() != row_labels.len() {
            return Err(RepselError::invalid_input(format!(
                "contingency table has {} rows but {} row labels",
                counts.len(),
                row_labels.len()
            )));
        }
        if let Some(row) = counts.iter().find(|row| row.len() != col_labels.len()) {
            return Err(RepselError::invalid_input(format!(
                "contingency row has {} cells but {} column labels",
                row.len(),
                col_labels.len()
            )));
        }
        Ok(Self {
            row_labels,
            col_labels,
            counts,
        })
    }

    /// Cross-tabulates paired category labels; labels are sorted on both axes.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut tally = BTreeMap::<(&str, &str), u64>::new();
        let mut rows = BTreeMap::<&str, usize>::new();
        let mut cols = BTreeMap::<&str, usize>::new();
        for (row, col) in pairs {
            *tally.entry((row, col)).or_default() += 1;
            rows.insert(row, 0);
            cols.insert(col, 0);
        }
        for (index, slot) in rows.values_mut().enumerate() {
            *slot = index;
        }
        for (index, slot) in cols.values_mut().enumerate() {
            *slot = index;
        }

        let mut counts = vec![vec![0; cols.len()]; rows.len()];
        for ((row, col), count) in tally {
            counts[rows[row]][cols[col]] = count;
        }
        Self {
            row_labels: rows.keys().map(|s| s.to_string()).collect(),
            col_labels: cols.keys().map(|s| s.to_string()).collect(),
            counts,
        }
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn col_labels(&self) -> &[String] {
        &self.col_labels
    }

    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn rows(&self) -> usize {
        self.counts.len()
    }

    pub fn cols(&self) -> usize {
        self.col_labels.len()
    }

    pub fn is_two_by_two(&self) -> bool {
        self.rows() == 2 && self.cols() == 2
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn col_totals(&self) -> Vec<u64> {
        (0..self.cols())
            .map(|j| self.counts.iter().map(|row| row[j]).sum())
            .collect()
    }

    /// Expected counts under independence: row total * column total / grand total.
    pub fn expected(&self) -> Vec<Vec<f64>> {
        let total = self.total() as f64;
        let row_totals = self.row_totals();
        let col_totals = self.col_totals();
        row_totals
            .iter()
            .map(|&r| {
                col_totals
                    .iter()
                    .map(|&c| {
                        if total == 0.0 {
                            0.0
                        } else {
                            r as f64 * c as f64 / total
                        }
                    })
                    .collect()
            })
            .collect()
    }

    pub fn expected_summary(&self) -> ExpectedCountSummary {
        ExpectedCountSummary::from_expected(&self.expected())
    }

    /// Removes rows and columns whose marginal total is zero.
    pub fn drop_empty(&self) -> Self {
        let row_totals = self.row_totals();
        let col_totals = self.col_totals();
        let keep_cols: Vec<usize> = (0..self.cols()).filter(|&j| col_totals[j] > 0).collect();

        let mut row_labels = vec![];
        let mut counts = vec![];
        for (i, row) in self.counts.iter().enumerate() {
            if row_totals[i] == 0 {
                continue;
            }
            row_labels.push(self.row_labels[i].clone());
            counts.push(keep_cols.iter().map(|&j| row[j]).collect());
        }
        Self {
            row_labels,
            col_labels: keep_cols.iter().map(|&j| self.col_labels[j].clone()).collect(),
            counts,
        }
    }

    /// Folds category `from` into `into` on `axis`; the merged label joins both with `+`.
    pub fn merge(&self, axis: Axis, from: usize, into: usize) -> Result<Self, RepselError> {
        let len = match axis {
            Axis::Row => self.rows(),
            Axis::Column => self.cols(),
        };
        if from >= len || into >= len || from == into {
            return Err(RepselError::invalid_input(format!(
                "cannot merge {axis:?} {from} into {into} on an axis of length {len}"
            )));
        }

        let mut merged = self.clone();
        match axis {
            Axis::Row => {
                let moved = merged.counts.remove(from);
                let label = merged.row_labels.remove(from);
                let target = if from < into { into - 1 } else { into };
                for (cell, add) in merged.counts[target].iter_mut().zip(moved) {
                    *cell += add;
                }
                merged.row_labels[target] = format!("{}+{label}", merged.row_labels[target]);
            }
            Axis::Column => {
                let target = if from < into { into - 1 } else { into };
                for row in &mut merged.counts {
                    let moved = row.remove(from);
                    row[target] += moved;
                }
                let label = merged.col_labels.remove(from);
                merged.col_labels[target] = format!("{}+{label}", merged.col_labels[target]);
            }
        }
        Ok(merged)
    }
}

/// How many expected cells clear the chi-square adequacy threshold.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpectedCountSummary {
    pub rows: usize,
    pub cols: usize,
    pub cells: usize,
    pub cells_at_least_five: usize,
    pub min_expected: f64,
}

impl ExpectedCountSummary {
    pub fn from_expected(expected: &[Vec<f64>]) -> Self {
        let rows = expected.len();
        let cols = expected.first().map_or(0, Vec::len);
        let cells = expected.iter().map(Vec::len).sum();
        let cells_at_least_five = expected
            .iter()
            .flatten()
            .filter(|&&e| e >= MIN_EXPECTED_COUNT)
            .count();
        let min_expected = expected
            .iter()
            .flatten()
            .copied()
            .fold(f64::INFINITY, f64::min);
        Self {
            rows,
            cols,
            cells,
            cells_at_least_five,
            min_expected: if cells == 0 { 0.0 } else { min_expected },
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.cells == 0 {
            0.0
        } else {
            self.cells_at_least_five as f64 / self.cells as f64
        }
    }

    pub fn satisfies_chi_square(&self) -> bool {
        self.cells > 0 && self.fraction() >= MIN_ADEQUATE_FRACTION
    }

    pub fn is_two_by_two(&self) -> bool {
        self.rows == 2 && self.cols == 2
    }
}

#[cfg(test)]
mod tests {
    use super::{Axis, ContingencyTable, ExpectedCountSummary};

    fn table() -> ContingencyTable {
        ContingencyTable::new(
            vec!["GE".into(), "PHILIPS".into(), "SIEMENS".into()],
            vec!["CT".into(), "MR".into()],
            vec![vec![10, 20], vec![2, 1], vec![30, 40]],
        )
        .expect("valid table")
    }

    #[test]
    fn from_pairs_sorts_labels_and_counts() {
        let t = ContingencyTable::from_pairs([("b", "y"), ("a", "x"), ("b", "x"), ("b", "y")]);
        assert_eq!(t.row_labels(), ["a", "b"]);
        assert_eq!(t.col_labels(), ["x", "y"]);
        assert_eq!(t.counts(), [vec![1, 0], vec![1, 2]]);
        assert_eq!(t.total(), 4);
    }

    #[test]
    fn expected_counts_follow_margins() {
        let t = table();
        let expected = t.expected();
        assert_eq!(t.total(), 103);
        let e00 = 30.0 * 42.0 / 103.0;
        assert!((expected[0][0] - e00).abs() < 1e-12);
        let summary = t.expected_summary();
        assert_eq!(summary.cells, 6);
        assert_eq!(summary.cells_at_least_five, 4);
        assert!(!summary.satisfies_chi_square());
    }

    #[test]
    fn merge_folds_counts_and_labels() {
        let merged = table().merge(Axis::Row, 1, 0).expect("valid merge");
        assert_eq!(merged.row_labels(), ["GE+PHILIPS", "SIEMENS"]);
        assert_eq!(merged.counts(), [vec![12, 21], vec![30, 40]]);

        let merged = table().merge(Axis::Column, 0, 1).expect("valid merge");
        assert_eq!(merged.col_labels(), ["MR+CT"]);
        assert_eq!(merged.counts(), [vec![30], vec![3], vec![70]]);

        assert!(table().merge(Axis::Row, 0, 0).is_err());
        assert!(table().merge(Axis::Column, 2, 0).is_err());
    }

    #[test]
    fn drop_empty_removes_zero_margins() {
        let t = ContingencyTable::new(
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into(), "z".into()],
            vec![vec![1, 0, 3], vec![0, 0, 0]],
        )
        .expect("valid table");
        let dropped = t.drop_empty();
        assert_eq!(dropped.row_labels(), ["a"]);
        assert_eq!(dropped.col_labels(), ["x", "z"]);
        assert_eq!(dropped.counts(), [vec![1, 3]]);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let err = ContingencyTable::new(vec!["a".into()], vec!["x".into()], vec![vec![1, 2]])
            .expect_err("ragged row");
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn empty_summary_never_satisfies_chi_square() {
        let summary = ExpectedCountSummary::from_expected(&[]);
        assert_eq!(summary.fraction(), 0.0);
        assert!(!summary.satisfies_chi_square());
    }
}
