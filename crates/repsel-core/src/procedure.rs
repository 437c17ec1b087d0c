// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// What an analysis request is trying to establish.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    Correlation,
    GroupComparison,
    CategoricalAssociation,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correlation => "correlation",
            Self::GroupComparison => "group_comparison",
            Self::CategoricalAssociation => "categorical_association",
        }
    }
}

/// Concrete statistical procedure chosen for an intent.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Procedure {
    Pearson,
    Spearman,
    OneWayAnova,
    KruskalWallis,
    ChiSquare,
    FisherExact,
    /// Fold sparse categories together, then chi-square (or Fisher once 2x2).
    MergeCategories,
}

impl Procedure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pearson => "pearson",
            Self::Spearman => "spearman",
            Self::OneWayAnova => "one_way_anova",
            Self::KruskalWallis => "kruskal_wallis",
            Self::ChiSquare => "chi_square",
            Self::FisherExact => "fisher_exact",
            Self::MergeCategories => "merge_categories",
        }
    }

    pub fn intent(self) -> Intent {
        match self {
            Self::Pearson | Self::Spearman => Intent::Correlation,
            Self::OneWayAnova | Self::KruskalWallis => Intent::GroupComparison,
            Self::ChiSquare | Self::FisherExact | Self::MergeCategories => {
                Intent::CategoricalAssociation
            }
        }
    }

    pub fn is_parametric(self) -> bool {
        matches!(self, Self::Pearson | Self::OneWayAnova | Self::ChiSquare)
    }
}

#[cfg(test)]
mod tests {
    use super::{Intent, Procedure};

    #[test]
    fn procedures_belong_to_their_intent() {
        assert_eq!(Procedure::Spearman.intent(), Intent::Correlation);
        assert_eq!(Procedure::KruskalWallis.intent(), Intent::GroupComparison);
        assert_eq!(
            Procedure::MergeCategories.intent(),
            Intent::CategoricalAssociation
        );
        assert!(Procedure::OneWayAnova.is_parametric());
        assert!(!Procedure::FisherExact.is_parametric());
    }
}
