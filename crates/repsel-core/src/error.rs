// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Error taxonomy shared by every pipeline stage.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RepselError {
    /// Thresholds or bounds outside their valid range. Raised before any computation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Malformed or inconsistent records and arguments.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A statistical test was asked to run on fewer observations than it supports.
    #[error("insufficient sample for {context}: n={size}, minimum={minimum}")]
    InsufficientSample {
        context: String,
        size: usize,
        minimum: usize,
    },
    /// Fewer distinct feature vectors than clusters requested.
    #[error(
        "degenerate feature space: requested {requested} clusters but only {distinct} distinct feature vectors"
    )]
    DegenerateFeatureSpace { requested: usize, distinct: usize },
    /// A statistic could not be computed even after the non-parametric fallback.
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    #[error("cancelled")]
    Cancelled,
}

impl RepselError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn insufficient_sample(context: impl Into<String>, size: usize, minimum: usize) -> Self {
        Self::InsufficientSample {
            context: context.into(),
            size,
            minimum,
        }
    }

    pub fn degenerate_feature_space(requested: usize, distinct: usize) -> Self {
        Self::DegenerateFeatureSpace {
            requested,
            distinct,
        }
    }

    pub fn numerical_issue(msg: impl Into<String>) -> Self {
        Self::NumericalIssue(msg.into())
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Stable machine-readable code used in structured error output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientSample { .. } => "insufficient_sample",
            Self::DegenerateFeatureSpace { .. } => "degenerate_feature_space",
            Self::NumericalIssue(_) => "numerical_issue",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RepselError;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            RepselError::invalid_configuration("significance must be in (0, 1); got 1.5")
                .to_string(),
            "invalid configuration: significance must be in (0, 1); got 1.5"
        );
        assert_eq!(
            RepselError::insufficient_sample("'EchoTime' group 'GE'", 2, 3).to_string(),
            "insufficient sample for 'EchoTime' group 'GE': n=2, minimum=3"
        );
        assert_eq!(
            RepselError::degenerate_feature_space(4, 2).to_string(),
            "degenerate feature space: requested 4 clusters but only 2 distinct feature vectors"
        );
        assert_eq!(RepselError::cancelled().to_string(), "cancelled");
    }

    #[test]
    fn codes_cover_every_variant() {
        let cases = [
            (RepselError::invalid_configuration("x"), "invalid_configuration"),
            (RepselError::invalid_input("x"), "invalid_input"),
            (RepselError::insufficient_sample("x", 1, 3), "insufficient_sample"),
            (RepselError::degenerate_feature_space(3, 1), "degenerate_feature_space"),
            (RepselError::numerical_issue("x"), "numerical_issue"),
            (RepselError::cancelled(), "cancelled"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }
}
