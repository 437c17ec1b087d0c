// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod association;
pub mod assumptions;
pub mod contingency;
pub mod descriptive;
pub mod profile;
pub mod selector;
pub mod special;

pub use association::{
    AssociationOutcome, CorrelationEntry, CorrelationMatrix, EffectMeasure, EffectSize,
    SkippedPair, associate_categories, categorical_association, compare_groups, correlate,
    correlation_matrix, group_comparison,
};
pub use assumptions::{
    AssumptionResult, Grouping, InconclusiveReason, TestKind, TestOutcome, UNKNOWN_GROUP,
    Verdict, assess_attribute, assess_attributes, dagostino_pearson, group_values, levene,
    shapiro_wilk, test_homoscedasticity, test_normality,
};
pub use contingency::{Axis, ContingencyTable, ExpectedCountSummary};
pub use profile::{
    AttributeProfile, AttributeSummary, CategoricalSummary, ContinuousSummary, profile_attribute,
    profile_records,
};
pub use selector::{Selection, SelectionEvidence, select_procedure};
