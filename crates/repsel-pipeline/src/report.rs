// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use repsel_cluster::{
    ClusterAssignment, ClusterCountReport, ClusterProfile, FeatureColumn, RepresentativeSet,
};
use repsel_core::{RunConfig, RunMetadata};
use repsel_stats::{AssociationOutcome, AssumptionResult, AttributeProfile, CorrelationMatrix};
use std::collections::BTreeMap;

/// Outcome of testing one attribute against the provenance grouping.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct VendorTest {
    pub attribute: String,
    pub outcome: Option<AssociationOutcome>,
    /// Why no outcome was produced, e.g. a single vendor present.
    pub skipped: Option<String>,
}

impl VendorTest {
    pub fn is_skipped(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Everything one run produced, in stage order.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub config: RunConfig,
    pub profiles: Vec<AttributeProfile>,
    /// Provenance-grouped assumption results per continuous attribute.
    pub assumptions: BTreeMap<String, Vec<AssumptionResult>>,
    pub correlations: CorrelationMatrix,
    pub vendor_comparisons: Vec<VendorTest>,
    pub vendor_associations: Vec<VendorTest>,
    pub feature_columns: Vec<FeatureColumn>,
    pub excluded_series: Vec<String>,
    pub cluster_count: ClusterCountReport,
    pub assignments: Vec<ClusterAssignment>,
    pub clusters: Vec<ClusterProfile>,
    pub representatives: RepresentativeSet,
    pub metadata: RunMetadata,
}

impl RunReport {
    pub fn selected_k(&self) -> usize {
        self.cluster_count.selected_k
    }

    pub fn cluster_of(&self, series_id: &str) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| a.series_id == series_id)
            .map(|a| a.cluster)
    }

    pub fn representative_ids(&self) -> Vec<&str> {
        self.representatives.series_ids()
    }
}
