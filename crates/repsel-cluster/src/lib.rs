// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod clusters;
pub mod encode;
pub mod kmeans;
pub mod representatives;
pub mod selection;

pub use clusters::{ClusterAssignment, ClusterProfile, assign_clusters, characterize_clusters};
pub use encode::{ColumnEncoding, EncodedFeatures, FeatureColumn, FeatureVector, encode_features};
pub use kmeans::{KMeansOutcome, count_distinct, distance, kmeans, squared_distance};
pub use representatives::{
    Representative, RepresentativeSet, cluster_quotas, extract_representatives,
};
pub use selection::{
    CandidateScore, ClusterCountReport, choose_k, elbow_k, select_cluster_count, silhouette_score,
};
