// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::encode::EncodedFeatures;
use crate::kmeans::{KMeansOutcome, distance};
use repsel_core::{AttributeKind, RecordSet, RepselError};
use std::collections::BTreeMap;

/// Cluster membership of one encoded series.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterAssignment {
    pub series_id: String,
    pub record_index: usize,
    pub cluster: usize,
    /// Euclidean distance to the cluster centroid in feature space.
    pub distance: f64,
}

/// Summary of one cluster in attribute terms.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub size: usize,
    pub centroid: Vec<f64>,
    /// Mean of present values among members, per continuous attribute.
    pub continuous_means: BTreeMap<String, f64>,
    /// Most frequent present value among members, per categorical attribute.
    pub categorical_modes: BTreeMap<String, String>,
}

/// Pairs every encoded vector with its cluster and distance to centroid.
pub fn assign_clusters(
    features: &EncodedFeatures,
    clustering: &KMeansOutcome,
) -> Result<Vec<ClusterAssignment>, RepselError> {
    if features.vectors.len() != clustering.labels.len() {
        return Err(RepselError::invalid_input(format!(
            "clustering has {} labels for {} feature vectors",
            clustering.labels.len(),
            features.vectors.len()
        )));
    }

    features
        .vectors
        .iter()
        .zip(&clustering.labels)
        .map(|(vector, &cluster)| {
            let centroid = clustering.centroids.get(cluster).ok_or_else(|| {
                RepselError::invalid_input(format!(
                    "label {cluster} has no centroid (k={})",
                    clustering.k
                ))
            })?;
            Ok(ClusterAssignment {
                series_id: vector.series_id.clone(),
                record_index: vector.record_index,
                cluster,
                distance: distance(&vector.values, centroid),
            })
        })
        .collect()
}

pub fn characterize_clusters(
    records: &RecordSet,
    assignments: &[ClusterAssignment],
    clustering: &KMeansOutcome,
) -> Vec<ClusterProfile> {
    (0..clustering.k)
        .map(|cluster| {
            let members: Vec<usize> = assignments
                .iter()
                .filter(|a| a.cluster == cluster)
                .map(|a| a.record_index)
                .collect();

            let mut continuous_means = BTreeMap::new();
            let mut categorical_modes = BTreeMap::new();
            for (attribute, kind) in records.schema() {
                match kind {
                    AttributeKind::Continuous => {
                        let values: Vec<f64> = members
                            .iter()
                            .filter_map(|&i| records.records()[i].continuous(attribute))
                            .collect();
                        if !values.is_empty() {
                            continuous_means.insert(
                                attribute.clone(),
                                values.iter().sum::<f64>() / values.len() as f64,
                            );
                        }
                    }
                    AttributeKind::Categorical => {
                        let mut counts = BTreeMap::<&str, usize>::new();
                        for &i in &members {
                            if let Some(value) = records.records()[i].categorical(attribute) {
                                *counts.entry(value).or_default() += 1;
                            }
                        }
                        // max_by_key keeps the last maximum; iterate in reverse to keep the smallest label.
                        if let Some((mode, _)) = counts.iter().rev().max_by_key(|(_, c)| **c) {
                            categorical_modes.insert(attribute.clone(), mode.to_string());
                        }
                    }
                }
            }

            ClusterProfile {
                cluster,
                size: members.len(),
                centroid: clustering.centroids[cluster].clone(),
                continuous_means,
                categorical_modes,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{assign_clusters, characterize_clusters};
    use crate::encode::{EncodedFeatures, FeatureVector};
    use crate::kmeans::KMeansOutcome;
    use repsel_core::{RecordSet, SeriesRecord};

    fn setup() -> (RecordSet, EncodedFeatures, KMeansOutcome) {
        let records = RecordSet::new(vec![
            SeriesRecord::new("a", Some("GE"))
                .with_continuous("SliceThickness", Some(1.0))
                .with_categorical("Manufacturer", Some("B")),
            SeriesRecord::new("b", Some("GE"))
                .with_continuous("SliceThickness", Some(3.0))
                .with_categorical("Manufacturer", Some("A")),
            SeriesRecord::new("c", Some("GE"))
                .with_continuous("SliceThickness", None)
                .with_categorical("Manufacturer", Some("A")),
        ])
        .expect("records");
        let features = EncodedFeatures {
            vectors: vec![
                FeatureVector {
                    series_id: "a".into(),
                    record_index: 0,
                    values: vec![0.0, 0.0],
                },
                FeatureVector {
                    series_id: "b".into(),
                    record_index: 1,
                    values: vec![3.0, 4.0],
                },
                FeatureVector {
                    series_id: "c".into(),
                    record_index: 2,
                    values: vec![10.0, 10.0],
                },
            ],
            ..EncodedFeatures::default()
        };
        let clustering = KMeansOutcome {
            k: 2,
            requested_k: 2,
            labels: vec![0, 0, 1],
            centroids: vec![vec![0.0, 0.0], vec![10.0, 10.0]],
            inertia: 25.0,
            iterations: 1,
            converged: true,
            restart: 0,
        };
        (records, features, clustering)
    }

    #[test]
    fn assignments_carry_centroid_distance() {
        let (_, features, clustering) = setup();
        let assignments = assign_clusters(&features, &clustering).expect("assignments");
        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[1].cluster, 0);
        assert_eq!(assignments[1].distance, 5.0);
        assert_eq!(assignments[2].distance, 0.0);
    }

    #[test]
    fn profiles_summarize_present_member_values() {
        let (records, features, clustering) = setup();
        let assignments = assign_clusters(&features, &clustering).expect("assignments");
        let profiles = characterize_clusters(&records, &assignments, &clustering);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].size, 2);
        assert_eq!(profiles[0].continuous_means.get("SliceThickness"), Some(&2.0));
        assert_eq!(
            profiles[0].categorical_modes.get("Manufacturer").map(String::as_str),
            Some("A")
        );
        assert!(profiles[1].continuous_means.is_empty());
    }

    #[test]
    fn label_count_mismatch_is_rejected() {
        let (_, features, mut clustering) = setup();
        clustering.labels.pop();
        let err = assign_clusters(&features, &clustering).expect_err("mismatch");
        assert_eq!(err.code(), "invalid_input");
    }
}
