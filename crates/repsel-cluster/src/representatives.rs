// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::clusters::ClusterAssignment;
use repsel_core::{Bounds, RepselError};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Representative {
    pub series_id: String,
    pub cluster: usize,
    /// Zero-based position within the cluster's ranking.
    pub rank: usize,
    pub distance: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RepresentativeSet {
    /// Ordered by cluster, then distance, then identifier.
    pub representatives: Vec<Representative>,
    /// Selected count per cluster after trimming.
    pub quotas: Vec<usize>,
    pub cluster_sizes: Vec<usize>,
    pub notes: Vec<String>,
}

impl RepresentativeSet {
    pub fn len(&self) -> usize {
        self.representatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }

    pub fn series_ids(&self) -> Vec<&str> {
        self.representatives
            .iter()
            .map(|r| r.series_id.as_str())
            .collect()
    }
}

/// Per-cluster selection counts.
///
/// Each cluster starts at `ceil(total.lower / k)` clamped into the per-cluster bounds and
/// capped at its size. While the sum exceeds `total.upper`, one slot is removed from the
/// largest selection (ties: larger cluster, then lower index), never going below
/// `min(per_cluster.lower, size)`.
pub fn cluster_quotas(sizes: &[usize], per_cluster: Bounds, total: Bounds) -> Vec<usize> {
    let k = sizes.len();
    if k == 0 {
        return vec![];
    }
    let base = total
        .lower
        .div_ceil(k)
        .clamp(per_cluster.lower, per_cluster.upper);
    let mut quotas: Vec<usize> = sizes.iter().map(|&size| base.min(size)).collect();
    let floors: Vec<usize> = sizes
        .iter()
        .map(|&size| per_cluster.lower.min(size))
        .collect();

    while quotas.iter().sum::<usize>() > total.upper {
        let victim = (0..k)
            .filter(|&c| quotas[c] > floors[c])
            .max_by(|&a, &b| {
                quotas[a]
                    .cmp(&quotas[b])
                    .then(sizes[a].cmp(&sizes[b]))
                    .then(b.cmp(&a))
            });
        let Some(victim) = victim else {
            break;
        };
        quotas[victim] -= 1;
    }
    quotas
}

/// Picks the members closest to their centroid in every cluster.
pub fn extract_representatives(
    assignments: &[ClusterAssignment],
    k: usize,
    per_cluster: Bounds,
    total: Bounds,
) -> Result<RepresentativeSet, RepselError> {
    if let Some(bad) = assignments.iter().find(|a| a.cluster >= k) {
        return Err(RepselError::invalid_input(format!(
            "series '{}' is assigned to cluster {} but k={k}",
            bad.series_id, bad.cluster
        )));
    }

    let mut members: Vec<Vec<&ClusterAssignment>> = vec![vec![]; k];
    for assignment in assignments {
        members[assignment.cluster].push(assignment);
    }
    for cluster in &mut members {
        cluster.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.series_id.cmp(&b.series_id))
        });
    }

    let sizes: Vec<usize> = members.iter().map(Vec::len).collect();
    let quotas = cluster_quotas(&sizes, per_cluster, total);

    let mut representatives = vec![];
    for (cluster, (ranked, &quota)) in members.iter().zip(&quotas).enumerate() {
        representatives.extend(ranked.iter().take(quota).enumerate().map(|(rank, a)| {
            Representative {
                series_id: a.series_id.clone(),
                cluster,
                rank,
                distance: a.distance,
            }
        }));
    }

    let mut notes = vec![];
    let selected = representatives.len();
    if selected < total.lower {
        notes.push(format!(
            "selected {selected} representatives, below the total lower bound {}; per-cluster bounds and cluster sizes limit the selection",
            total.lower
        ));
    }
    for (cluster, &size) in sizes.iter().enumerate() {
        if size > 0 && size < per_cluster.lower {
            notes.push(format!(
                "cluster {cluster} has {size} members, fewer than {}; all members selected",
                per_cluster.lower
            ));
        }
    }

    tracing::debug!(
        clusters = k,
        selected,
        quotas = ?quotas,
        "extracted representatives"
    );

    Ok(RepresentativeSet {
        representatives,
        quotas,
        cluster_sizes: sizes,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::{cluster_quotas, extract_representatives};
    use crate::clusters::ClusterAssignment;
    use repsel_core::Bounds;

    fn assignment(id: &str, cluster: usize, distance: f64) -> ClusterAssignment {
        ClusterAssignment {
            series_id: id.to_string(),
            record_index: 0,
            cluster,
            distance,
        }
    }

    #[test]
    fn quotas_default_to_lower_bound_for_small_clusters() {
        let quotas = cluster_quotas(&[3, 100, 100], Bounds::new(5, 10), Bounds::new(50, 100));
        // ceil(50 / 3) = 17 -> clamped to 10; the small cluster gives all 3 members.
        assert_eq!(quotas, vec![3, 10, 10]);
    }

    #[test]
    fn quotas_trim_largest_selections_first() {
        let sizes = vec![50, 40, 30, 20, 10];
        // ceil(40 / 5) = 8 per cluster fits under the cap.
        let quotas = cluster_quotas(&sizes, Bounds::new(5, 10), Bounds::new(40, 45));
        assert_eq!(quotas, vec![8; 5]);

        // 5 x 10 = 50 > 48: two trims, larger clusters first.
        let quotas = cluster_quotas(&sizes, Bounds::new(5, 10), Bounds::new(46, 48));
        assert_eq!(quotas, vec![9, 9, 10, 10, 10]);

        // 5 x 9 = 45 > 42: three trims.
        let quotas = cluster_quotas(&sizes, Bounds::new(5, 10), Bounds::new(42, 42));
        assert_eq!(quotas, vec![8, 8, 8, 9, 9]);
    }

    #[test]
    fn trimming_never_goes_below_floor() {
        let quotas = cluster_quotas(&[5, 5, 5], Bounds::new(5, 10), Bounds::new(5, 10));
        assert_eq!(quotas, vec![5, 5, 5]);
    }

    #[test]
    fn ranking_uses_distance_then_identifier() {
        let assignments = vec![
            assignment("s3", 0, 0.5),
            assignment("s1", 0, 0.5),
            assignment("s2", 0, 0.1),
            assignment("s9", 1, 2.0),
            assignment("s8", 0, 3.0),
        ];
        let set = extract_representatives(&assignments, 2, Bounds::new(3, 3), Bounds::new(1, 10))
            .expect("representatives");
        assert_eq!(set.series_ids(), vec!["s2", "s1", "s3", "s9"]);
        assert_eq!(set.quotas, vec![3, 1]);
        assert_eq!(set.representatives[2].rank, 2);
        assert_eq!(set.notes.len(), 1);
    }

    #[test]
    fn out_of_range_cluster_is_rejected() {
        let err = extract_representatives(
            &[assignment("a", 3, 0.0)],
            2,
            Bounds::new(5, 10),
            Bounds::new(50, 100),
        )
        .expect_err("cluster 3 with k=2");
        assert_eq!(err.code(), "invalid_input");
    }
}
