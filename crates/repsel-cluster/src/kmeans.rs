// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use repsel_core::{
    ExecutionContext, KMeansConfig, RepselError, RngStream, RunWarning, seeded_rng,
};
use std::collections::BTreeSet;

/// Squared Euclidean distance.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Number of distinct points, compared bitwise with `-0.0` folded into `0.0`.
pub fn count_distinct<P: AsRef<[f64]>>(points: &[P]) -> usize {
    points
        .iter()
        .map(|point| {
            point
                .as_ref()
                .iter()
                .map(|v| if *v == 0.0 { 0u64 } else { v.to_bits() })
                .collect::<Vec<u64>>()
        })
        .collect::<BTreeSet<_>>()
        .len()
}

/// Index of the nearest centroid; ties go to the lowest index.
pub fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (index, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (index, d);
        }
    }
    best
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansOutcome {
    /// Effective number of clusters after capping.
    pub k: usize,
    pub requested_k: usize,
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Within-cluster sum of squared distances.
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Index of the restart that produced this solution.
    pub restart: usize,
}

impl KMeansOutcome {
    pub fn capped(&self) -> bool {
        self.k < self.requested_k
    }

    pub fn cap_warning(&self) -> Option<RunWarning> {
        self.capped().then(|| RunWarning::DegenerateFeatureSpace {
            requested: self.requested_k,
            distinct: self.k,
        })
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == cluster)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Seeded k-means++ followed by Lloyd iterations, repeated `config.restarts` times.
///
/// When fewer than `k` distinct points exist, `k` is capped to the distinct count and
/// the outcome reports the cap. The same seed always yields the same partition.
pub fn kmeans<P: AsRef<[f64]>>(
    points: &[P],
    k: usize,
    config: &KMeansConfig,
    seed: u64,
    ctx: &ExecutionContext<'_>,
) -> Result<KMeansOutcome, RepselError> {
    if k == 0 {
        return Err(RepselError::invalid_input("k must be >= 1; got 0"));
    }
    let distinct = count_distinct(points);
    if distinct == 0 {
        return Err(RepselError::degenerate_feature_space(k, 0));
    }
    let dimension = points[0].as_ref().len();
    if let Some(bad) = points.iter().position(|p| p.as_ref().len() != dimension) {
        return Err(RepselError::invalid_input(format!(
            "point {bad} has dimension {}, expected {dimension}",
            points[bad].as_ref().len()
        )));
    }

    let effective = k.min(distinct);
    if effective < k {
        tracing::debug!(requested = k, distinct, "capping cluster count");
    }

    let mut best: Option<KMeansOutcome> = None;
    for restart in 0..config.restarts.max(1) {
        let mut rng = seeded_rng(seed, RngStream::KMeansRestart(restart));
        let centroids = kmeans_plus_plus(points, effective, &mut rng);
        let mut outcome = lloyd(points, centroids, config, ctx)?;
        outcome.requested_k = k;
        outcome.restart = restart;
        // Strict comparison keeps the earliest restart on ties.
        if best.as_ref().is_none_or(|b| outcome.inertia < b.inertia) {
            best = Some(outcome);
        }
    }

    best.ok_or_else(|| RepselError::numerical_issue("k-means produced no solution"))
}

fn kmeans_plus_plus<P: AsRef<[f64]>>(
    points: &[P],
    k: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..n)].as_ref().to_vec());

    let mut nearest: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p.as_ref(), &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.r#gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = None;
            for (index, weight) in nearest.iter().enumerate() {
                if *weight <= 0.0 {
                    continue;
                }
                cumulative += weight;
                if cumulative >= target {
                    chosen = Some(index);
                    break;
                }
            }
            // Rounding can leave the target just past the final sum.
            chosen.or_else(|| nearest.iter().rposition(|w| *w > 0.0))
        } else {
            None
        };
        let Some(chosen) = chosen else {
            break;
        };

        let centroid = points[chosen].as_ref().to_vec();
        for (slot, point) in nearest.iter_mut().zip(points) {
            *slot = slot.min(squared_distance(point.as_ref(), &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn lloyd<P: AsRef<[f64]>>(
    points: &[P],
    mut centroids: Vec<Vec<f64>>,
    config: &KMeansConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<KMeansOutcome, RepselError> {
    let k = centroids.len();
    let mut labels = vec![0; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        ctx.check_cancelled()?;
        iterations += 1;

        assign_nearest(points, &centroids, &mut labels);
        let updated = update_centroids(points, &labels, &centroids);
        let shift = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| distance(old, new))
            .fold(0.0, f64::max);
        centroids = updated;
        if shift <= config.tolerance {
            converged = true;
            break;
        }
    }

    // Centroids must be member means of the reported labels, converged or not.
    assign_nearest(points, &centroids, &mut labels);
    fill_empty_clusters(points, &mut labels, &centroids);
    let (sums, counts) = cluster_sums(points, &labels, k);
    let centroids: Vec<Vec<f64>> = sums
        .into_iter()
        .zip(&counts)
        .zip(centroids)
        .map(|((sum, count), previous)| mean_or(sum, *count, previous))
        .collect();
    let inertia = labels
        .iter()
        .zip(points)
        .map(|(label, point)| squared_distance(point.as_ref(), &centroids[*label]))
        .sum();

    tracing::trace!(k, iterations, converged, inertia, "k-means run finished");
    Ok(KMeansOutcome {
        k,
        requested_k: k,
        labels,
        centroids,
        inertia,
        iterations,
        converged,
        restart: 0,
    })
}

fn assign_nearest<P: AsRef<[f64]>>(points: &[P], centroids: &[Vec<f64>], labels: &mut [usize]) {
    for (label, point) in labels.iter_mut().zip(points) {
        *label = nearest_centroid(point.as_ref(), centroids).0;
    }
}

fn cluster_sums<P: AsRef<[f64]>>(
    points: &[P],
    labels: &[usize],
    k: usize,
) -> (Vec<Vec<f64>>, Vec<usize>) {
    let dimension = points.first().map_or(0, |p| p.as_ref().len());
    let mut sums = vec![vec![0.0; dimension]; k];
    let mut counts = vec![0usize; k];
    for (label, point) in labels.iter().zip(points) {
        counts[*label] += 1;
        for (acc, v) in sums[*label].iter_mut().zip(point.as_ref()) {
            *acc += v;
        }
    }
    (sums, counts)
}

fn mean_or(sum: Vec<f64>, count: usize, fallback: Vec<f64>) -> Vec<f64> {
    if count == 0 {
        fallback
    } else {
        sum.into_iter().map(|s| s / count as f64).collect()
    }
}

/// Member means; each empty cluster is re-seeded at a distinct far point.
fn update_centroids<P: AsRef<[f64]>>(
    points: &[P],
    labels: &[usize],
    centroids: &[Vec<f64>],
) -> Vec<Vec<f64>> {
    let (sums, counts) = cluster_sums(points, labels, centroids.len());
    let mut reseeded: Vec<Vec<f64>> = vec![];
    let mut updated = Vec::with_capacity(centroids.len());
    for (cluster, (sum, count)) in sums.into_iter().zip(&counts).enumerate() {
        if *count > 0 {
            updated.push(mean_or(sum, *count, vec![]));
            continue;
        }
        let centroid = match farthest_point(points, labels, centroids, &reseeded) {
            Some(index) => points[index].as_ref().to_vec(),
            None => centroids[cluster].clone(),
        };
        reseeded.push(centroid.clone());
        updated.push(centroid);
    }
    updated
}

/// Point farthest from its assigned centroid, skipping coordinates already in `taken`.
/// Ties go to the lowest index.
fn farthest_point<P: AsRef<[f64]>>(
    points: &[P],
    labels: &[usize],
    centroids: &[Vec<f64>],
    taken: &[Vec<f64>],
) -> Option<usize> {
    let mut farthest: Option<(usize, f64)> = None;
    for (index, (point, label)) in points.iter().zip(labels).enumerate() {
        let point = point.as_ref();
        if taken.iter().any(|t| t.as_slice() == point) {
            continue;
        }
        let d = squared_distance(point, &centroids[*label]);
        if farthest.is_none_or(|(_, best)| d > best) {
            farthest = Some((index, d));
        }
    }
    farthest.map(|(index, _)| index)
}

/// Moves the farthest member of a cluster with spare members into each empty cluster.
fn fill_empty_clusters<P: AsRef<[f64]>>(
    points: &[P],
    labels: &mut [usize],
    centroids: &[Vec<f64>],
) {
    let mut counts = vec![0usize; centroids.len()];
    for &label in labels.iter() {
        counts[label] += 1;
    }
    for cluster in 0..centroids.len() {
        if counts[cluster] > 0 {
            continue;
        }
        let mut donor: Option<(usize, f64)> = None;
        for (index, (point, &label)) in points.iter().zip(labels.iter()).enumerate() {
            if counts[label] < 2 {
                continue;
            }
            let d = squared_distance(point.as_ref(), &centroids[label]);
            if donor.is_none_or(|(_, best)| d > best) {
                donor = Some((index, d));
            }
        }
        let Some((index, _)) = donor else {
            return;
        };
        counts[labels[index]] -= 1;
        counts[cluster] += 1;
        labels[index] = cluster;
    }
}
