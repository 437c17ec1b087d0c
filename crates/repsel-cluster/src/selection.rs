// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::kmeans::{KMeansOutcome, count_distinct, distance, kmeans};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use repsel_core::{
    Bounds, ExecutionContext, RepselError, RngStream, RunConfig, RunWarning, seeded_rng,
};

/// Score of one candidate cluster count.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CandidateScore {
    pub k: usize,
    pub wcss: f64,
    pub silhouette: f64,
    pub converged: bool,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterCountReport {
    pub requested_range: Bounds,
    /// Range actually evaluated after capping at the distinct vector count.
    pub evaluated_range: Bounds,
    pub distinct_vectors: usize,
    pub candidates: Vec<CandidateScore>,
    pub best_silhouette: f64,
    /// Knee of the WCSS curve; informational only.
    pub elbow_k: Option<usize>,
    pub selected_k: usize,
    pub clustering: KMeansOutcome,
    pub warnings: Vec<RunWarning>,
}

/// Mean silhouette over all points. Members of singleton clusters score 0.
pub fn silhouette_score<P: AsRef<[f64]>>(points: &[P], labels: &[usize]) -> f64 {
    let indices: Vec<usize> = (0..points.len()).collect();
    silhouette_over(points, labels, &indices)
}

fn silhouette_over<P: AsRef<[f64]>>(points: &[P], labels: &[usize], indices: &[usize]) -> f64 {
    let clusters = indices.iter().map(|&i| labels[i]).max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; clusters];
    for &i in indices {
        sizes[labels[i]] += 1;
    }
    if sizes.iter().filter(|s| **s > 0).count() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut sums = vec![0.0; clusters];
    for &i in indices {
        let own = labels[i];
        if sizes[own] < 2 {
            continue;
        }
        sums.iter_mut().for_each(|s| *s = 0.0);
        for &j in indices {
            if i != j {
                sums[labels[j]] += distance(points[i].as_ref(), points[j].as_ref());
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..clusters)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 && b.is_finite() {
            total += (b - a) / denom;
        }
    }
    total / indices.len() as f64
}

/// Candidate whose (k, WCSS) point lies farthest from the chord joining the first and last
/// candidates, with both axes scaled to [0, 1].
pub fn elbow_k(candidates: &[CandidateScore]) -> Option<usize> {
    if candidates.len() < 3 {
        return None;
    }
    let first = candidates.first()?;
    let last = candidates.last()?;
    let k_span = (last.k - first.k) as f64;
    let (lo, hi) = candidates
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.wcss), hi.max(c.wcss))
        });
    let w_span = hi - lo;
    if k_span <= 0.0 || w_span <= 0.0 {
        return None;
    }

    let scaled = |c: &CandidateScore| ((c.k - first.k) as f64 / k_span, (c.wcss - lo) / w_span);
    let (x1, y1) = scaled(first);
    let (x2, y2) = scaled(last);
    let norm = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();

    let mut best: Option<(usize, f64)> = None;
    for candidate in candidates {
        let (x, y) = scaled(candidate);
        let d = ((y2 - y1) * x - (x2 - x1) * y + x2 * y1 - y2 * x1).abs() / norm;
        if best.is_none_or(|(_, best_d)| d > best_d) {
            best = Some((candidate.k, d));
        }
    }
    best.map(|(k, _)| k)
}

/// Smallest k whose silhouette is within `tolerance` of the best.
pub fn choose_k(candidates: &[CandidateScore], tolerance: f64) -> Option<usize> {
    let best = candidates
        .iter()
        .map(|c| c.silhouette)
        .fold(f64::NEG_INFINITY, f64::max);
    candidates
        .iter()
        .filter(|c| c.silhouette >= best - tolerance)
        .map(|c| c.k)
        .min()
}

fn silhouette_sample(n: usize, config: &RunConfig) -> Vec<usize> {
    match config.silhouette_sample_limit {
        Some(limit) if n > limit => {
            let mut rng = seeded_rng(config.seed, RngStream::SilhouetteSubsample);
            let mut sample = rand::seq::index::sample(&mut rng, n, limit).into_vec();
            sample.sort_unstable();
            sample
        }
        _ => (0..n).collect(),
    }
}

/// Evaluates every candidate k in the configured range and picks one.
pub fn select_cluster_count<P: AsRef<[f64]> + Sync>(
    points: &[P],
    config: &RunConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<ClusterCountReport, RepselError> {
    config.validate()?;
    let requested = config.cluster_range;
    let distinct = count_distinct(points);
    if distinct == 0 {
        return Err(RepselError::degenerate_feature_space(requested.lower, 0));
    }

    let mut warnings = vec![];
    let evaluated = if distinct < requested.lower {
        warnings.push(RunWarning::DegenerateFeatureSpace {
            requested: requested.lower,
            distinct,
        });
        Bounds::new(distinct, distinct)
    } else if distinct < requested.upper {
        warnings.push(RunWarning::DegenerateFeatureSpace {
            requested: requested.upper,
            distinct,
        });
        Bounds::new(requested.lower, distinct)
    } else {
        requested
    };

    let sample = silhouette_sample(points.len(), config);
    let evaluate = |k: usize| -> Result<(CandidateScore, KMeansOutcome), RepselError> {
        ctx.check_cancelled()?;
        let outcome = kmeans(points, k, &config.kmeans, config.seed, ctx)?;
        let silhouette = if outcome.k < 2 {
            0.0
        } else {
            silhouette_over(points, &outcome.labels, &sample)
        };
        tracing::debug!(
            k,
            wcss = outcome.inertia,
            silhouette,
            converged = outcome.converged,
            "scored cluster count"
        );
        Ok((
            CandidateScore {
                k: outcome.k,
                wcss: outcome.inertia,
                silhouette,
                converged: outcome.converged,
            },
            outcome,
        ))
    };

    #[cfg(feature = "rayon")]
    let scored: Vec<(CandidateScore, KMeansOutcome)> = (evaluated.lower..=evaluated.upper)
        .into_par_iter()
        .map(evaluate)
        .collect::<Result<_, _>>()?;

    #[cfg(not(feature = "rayon"))]
    let scored: Vec<(CandidateScore, KMeansOutcome)> = {
        let span = (evaluated.upper - evaluated.lower + 1) as f32;
        let mut scored = Vec::with_capacity(span as usize);
        for k in evaluated.lower..=evaluated.upper {
            scored.push(evaluate(k)?);
            ctx.report_progress(scored.len() as f32 / span);
        }
        scored
    };

    let candidates: Vec<CandidateScore> = scored.iter().map(|(score, _)| *score).collect();
    let selected_k = choose_k(&candidates, config.silhouette_tolerance)
        .ok_or_else(|| RepselError::numerical_issue("no candidate cluster count was scored"))?;
    let best_silhouette = candidates
        .iter()
        .map(|c| c.silhouette)
        .fold(f64::NEG_INFINITY, f64::max);
    let elbow = elbow_k(&candidates);
    let clustering = scored
        .into_iter()
        .find(|(score, _)| score.k == selected_k)
        .map(|(_, outcome)| outcome)
        .ok_or_else(|| RepselError::numerical_issue("selected cluster count has no clustering"))?;

    tracing::info!(
        selected_k,
        best_silhouette,
        elbow_k = elbow,
        candidates = candidates.len(),
        "selected cluster count"
    );

    Ok(ClusterCountReport {
        requested_range: requested,
        evaluated_range: evaluated,
        distinct_vectors: distinct,
        candidates,
        best_silhouette,
        elbow_k: elbow,
        selected_k,
        clustering,
        warnings,
    })
}
