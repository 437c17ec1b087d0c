// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Unbiased (n - 1) variance; zero for a single observation.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    if values.len() < 2 {
        return Some(0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - mu) * (v - mu)).sum();
    Some(ss / (values.len() - 1) as f64)
}

pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Linear-interpolation quantile over an ascending slice, `q` in [0, 1].
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    let weight = position - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, 0.5)
}

/// Mid-ranks (1-based) with the sizes of every tie group, in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct Ranking {
    pub ranks: Vec<f64>,
    pub tie_sizes: Vec<usize>,
}

impl Ranking {
    /// Sum of t^3 - t over tie groups, used by rank-test tie corrections.
    pub fn tie_term(&self) -> f64 {
        self.tie_sizes
            .iter()
            .map(|&t| {
                let t = t as f64;
                t * t * t - t
            })
            .sum()
    }
}

pub fn average_ranks(values: &[f64]) -> Ranking {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_sizes = vec![];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Positions start..end hold ranks start+1..=end.
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        if end - start > 1 {
            tie_sizes.push(end - start);
        }
        start = end;
    }

    Ranking { ranks, tie_sizes }
}
