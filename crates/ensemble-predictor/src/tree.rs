//! Histogram-binned regression trees shared by the boosted and bagged models.

use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::features::{Features, FEATURE_COUNT};

/// Maximum number of histogram bins per feature
pub const MAX_BINS: usize = 32;

/// Training rows quantized into per-feature bins.
///
/// A row with value `x` lands in bin `k` where `k` is the number of cut points
/// strictly below `x`, so `bin <= k` is equivalent to `x <= cuts[k]`.
#[derive(Debug, Clone)]
pub struct BinnedData {
    cuts: Vec<Vec<f64>>,
    /// Column-major: `bins[feature][row]`
    bins: Vec<Vec<u8>>,
    rows: usize,
}

impl BinnedData {
    pub fn new(features: &[Features]) -> Self {
        let rows = features.len();
        let mut cuts = Vec::with_capacity(FEATURE_COUNT);
        let mut bins = Vec::with_capacity(FEATURE_COUNT);

        for f in 0..FEATURE_COUNT {
            let mut column: Vec<f64> = features.iter().map(|row| row[f]).collect();
            column.sort_by(f64::total_cmp);
            let feature_cuts = quantile_cuts(&column);
            let feature_bins = features
                .iter()
                .map(|row| bin_of(&feature_cuts, row[f]))
                .collect();
            cuts.push(feature_cuts);
            bins.push(feature_bins);
        }

        Self { cuts, bins, rows }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn bin(&self, feature: usize, row: usize) -> u8 {
        self.bins[feature][row]
    }

    fn bin_count(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }
}

/// Up to `MAX_BINS - 1` distinct cut points at evenly spaced quantiles. The
/// largest value is never a cut since nothing could fall to its right.
fn quantile_cuts(sorted: &[f64]) -> Vec<f64> {
    let n = sorted.len();
    if n < 2 {
        return Vec::new();
    }
    let max = sorted[n - 1];
    let mut cuts: Vec<f64> = (1..MAX_BINS)
        .map(|i| sorted[(i * n / MAX_BINS).min(n - 1)])
        .filter(|c| *c < max)
        .collect();
    cuts.dedup();
    cuts
}

fn bin_of(cuts: &[f64], value: f64) -> u8 {
    cuts.partition_point(|c| *c < value) as u8
}

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 shrinkage on leaf values
    pub l2: f64,
    /// Share of features considered at each split
    pub feature_fraction: f64,
    pub min_gain: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 4,
            min_samples_leaf: 20,
            l2: 0.0,
            feature_fraction: 1.0,
            min_gain: 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        bin: u8,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Regression tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    bin: u8,
    gain: f64,
}

struct Grower<'a> {
    data: &'a BinnedData,
    targets: &'a [f64],
    params: TreeParams,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Fit a tree to `targets` over the subset `rows` of `data`.
    pub fn fit(
        data: &BinnedData,
        rows: Vec<usize>,
        targets: &[f64],
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut grower = Grower {
            data,
            targets,
            params,
            rng,
            nodes: Vec::new(),
        };
        grower.grow(rows, 0);
        Self {
            nodes: grower.nodes,
        }
    }

    pub fn predict(&self, features: &Features) -> f64 {
        self.walk(|feature, _, threshold| features[feature] <= threshold)
    }

    /// Prediction for a training row, using its bins.
    pub fn predict_binned(&self, data: &BinnedData, row: usize) -> f64 {
        self.walk(|feature, bin, _| data.bin(feature, row) <= bin)
    }

    fn walk<F: Fn(usize, u8, f64) -> bool>(&self, goes_left: F) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    bin,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if goes_left(*feature, *bin, *threshold) {
                        *left
                    } else {
                        *right
                    };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    1 + depth_of(nodes, *left).max(depth_of(nodes, *right))
                }
                _ => 0,
            }
        }
        depth_of(&self.nodes, 0)
    }
}

impl Grower<'_> {
    fn leaf_value(&self, sum: f64, count: usize) -> f64 {
        sum / (count as f64 + self.params.l2)
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        let sum: f64 = rows.iter().map(|r| self.targets[*r]).sum();
        let count = rows.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(sum, count),
        });

        if depth >= self.params.max_depth || count < 2 * self.params.min_samples_leaf {
            return idx;
        }
        let Some(split) = self.best_split(&rows, sum) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|r| self.data.bin(split.feature, *r) <= split.bin);
        let threshold = self.data.cuts[split.feature][split.bin as usize];
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            bin: split.bin,
            threshold,
            left,
            right,
        };
        idx
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let fraction = self.params.feature_fraction;
        if fraction >= 1.0 {
            return (0..FEATURE_COUNT).collect();
        }
        let k = ((FEATURE_COUNT as f64 * fraction).round() as usize).clamp(1, FEATURE_COUNT);
        let mut chosen = index::sample(&mut *self.rng, FEATURE_COUNT, k).into_vec();
        chosen.sort_unstable();
        chosen
    }

    fn best_split(&mut self, rows: &[usize], total_sum: f64) -> Option<SplitCandidate> {
        let l2 = self.params.l2;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total_count = rows.len();
        let parent_score = total_sum * total_sum / (total_count as f64 + l2);
        let mut best: Option<SplitCandidate> = None;

        for feature in self.candidate_features() {
            let n_bins = self.data.bin_count(feature);
            if n_bins < 2 {
                continue;
            }
            let mut sums = vec![0.0; n_bins];
            let mut counts = vec![0usize; n_bins];
            for &r in rows {
                let b = self.data.bin(feature, r) as usize;
                sums[b] += self.targets[r];
                counts[b] += 1;
            }

            let mut left_sum = 0.0;
            let mut left_count = 0;
            for bin in 0..n_bins - 1 {
                left_sum += sums[bin];
                left_count += counts[bin];
                let right_count = total_count - left_count;
                if left_count < min_leaf {
                    continue;
                }
                if right_count < min_leaf {
                    break;
                }
                let right_sum = total_sum - left_sum;
                let gain = left_sum * left_sum / (left_count as f64 + l2)
                    + right_sum * right_sum / (right_count as f64 + l2)
                    - parent_score;
                if gain > self.params.min_gain && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        bin: bin as u8,
                        gain,
                    });
                }
            }
        }
        best
    }
}
