//! Gradient-boosted regression trees (squared loss).

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::features::Features;
use crate::synthetic::TrainingSet;
use crate::tree::{BinnedData, RegressionTree, TreeParams};

#[derive(Debug, Clone, Copy)]
pub struct BoostParams {
    pub n_trees: usize,
    pub learning_rate: f64,
    /// Share of rows drawn (without replacement) for each tree
    pub row_subsample: f64,
    pub tree: TreeParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    base: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(set: &TrainingSet, data: &BinnedData, params: &BoostParams, seed: u64) -> Self {
        let n = set.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let base = if n == 0 {
            0.0
        } else {
            set.targets.iter().sum::<f64>() / n as f64
        };
        let mut predictions = vec![base; n];
        let mut residuals = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_trees);
        let sample_size = ((n as f64 * params.row_subsample).round() as usize).min(n);

        for _ in 0..params.n_trees {
            for (r, (y, p)) in residuals.iter_mut().zip(set.targets.iter().zip(&predictions)) {
                *r = y - p;
            }
            let rows = if sample_size > 0 && sample_size < n {
                let mut rows = index::sample(&mut rng, n, sample_size).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n).collect()
            };
            let tree = RegressionTree::fit(data, rows, &residuals, params.tree, &mut rng);
            for (row, p) in predictions.iter_mut().enumerate() {
                *p += params.learning_rate * tree.predict_binned(data, row);
            }
            trees.push(tree);
        }

        Self {
            base,
            learning_rate: params.learning_rate,
            trees,
        }
    }

    pub fn predict(&self, features: &Features) -> f64 {
        self.base
            + self.learning_rate * self.trees.iter().map(|t| t.predict(features)).sum::<f64>()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}
