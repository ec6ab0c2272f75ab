use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::features::Features;
use crate::synthetic::TrainingSet;
use crate::tree::{BinnedData, RegressionTree, TreeParams};

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub tree: TreeParams,
}

/// Bootstrap-bagged regression trees, averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Each tree draws its bootstrap sample from its own generator seeded with
    /// `seed + tree index`, so the forest is identical regardless of scheduling.
    pub fn fit(set: &TrainingSet, data: &BinnedData, params: &ForestParams, seed: u64) -> Self {
        let n = set.len();
        if n == 0 {
            return Self { trees: Vec::new() };
        }
        let trees = (0..params.n_trees as u64)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i));
                let mut rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                rows.sort_unstable();
                RegressionTree::fit(data, rows, &set.targets, params.tree, &mut rng)
            })
            .collect();
        Self { trees }
    }

    pub fn predict(&self, features: &Features) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(features)).sum::<f64>() / self.trees.len() as f64
    }
}
