//! Feed-forward regressor with two ReLU hidden layers.
//!
//! Inputs and targets are standardized with training statistics; weights use
//! Glorot-uniform initialization and are trained by mini-batch SGD with momentum.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::features::{Features, FEATURE_COUNT};
use crate::synthetic::TrainingSet;

#[derive(Debug, Clone, Copy)]
pub struct MlpParams {
    pub hidden: [usize; 2],
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden: [16, 8],
            epochs: 40,
            batch_size: 32,
            learning_rate: 0.01,
            momentum: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Layer {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl Layer {
    fn glorot(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            weights: DMatrix::from_fn(outputs, inputs, |_, _| rng.gen_range(-limit..limit)),
            bias: DVector::zeros(outputs),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            weights: DMatrix::zeros(self.weights.nrows(), self.weights.ncols()),
            bias: DVector::zeros(self.bias.len()),
        }
    }

    fn forward(&self, input: &DVector<f64>) -> DVector<f64> {
        &self.weights * input + &self.bias
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNet {
    layers: Vec<Layer>,
    input_mean: Vec<f64>,
    input_std: Vec<f64>,
    target_mean: f64,
    target_std: f64,
}

fn relu(v: DVector<f64>) -> DVector<f64> {
    v.map(|x| x.max(0.0))
}

fn relu_mask(z: &DVector<f64>) -> DVector<f64> {
    z.map(|x| if x > 0.0 { 1.0 } else { 0.0 })
}

impl NeuralNet {
    pub fn fit(set: &TrainingSet, params: &MlpParams, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = set.len();

        let input_mean: Vec<f64> = set.feature_means().to_vec();
        let input_std: Vec<f64> = (0..FEATURE_COUNT)
            .map(|f| {
                let var = set
                    .features
                    .iter()
                    .map(|row| (row[f] - input_mean[f]).powi(2))
                    .sum::<f64>()
                    / n.max(1) as f64;
                if var > 1e-12 { var.sqrt() } else { 1.0 }
            })
            .collect();
        let target_mean = set.targets.iter().sum::<f64>() / n.max(1) as f64;
        let target_var = set.targets.iter().map(|y| (y - target_mean).powi(2)).sum::<f64>()
            / n.max(1) as f64;
        let target_std = if target_var > 1e-12 { target_var.sqrt() } else { 1.0 };

        let sizes = [FEATURE_COUNT, params.hidden[0], params.hidden[1], 1];
        let layers = sizes
            .windows(2)
            .map(|w| Layer::glorot(w[0], w[1], &mut rng))
            .collect();

        let mut net = Self {
            layers,
            input_mean,
            input_std,
            target_mean,
            target_std,
        };

        let inputs: Vec<DVector<f64>> = set.features.iter().map(|f| net.standardize(f)).collect();
        let targets: Vec<f64> = set
            .targets
            .iter()
            .map(|y| (y - net.target_mean) / net.target_std)
            .collect();
        let mut velocity: Vec<Layer> = net.layers.iter().map(Layer::zeros_like).collect();
        let mut order: Vec<usize> = (0..n).collect();
        let batch_size = params.batch_size.max(1);

        for _ in 0..params.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                let mut grads: Vec<Layer> = net.layers.iter().map(Layer::zeros_like).collect();
                for &i in batch {
                    net.accumulate_gradient(&inputs[i], targets[i], &mut grads);
                }
                let scale = params.learning_rate / batch.len() as f64;
                for ((layer, v), g) in net.layers.iter_mut().zip(velocity.iter_mut()).zip(&grads) {
                    v.weights = &v.weights * params.momentum - &g.weights * scale;
                    v.bias = &v.bias * params.momentum - &g.bias * scale;
                    layer.weights += &v.weights;
                    layer.bias += &v.bias;
                }
            }
        }
        net
    }

    fn standardize(&self, features: &Features) -> DVector<f64> {
        DVector::from_iterator(
            FEATURE_COUNT,
            features
                .iter()
                .zip(self.input_mean.iter().zip(&self.input_std))
                .map(|(x, (m, s))| (x - m) / s),
        )
    }

    /// Backpropagate half squared error for one sample into `grads`.
    fn accumulate_gradient(&self, input: &DVector<f64>, target: f64, grads: &mut [Layer]) {
        let last = self.layers.len() - 1;
        let mut activations = vec![input.clone()];
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&activations[i]);
            pre_activations.push(z.clone());
            activations.push(if i == last { z } else { relu(z) });
        }

        let output = activations[last + 1][0];
        let mut delta = DVector::from_element(1, output - target);
        for i in (0..self.layers.len()).rev() {
            grads[i].weights += &delta * activations[i].transpose();
            grads[i].bias += &delta;
            if i > 0 {
                let back = self.layers[i].weights.transpose() * &delta;
                delta = back.component_mul(&relu_mask(&pre_activations[i - 1]));
            }
        }
    }

    pub fn predict(&self, features: &Features) -> f64 {
        let last = self.layers.len().saturating_sub(1);
        let mut a = self.standardize(features);
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&a);
            a = if i == last { z } else { relu(z) };
        }
        let y = a.get(0).copied().unwrap_or(0.0);
        y * self.target_std + self.target_mean
    }
}
