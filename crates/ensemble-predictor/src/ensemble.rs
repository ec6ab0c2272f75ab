//! The six-model ensemble and its blended output.

use analysis_core::stats::{logistic, population_variance};
use analysis_core::{
    AnalysisError, EnsembleOutput, EnsembleSettings, EnsembleWeights, FeatureAttribution,
    FeatureSnapshot, MarketContext, ModelPrediction, QualityScore, ReturnPredictor,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::boosting::{BoostParams, GradientBoosting};
use crate::features::{extract, Features, FEATURE_COUNT, FEATURE_NAMES};
use crate::forest::{ForestParams, RandomForest};
use crate::mlp::{MlpParams, NeuralNet};
use crate::synthetic::TrainingSet;
use crate::tree::{BinnedData, TreeParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    BoostPrimary,
    BoostLeafwise,
    BoostRegularized,
    RandomForest,
    BoostPlain,
    NeuralNet,
}

impl ModelKind {
    pub const ALL: [ModelKind; 6] = [
        ModelKind::BoostPrimary,
        ModelKind::BoostLeafwise,
        ModelKind::BoostRegularized,
        ModelKind::RandomForest,
        ModelKind::BoostPlain,
        ModelKind::NeuralNet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::BoostPrimary => "boost_primary",
            ModelKind::BoostLeafwise => "boost_leafwise",
            ModelKind::BoostRegularized => "boost_regularized",
            ModelKind::RandomForest => "random_forest",
            ModelKind::BoostPlain => "boost_plain",
            ModelKind::NeuralNet => "neural_net",
        }
    }

    pub fn weight(&self, weights: &EnsembleWeights) -> f64 {
        match self {
            ModelKind::BoostPrimary => weights.boost_primary,
            ModelKind::BoostLeafwise => weights.boost_leafwise,
            ModelKind::BoostRegularized => weights.boost_regularized,
            ModelKind::RandomForest => weights.random_forest,
            ModelKind::BoostPlain => weights.boost_plain,
            ModelKind::NeuralNet => weights.neural_net,
        }
    }

    /// Per-model seed so that the six models never share a random stream.
    fn seed(&self, base: u64) -> u64 {
        let offset = ModelKind::ALL.iter().position(|k| k == self).unwrap_or(0) as u64;
        base.wrapping_mul(31).wrapping_add(offset * 1_000_003)
    }

    fn boost_params(&self) -> Option<BoostParams> {
        let params = match self {
            ModelKind::BoostPrimary => BoostParams {
                n_trees: 120,
                learning_rate: 0.05,
                row_subsample: 0.8,
                tree: TreeParams {
                    max_depth: 4,
                    min_samples_leaf: 20,
                    l2: 1.0,
                    feature_fraction: 0.8,
                    ..Default::default()
                },
            },
            ModelKind::BoostLeafwise => BoostParams {
                n_trees: 80,
                learning_rate: 0.05,
                row_subsample: 0.9,
                tree: TreeParams {
                    max_depth: 6,
                    min_samples_leaf: 40,
                    l2: 1.0,
                    feature_fraction: 0.9,
                    ..Default::default()
                },
            },
            ModelKind::BoostRegularized => BoostParams {
                n_trees: 150,
                learning_rate: 0.05,
                row_subsample: 1.0,
                tree: TreeParams {
                    max_depth: 3,
                    min_samples_leaf: 20,
                    l2: 10.0,
                    ..Default::default()
                },
            },
            ModelKind::BoostPlain => BoostParams {
                n_trees: 100,
                learning_rate: 0.1,
                row_subsample: 1.0,
                tree: TreeParams {
                    max_depth: 3,
                    min_samples_leaf: 10,
                    ..Default::default()
                },
            },
            ModelKind::RandomForest | ModelKind::NeuralNet => return None,
        };
        Some(params)
    }

    fn train(&self, set: &TrainingSet, data: &BinnedData, seed: u64) -> TrainedModel {
        let seed = self.seed(seed);
        match self {
            ModelKind::RandomForest => {
                let params = ForestParams {
                    n_trees: 60,
                    tree: TreeParams {
                        max_depth: 8,
                        min_samples_leaf: 5,
                        feature_fraction: 0.5,
                        ..Default::default()
                    },
                };
                TrainedModel::Forest(RandomForest::fit(set, data, &params, seed))
            }
            ModelKind::NeuralNet => {
                TrainedModel::Neural(NeuralNet::fit(set, &MlpParams::default(), seed))
            }
            boosted => {
                let params = boosted.boost_params().unwrap_or(BoostParams {
                    n_trees: 100,
                    learning_rate: 0.1,
                    row_subsample: 1.0,
                    tree: TreeParams::default(),
                });
                TrainedModel::Boosted(GradientBoosting::fit(set, data, &params, seed))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedModel {
    Boosted(GradientBoosting),
    Forest(RandomForest),
    Neural(NeuralNet),
}

impl TrainedModel {
    pub fn predict(&self, features: &Features) -> f64 {
        match self {
            TrainedModel::Boosted(m) => m.predict(features),
            TrainedModel::Forest(m) => m.predict(features),
            TrainedModel::Neural(m) => m.predict(features),
        }
    }
}

/// The trained models plus what inference needs to stay consistent with
/// training. This is the persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedEnsemble {
    pub feature_names: Vec<String>,
    pub feature_means: Features,
    pub models: Vec<(ModelKind, TrainedModel)>,
    pub training_samples: usize,
    pub seed: u64,
}

impl TrainedEnsemble {
    /// Train all six models on `set`, in parallel.
    pub fn train(set: &TrainingSet, seed: u64) -> Result<Self, AnalysisError> {
        if set.is_empty() {
            return Err(AnalysisError::ModelUnavailable(
                "empty training set".to_string(),
            ));
        }
        let data = BinnedData::new(&set.features);
        let models: Vec<(ModelKind, TrainedModel)> = ModelKind::ALL
            .par_iter()
            .map(|kind| {
                let model = kind.train(set, &data, seed);
                debug!(model = kind.name(), "Model trained");
                (*kind, model)
            })
            .collect();

        info!(samples = set.len(), seed, "Ensemble trained");
        Ok(Self {
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            feature_means: set.feature_means(),
            models,
            training_samples: set.len(),
            seed,
        })
    }

    /// Reject ensembles built for a different feature layout or missing a model.
    pub fn check_compatible(&self) -> Result<(), AnalysisError> {
        if self.feature_names.len() != FEATURE_COUNT
            || self.feature_names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(AnalysisError::ModelUnavailable(
                "feature layout does not match".to_string(),
            ));
        }
        for kind in ModelKind::ALL {
            if !self.models.iter().any(|(k, _)| *k == kind) {
                return Err(AnalysisError::ModelUnavailable(format!(
                    "model {} missing",
                    kind.name()
                )));
            }
        }
        Ok(())
    }

    fn weighted_return(&self, features: &Features, weights: &EnsembleWeights) -> f64 {
        self.models
            .iter()
            .map(|(kind, model)| kind.weight(weights) * model.predict(features))
            .sum()
    }
}

/// Inference front-end: a trained ensemble with the current blend policy.
#[derive(Debug, Clone)]
pub struct EnsemblePredictor {
    ensemble: TrainedEnsemble,
    weights: EnsembleWeights,
    probability_scale: f64,
    disagreement_scale: f64,
    top_attributions: usize,
}

impl EnsemblePredictor {
    pub fn new(ensemble: TrainedEnsemble, settings: &EnsembleSettings) -> Self {
        Self {
            ensemble,
            weights: settings.weights,
            probability_scale: settings.probability_scale,
            disagreement_scale: settings.disagreement_scale,
            top_attributions: settings.top_attributions,
        }
    }

    pub fn ensemble(&self) -> &TrainedEnsemble {
        &self.ensemble
    }

    pub fn predict_features(&self, features: &Features) -> Result<EnsembleOutput, AnalysisError> {
        let model_predictions: Vec<ModelPrediction> = self
            .ensemble
            .models
            .iter()
            .map(|(kind, model)| ModelPrediction {
                model: kind.name().to_string(),
                expected_return: model.predict(features),
            })
            .collect();
        if model_predictions.iter().any(|p| !p.expected_return.is_finite()) {
            return Err(AnalysisError::InvalidData(
                "non-finite model prediction".to_string(),
            ));
        }

        let expected_return = self.ensemble.weighted_return(features, &self.weights);
        let returns: Vec<f64> = model_predictions.iter().map(|p| p.expected_return).collect();
        let probability = logistic(expected_return / self.probability_scale);
        let confidence = 1.0 / (1.0 + population_variance(&returns) / self.disagreement_scale);

        Ok(EnsembleOutput {
            model_predictions,
            expected_return,
            probability,
            confidence,
            attributions: self.attributions(features, expected_return),
        })
    }

    /// Occlusion attributions: each feature is replaced by its training mean
    /// and the drop in expected return is its contribution.
    fn attributions(&self, features: &Features, expected_return: f64) -> Vec<FeatureAttribution> {
        let mut contributions: Vec<(usize, f64)> = (0..FEATURE_COUNT)
            .filter(|&f| features[f] != self.ensemble.feature_means[f])
            .map(|f| {
                let mut occluded = *features;
                occluded[f] = self.ensemble.feature_means[f];
                (f, expected_return - self.ensemble.weighted_return(&occluded, &self.weights))
            })
            .filter(|(_, c)| *c != 0.0)
            .collect();
        contributions.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(&b.0)));
        contributions
            .into_iter()
            .take(self.top_attributions)
            .map(|(f, contribution)| FeatureAttribution {
                feature: FEATURE_NAMES[f].to_string(),
                contribution,
            })
            .collect()
    }
}

impl ReturnPredictor for EnsemblePredictor {
    fn name(&self) -> &str {
        "six_model_ensemble"
    }

    fn predict(
        &self,
        quality: &QualityScore,
        snapshot: &FeatureSnapshot,
        market: &MarketContext,
    ) -> Result<EnsembleOutput, AnalysisError> {
        self.predict_features(&extract(quality, snapshot, market))
    }
}
