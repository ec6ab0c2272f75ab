//! Six-model return ensemble.
//!
//! Four gradient-boosted tree models, a random forest and a small neural
//! network map the ensemble feature vector to an expected return. Without
//! outcome history the models are trained from seeded synthetic priors.

pub mod boosting;
pub mod ensemble;
pub mod features;
pub mod forest;
pub mod loader;
pub mod mlp;
pub mod synthetic;
pub mod tree;

pub use ensemble::{EnsemblePredictor, ModelKind, TrainedEnsemble};
pub use features::{extract, Features, FEATURE_COUNT, FEATURE_NAMES};
pub use loader::EnsembleLoader;
pub use synthetic::{generate, TrainingSet};
