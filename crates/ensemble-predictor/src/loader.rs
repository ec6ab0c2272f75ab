use std::fs;
use std::path::Path;

use analysis_core::{AnalysisError, EnsembleSettings};
use tracing::{info, warn};

use crate::ensemble::{EnsemblePredictor, TrainedEnsemble};
use crate::synthetic;

impl TrainedEnsemble {
    pub fn save(&self, path: &Path) -> Result<(), AnalysisError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)
            .map_err(|e| AnalysisError::InvalidData(format!("ensemble serialization: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a persisted ensemble. Any failure is reported as `ModelUnavailable`.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AnalysisError::ModelUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let ensemble: TrainedEnsemble = serde_json::from_str(&raw).map_err(|e| {
            AnalysisError::ModelUnavailable(format!("corrupt model file {}: {e}", path.display()))
        })?;
        ensemble.check_compatible()?;
        Ok(ensemble)
    }
}

/// One-time initialization of the ensemble for a process.
pub struct EnsembleLoader;

impl EnsembleLoader {
    /// Load the trained ensemble from `model_path` when the file exists,
    /// otherwise cold-start train from synthetic priors and save it there.
    ///
    /// Returns `ModelUnavailable` when the ensemble is disabled or cannot be
    /// loaded or trained; callers fall back to quant-only blending.
    pub fn initialize(settings: &EnsembleSettings) -> Result<EnsemblePredictor, AnalysisError> {
        if !settings.enabled {
            return Err(AnalysisError::ModelUnavailable(
                "ensemble disabled by configuration".to_string(),
            ));
        }

        if let Some(path) = settings.model_path.as_deref().filter(|p| p.is_file()) {
            let ensemble = TrainedEnsemble::load(path)?;
            info!(
                path = %path.display(),
                samples = ensemble.training_samples,
                "Loaded trained ensemble"
            );
            return Ok(EnsemblePredictor::new(ensemble, settings));
        }

        info!(
            samples = settings.synthetic_samples,
            seed = settings.seed,
            "No trained ensemble on disk, training from synthetic priors"
        );
        let set = synthetic::generate(settings.synthetic_samples, settings.seed)?;
        let ensemble = TrainedEnsemble::train(&set, settings.seed)?;

        if let Some(path) = settings.model_path.as_deref() {
            match ensemble.save(path) {
                Ok(()) => info!(path = %path.display(), "Saved trained ensemble"),
                Err(e) => warn!(path = %path.display(), "Failed to save trained ensemble: {e}"),
            }
        }
        Ok(EnsemblePredictor::new(ensemble, settings))
    }
}
