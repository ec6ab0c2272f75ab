//! Scoring policy configuration.
//!
//! Every weight and threshold the pipeline uses lives here as an immutable
//! value passed explicitly into the scoring functions. Defaults reproduce the
//! reference policy; a TOML file and `CONSENSUS_*` environment variables can
//! override them without code changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::AnalysisError;
use crate::types::{CategoryWeights, PerspectiveKind, Thresholds};

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Intrinsic quality blend (Fundamentals 0.40, Momentum 0.30, Risk 0.20, Sentiment 0.10)
    pub quality: CategoryWeights,
    pub scorer: ScorerSettings,
    pub perspectives: PerspectiveSettings,
    pub consensus: ConsensusSettings,
    pub ensemble: EnsembleSettings,
    pub blending: BlendSettings,
    pub guardrail: GuardrailSettings,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            quality: CategoryWeights::new(0.40, 0.30, 0.20, 0.10),
            scorer: ScorerSettings::default(),
            perspectives: PerspectiveSettings::default(),
            consensus: ConsensusSettings::default(),
            ensemble: EnsembleSettings::default(),
            blending: BlendSettings::default(),
            guardrail: GuardrailSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerSettings {
    /// A category with a larger share of missing fields makes the instrument DataInsufficient
    pub max_missing_fraction: f64,
    /// Score substituted for a missing field
    pub neutral_score: f64,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            max_missing_fraction: 0.5,
            neutral_score: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveProfile {
    pub name: String,
    pub weights: CategoryWeights,
    pub thresholds: Thresholds,
}

impl PerspectiveProfile {
    fn preset(name: &str, weights: CategoryWeights, buy: f64, strong_buy: f64) -> Self {
        Self {
            name: name.to_string(),
            weights,
            thresholds: Thresholds {
                pass: 40.0,
                buy,
                strong_buy,
            },
        }
    }

    fn validate(&self, weak_buy_margin: f64) -> Result<(), AnalysisError> {
        let sum = self.weights.sum();
        if !sum.is_finite() || (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AnalysisError::ConfigurationError(format!(
                "perspective '{}' weights sum to {:.6}, expected 1.0",
                self.name, sum
            )));
        }
        if self.weights.has_negative() {
            return Err(AnalysisError::ConfigurationError(format!(
                "perspective '{}' has a negative weight",
                self.name
            )));
        }
        let t = &self.thresholds;
        if !(t.pass < t.buy && t.buy < t.strong_buy) {
            return Err(AnalysisError::ConfigurationError(format!(
                "perspective '{}' thresholds must ascend (pass {} < buy {} < strong_buy {})",
                self.name, t.pass, t.buy, t.strong_buy
            )));
        }
        if t.buy - weak_buy_margin < t.pass {
            return Err(AnalysisError::ConfigurationError(format!(
                "perspective '{}' weak-buy band ({}) falls below the pass line ({})",
                self.name,
                t.buy - weak_buy_margin,
                t.pass
            )));
        }
        Ok(())
    }
}

/// The four perspective profiles, one named field each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveSettings {
    pub institutional: PerspectiveProfile,
    pub hedge_fund: PerspectiveProfile,
    pub quant_value: PerspectiveProfile,
    pub risk_managed: PerspectiveProfile,
    /// WEAK_BUY band below each profile's buy threshold
    pub weak_buy_margin: f64,
}

impl Default for PerspectiveSettings {
    fn default() -> Self {
        Self {
            institutional: PerspectiveProfile::preset(
                "Institutional",
                CategoryWeights::new(0.60, 0.10, 0.30, 0.0),
                75.0,
                85.0,
            ),
            hedge_fund: PerspectiveProfile::preset(
                "Hedge Fund",
                CategoryWeights::new(0.30, 0.50, 0.20, 0.0),
                70.0,
                80.0,
            ),
            quant_value: PerspectiveProfile::preset(
                "Quant Value",
                CategoryWeights::new(0.70, 0.20, 0.10, 0.0),
                75.0,
                85.0,
            ),
            risk_managed: PerspectiveProfile::preset(
                "Risk-Managed",
                CategoryWeights::new(0.40, 0.10, 0.50, 0.0),
                80.0,
                90.0,
            ),
            weak_buy_margin: 10.0,
        }
    }
}

impl PerspectiveSettings {
    pub fn profile(&self, kind: PerspectiveKind) -> &PerspectiveProfile {
        match kind {
            PerspectiveKind::Institutional => &self.institutional,
            PerspectiveKind::HedgeFund => &self.hedge_fund,
            PerspectiveKind::QuantValue => &self.quant_value,
            PerspectiveKind::RiskManaged => &self.risk_managed,
        }
    }
}

/// Score gates for the BUY and WEAK BUY tiers. STRONG BUY is never gated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierGates {
    pub buy: f64,
    pub weak_buy: f64,
}

impl TierGates {
    /// Shift both gates by `delta` (positive tightens).
    pub fn shifted(&self, delta: f64) -> Self {
        Self {
            buy: self.buy + delta,
            weak_buy: self.weak_buy + delta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusSettings {
    pub strong_buy_confidence: f64,
    pub buy_confidence: f64,
    pub weak_buy_confidence: f64,
    pub gates: TierGates,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self {
            strong_buy_confidence: 0.95,
            buy_confidence: 0.85,
            weak_buy_confidence: 0.75,
            gates: TierGates {
                buy: 75.0,
                weak_buy: 70.0,
            },
        }
    }
}

/// Per-model blend weights of the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub boost_primary: f64,
    pub boost_leafwise: f64,
    pub boost_regularized: f64,
    pub random_forest: f64,
    pub boost_plain: f64,
    pub neural_net: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            boost_primary: 0.25,
            boost_leafwise: 0.25,
            boost_regularized: 0.20,
            random_forest: 0.10,
            boost_plain: 0.10,
            neural_net: 0.10,
        }
    }
}

impl EnsembleWeights {
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.boost_primary,
            self.boost_leafwise,
            self.boost_regularized,
            self.random_forest,
            self.boost_plain,
            self.neural_net,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSettings {
    pub enabled: bool,
    pub weights: EnsembleWeights,
    /// Expected-return scale (percent) of the logistic probability mapping
    pub probability_scale: f64,
    /// Prediction variance (percent squared) at which confidence halves
    pub disagreement_scale: f64,
    pub top_attributions: usize,
    /// Cold-start sample count
    pub synthetic_samples: usize,
    pub seed: u64,
    /// Trained ensemble JSON. Loaded when present, written after a cold start.
    pub model_path: Option<PathBuf>,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: EnsembleWeights::default(),
            probability_scale: 5.0,
            disagreement_scale: 4.0,
            top_attributions: 5,
            synthetic_samples: 2000,
            seed: 42,
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendSettings {
    pub quant_weight: f64,
    pub ensemble_weight: f64,
    pub quality_weight: f64,
    pub consensus_weight: f64,
    pub probability_weight: f64,
    /// Ultimate-score weights used when the ensemble is unavailable
    pub fallback_quality_weight: f64,
    pub fallback_consensus_weight: f64,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            quant_weight: 0.60,
            ensemble_weight: 0.40,
            quality_weight: 0.40,
            consensus_weight: 0.30,
            probability_weight: 0.30,
            fallback_quality_weight: 0.57,
            fallback_consensus_weight: 0.43,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailSettings {
    pub enabled: bool,
    /// Added to every tier gate in a bear regime
    pub bear_gate_margin: f64,
    /// Subtracted from every tier gate in a bull regime
    pub bull_gate_margin: f64,
    /// Sectors still eligible in a bear regime
    pub defensive_sectors: Vec<String>,
    pub min_price: f64,
    pub min_avg_dollar_volume: f64,
}

impl Default for GuardrailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bear_gate_margin: 5.0,
            bull_gate_margin: 5.0,
            defensive_sectors: vec![
                "Consumer Staples".to_string(),
                "Health Care".to_string(),
                "Utilities".to_string(),
            ],
            min_price: 0.0,
            min_avg_dollar_volume: 0.0,
        }
    }
}

impl PolicyConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, AnalysisError> {
        toml::from_str(raw)
            .map_err(|e| AnalysisError::ConfigurationError(format!("invalid policy TOML: {e}")))
    }

    /// Load from a TOML file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::ConfigurationError(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), AnalysisError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `CONSENSUS_*` overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), AnalysisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(quant) = parse_override::<f64, _>(&lookup, "CONSENSUS_QUANT_WEIGHT")? {
            self.blending.quant_weight = quant;
            self.blending.ensemble_weight = 1.0 - quant;
        }
        if let Some(enabled) = parse_override(&lookup, "CONSENSUS_ENSEMBLE_ENABLED")? {
            self.ensemble.enabled = enabled;
        }
        if let Some(seed) = parse_override(&lookup, "CONSENSUS_ENSEMBLE_SEED")? {
            self.ensemble.seed = seed;
        }
        if let Some(samples) = parse_override(&lookup, "CONSENSUS_SYNTHETIC_SAMPLES")? {
            self.ensemble.synthetic_samples = samples;
        }
        if let Some(path) = lookup("CONSENSUS_MODEL_PATH").filter(|p| !p.trim().is_empty()) {
            self.ensemble.model_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(enabled) = parse_override(&lookup, "CONSENSUS_GUARDRAIL_ENABLED")? {
            self.guardrail.enabled = enabled;
        }
        if let Some(min_price) = parse_override(&lookup, "CONSENSUS_MIN_PRICE")? {
            self.guardrail.min_price = min_price;
        }
        if let Some(min_volume) = parse_override(&lookup, "CONSENSUS_MIN_DOLLAR_VOLUME")? {
            self.guardrail.min_avg_dollar_volume = min_volume;
        }
        Ok(())
    }

    /// Reject corrupted policy definitions. Called once at startup.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        check_sum("quality weights", self.quality.sum())?;
        if self.quality.has_negative() {
            return Err(AnalysisError::ConfigurationError(
                "quality weights must be non-negative".to_string(),
            ));
        }

        let s = &self.scorer;
        if !(0.0..=1.0).contains(&s.max_missing_fraction) {
            return Err(AnalysisError::ConfigurationError(format!(
                "scorer.max_missing_fraction {} outside [0, 1]",
                s.max_missing_fraction
            )));
        }
        if !(0.0..=100.0).contains(&s.neutral_score) {
            return Err(AnalysisError::ConfigurationError(format!(
                "scorer.neutral_score {} outside [0, 100]",
                s.neutral_score
            )));
        }

        let margin = self.perspectives.weak_buy_margin;
        check_non_negative("perspectives.weak_buy_margin", margin)?;
        for kind in PerspectiveKind::ALL {
            self.perspectives.profile(kind).validate(margin)?;
        }

        let c = &self.consensus;
        for (name, value) in [
            ("strong_buy_confidence", c.strong_buy_confidence),
            ("buy_confidence", c.buy_confidence),
            ("weak_buy_confidence", c.weak_buy_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AnalysisError::ConfigurationError(format!(
                    "consensus.{name} {value} outside [0, 1]"
                )));
            }
        }

        let e = &self.ensemble;
        check_sum("ensemble weights", e.weights.as_array().iter().sum())?;
        if e.weights.as_array().iter().any(|w| *w < 0.0) {
            return Err(AnalysisError::ConfigurationError(
                "ensemble weights must be non-negative".to_string(),
            ));
        }
        for (name, value) in [
            ("probability_scale", e.probability_scale),
            ("disagreement_scale", e.disagreement_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::ConfigurationError(format!(
                    "ensemble.{name} {value} must be positive"
                )));
            }
        }

        let b = &self.blending;
        for (name, value) in [
            ("quant_weight", b.quant_weight),
            ("ensemble_weight", b.ensemble_weight),
            ("quality_weight", b.quality_weight),
            ("consensus_weight", b.consensus_weight),
            ("probability_weight", b.probability_weight),
            ("fallback_quality_weight", b.fallback_quality_weight),
            ("fallback_consensus_weight", b.fallback_consensus_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AnalysisError::ConfigurationError(format!(
                    "blending.{name} {value} outside [0, 1]"
                )));
            }
        }
        check_sum("confidence blend", b.quant_weight + b.ensemble_weight)?;
        check_sum(
            "ultimate score weights",
            b.quality_weight + b.consensus_weight + b.probability_weight,
        )?;
        check_sum(
            "fallback ultimate score weights",
            b.fallback_quality_weight + b.fallback_consensus_weight,
        )?;

        let g = &self.guardrail;
        check_non_negative("guardrail.bear_gate_margin", g.bear_gate_margin)?;
        check_non_negative("guardrail.bull_gate_margin", g.bull_gate_margin)?;
        check_non_negative("guardrail.min_price", g.min_price)?;
        check_non_negative("guardrail.min_avg_dollar_volume", g.min_avg_dollar_volume)?;
        Ok(())
    }
}

/// A NaN anywhere in the sum fails as well.
fn check_sum(what: &str, sum: f64) -> Result<(), AnalysisError> {
    if !sum.is_finite() || (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(AnalysisError::ConfigurationError(format!(
            "{what} sum to {sum:.6}, expected 1.0"
        )));
    }
    Ok(())
}

fn check_non_negative(what: &str, value: f64) -> Result<(), AnalysisError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(AnalysisError::ConfigurationError(format!(
            "{what} {value} must be a non-negative number"
        )));
    }
    Ok(())
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Result<Option<T>, AnalysisError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AnalysisError::ConfigurationError(format!("{key}='{raw}': {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_policy_is_valid() {
        assert!(PolicyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_sentiment_excluded_from_perspectives() {
        let p = PerspectiveSettings::default();
        for kind in PerspectiveKind::ALL {
            assert_eq!(p.profile(kind).weights.sentiment, 0.0);
        }
    }

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        let mut config = PolicyConfig::default();
        config.perspectives.hedge_fund.weights.momentum = 0.55;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigurationError(ref m) if m.contains("Hedge Fund")));
    }

    #[test]
    fn test_rejects_non_ascending_thresholds() {
        let mut config = PolicyConfig::default();
        config.perspectives.risk_managed.thresholds.strong_buy = 80.0;
        assert!(matches!(config.validate(), Err(AnalysisError::ConfigurationError(_))));
    }

    #[test]
    fn test_rejects_bad_blend_ratio() {
        let mut config = PolicyConfig::default();
        config.blending.ensemble_weight = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_override() {
        let raw = r#"
            [blending]
            quant_weight = 0.7
            ensemble_weight = 0.3

            [perspectives.institutional]
            name = "Institutional"
            weights = { fundamentals = 0.5, momentum = 0.2, risk = 0.3, sentiment = 0.0 }
            thresholds = { pass = 40.0, buy = 72.0, strong_buy = 84.0 }
        "#;
        let config = PolicyConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.blending.quant_weight, 0.7);
        assert_eq!(config.blending.quality_weight, 0.40);
        assert_eq!(config.perspectives.institutional.thresholds.buy, 72.0);
        assert_eq!(config.perspectives.hedge_fund.thresholds.buy, 70.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CONSENSUS_QUANT_WEIGHT", "0.75"),
            ("CONSENSUS_ENSEMBLE_ENABLED", "false"),
            ("CONSENSUS_ENSEMBLE_SEED", "7"),
            ("CONSENSUS_MIN_PRICE", "5"),
        ]
        .into_iter()
        .collect();
        let mut config = PolicyConfig::default();
        config
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.blending.quant_weight, 0.75);
        assert!((config.blending.ensemble_weight - 0.25).abs() < 1e-12);
        assert!(!config.ensemble.enabled);
        assert_eq!(config.ensemble.seed, 7);
        assert_eq!(config.guardrail.min_price, 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut config = PolicyConfig::default();
        let err = config
            .apply_overrides_from(|k| (k == "CONSENSUS_ENSEMBLE_SEED").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigurationError(_)));
    }

    #[test]
    fn test_rejects_nan_weights() {
        let config = PolicyConfig::from_toml_str(
            "quality = { fundamentals = nan, momentum = 0.3, risk = 0.2, sentiment = 0.1 }",
        )
        .unwrap();
        assert!(config.quality.fundamentals.is_nan());
        assert!(matches!(config.validate(), Err(AnalysisError::ConfigurationError(_))));

        let mut config = PolicyConfig::default();
        config.perspectives.institutional.weights.fundamentals = f64::NAN;
        assert!(matches!(config.validate(), Err(AnalysisError::ConfigurationError(_))));
    }

    #[test]
    fn test_rejects_nan_scales_and_margins() {
        let mut config = PolicyConfig::default();
        config.ensemble.disagreement_scale = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PolicyConfig::default();
        config.guardrail.bear_gate_margin = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PolicyConfig::default();
        config.perspectives.weak_buy_margin = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PolicyConfig::default();
        config.guardrail.min_price = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quant_weight_override_above_one_is_rejected() {
        let mut config = PolicyConfig::default();
        config
            .apply_overrides_from(|k| (k == "CONSENSUS_QUANT_WEIGHT").then(|| "1.5".to_string()))
            .unwrap();
        assert_eq!(config.blending.ensemble_weight, -0.5);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigurationError(ref m) if m.contains("ensemble_weight")));
    }

    #[test]
    fn test_rejects_negative_fallback_weight() {
        let mut config = PolicyConfig::default();
        config.blending.fallback_quality_weight = 1.2;
        config.blending.fallback_consensus_weight = -0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tier_gates_shift() {
        let gates = ConsensusSettings::default().gates.shifted(5.0);
        assert_eq!(gates.buy, 80.0);
        assert_eq!(gates.weak_buy, 75.0);
    }
}
