//! Multi-perspective evaluation.
//!
//! Re-weights the four category scores of a quality score under four fixed
//! investment-style profiles and classifies each weighted score.

use analysis_core::{
    PerspectiveKind, PerspectiveSettings, PerspectiveVerdict, PolicyConfig, QualityScore,
};
use tracing::trace;

/// The four verdicts for one instrument, in `PerspectiveKind::ALL` order.
pub type VerdictSet = [PerspectiveVerdict; 4];

#[derive(Debug, Clone)]
pub struct PerspectiveEngine {
    settings: PerspectiveSettings,
}

impl Default for PerspectiveEngine {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl PerspectiveEngine {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            settings: config.perspectives.clone(),
        }
    }

    pub fn evaluate(&self, kind: PerspectiveKind, quality: &QualityScore) -> PerspectiveVerdict {
        let profile = self.settings.profile(kind);
        let weighted = profile.weights.apply(quality);
        let verdict = PerspectiveVerdict::new(
            kind,
            weighted,
            &profile.thresholds,
            self.settings.weak_buy_margin,
        );
        trace!(
            symbol = quality.symbol(),
            perspective = kind.name(),
            weighted,
            recommendation = verdict.recommendation().as_str(),
            "Perspective verdict"
        );
        verdict
    }

    pub fn evaluate_all(&self, quality: &QualityScore) -> VerdictSet {
        PerspectiveKind::ALL.map(|kind| self.evaluate(kind, quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{CategoryWeights, Recommendation};
    use approx::assert_relative_eq;

    fn quality(f: f64, m: f64, r: f64, s: f64) -> QualityScore {
        QualityScore::new("TEST", &CategoryWeights::new(0.4, 0.3, 0.2, 0.1), f, m, r, s, vec![])
    }

    #[test]
    fn test_worked_example_all_buy() {
        let verdicts = PerspectiveEngine::default().evaluate_all(&quality(90.0, 60.0, 80.0, 70.0));
        let scores: Vec<f64> = verdicts.iter().map(|v| v.weighted_score()).collect();
        assert_relative_eq!(scores[0], 84.0, epsilon = 1e-9);
        assert_relative_eq!(scores[1], 73.0, epsilon = 1e-9);
        assert_relative_eq!(scores[2], 83.0, epsilon = 1e-9);
        assert_relative_eq!(scores[3], 82.0, epsilon = 1e-9);
        assert!(verdicts.iter().all(|v| v.recommendation() == Recommendation::Buy));
        assert_eq!(verdicts[1].perspective(), PerspectiveKind::HedgeFund);
    }

    #[test]
    fn test_sentiment_has_no_influence() {
        let engine = PerspectiveEngine::default();
        let low = engine.evaluate_all(&quality(70.0, 70.0, 70.0, 0.0));
        let high = engine.evaluate_all(&quality(70.0, 70.0, 70.0, 100.0));
        assert_eq!(low, high);
    }

    #[test]
    fn test_profile_specific_thresholds() {
        let engine = PerspectiveEngine::default();
        let q = quality(72.0, 72.0, 72.0, 50.0);
        assert_eq!(
            engine.evaluate(PerspectiveKind::HedgeFund, &q).recommendation(),
            Recommendation::Buy
        );
        assert_eq!(
            engine.evaluate(PerspectiveKind::Institutional, &q).recommendation(),
            Recommendation::WeakBuy
        );
        assert_eq!(
            engine.evaluate(PerspectiveKind::RiskManaged, &q).recommendation(),
            Recommendation::WeakBuy
        );
    }

    #[test]
    fn test_weak_scores_avoid() {
        let verdicts = PerspectiveEngine::default().evaluate_all(&quality(20.0, 30.0, 25.0, 90.0));
        assert!(verdicts.iter().all(|v| v.recommendation() == Recommendation::Avoid));
    }

    #[test]
    fn test_deterministic() {
        let engine = PerspectiveEngine::default();
        let q = quality(81.3, 66.6, 77.7, 12.0);
        assert_eq!(engine.evaluate_all(&q), engine.evaluate_all(&q));
    }
}
