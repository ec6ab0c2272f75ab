//! Blending of quant and ensemble signals into the final ranking.

use analysis_core::{BlendSettings, EnsembleOutput, PolicyConfig};
use consensus_builder::ConsensusPick;
use serde::Serialize;

/// Probability used in the sort key of a pick without an ensemble output
/// (logistic of a zero expected return).
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// A consensus pick after blending, as emitted by a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPick {
    rank: usize,
    #[serde(flatten)]
    pick: ConsensusPick,
    tier_label: &'static str,
    ensemble: Option<EnsembleOutput>,
    final_confidence: f64,
    ultimate_score: f64,
    #[serde(skip)]
    sort_key: f64,
}

impl RankedPick {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn symbol(&self) -> &str {
        self.pick.symbol()
    }

    pub fn consensus(&self) -> &ConsensusPick {
        &self.pick
    }

    pub fn ensemble(&self) -> Option<&EnsembleOutput> {
        self.ensemble.as_ref()
    }

    /// True when this pick was blended without an ensemble output
    pub fn is_degraded(&self) -> bool {
        self.ensemble.is_none()
    }

    pub fn final_confidence(&self) -> f64 {
        self.final_confidence
    }

    pub fn ultimate_score(&self) -> f64 {
        self.ultimate_score
    }
}

#[derive(Debug, Clone)]
pub struct Blender {
    settings: BlendSettings,
}

impl Default for Blender {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl Blender {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            settings: config.blending.clone(),
        }
    }

    /// Blend one pick. Without an ensemble output the quant-only fallback
    /// formulas apply; this never fails.
    pub fn blend(&self, pick: ConsensusPick, ensemble: Option<EnsembleOutput>) -> RankedPick {
        let s = &self.settings;
        let quant = pick.confidence();
        let overall = pick.quality().overall();
        let consensus_score = pick.consensus_score();

        let (final_confidence, ultimate_score, sort_key) = match &ensemble {
            Some(out) => (
                (s.quant_weight * quant + s.ensemble_weight * out.confidence).clamp(0.0, 1.0),
                s.quality_weight * overall
                    + s.consensus_weight * consensus_score
                    + s.probability_weight * out.probability * 100.0,
                out.probability * consensus_score,
            ),
            None => (
                quant,
                s.fallback_quality_weight * overall + s.fallback_consensus_weight * consensus_score,
                NEUTRAL_PROBABILITY * consensus_score,
            ),
        };

        RankedPick {
            rank: 0,
            tier_label: pick.tier().label(),
            pick,
            ensemble,
            final_confidence,
            ultimate_score,
            sort_key,
        }
    }
}

/// Final order: agreement count descending, then probability-weighted
/// consensus score descending. The sort is stable, so ties keep the order in
/// which picks arrive (consensus order). Ranks are assigned from 1.
pub fn rank(mut picks: Vec<RankedPick>) -> Vec<RankedPick> {
    picks.sort_by(|a, b| {
        b.pick
            .agreement_count()
            .cmp(&a.pick.agreement_count())
            .then_with(|| b.sort_key.total_cmp(&a.sort_key))
    });
    assign_ranks(picks)
}

/// Renumber ranks 1..=n in current order.
pub fn assign_ranks(mut picks: Vec<RankedPick>) -> Vec<RankedPick> {
    for (i, pick) in picks.iter_mut().enumerate() {
        pick.rank = i + 1;
    }
    picks
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{CategoryWeights, QualityScore};
    use approx::assert_relative_eq;
    use consensus_builder::ConsensusBuilder;
    use perspective_engine::PerspectiveEngine;

    fn pick(symbol: &str, f: f64, m: f64, r: f64, s: f64) -> ConsensusPick {
        let q = QualityScore::new(symbol, &CategoryWeights::new(0.4, 0.3, 0.2, 0.1), f, m, r, s, vec![]);
        let v = PerspectiveEngine::default().evaluate_all(&q);
        ConsensusBuilder::default().assess(q, v).unwrap()
    }

    fn output(probability: f64, confidence: f64) -> EnsembleOutput {
        EnsembleOutput {
            model_predictions: vec![],
            expected_return: 0.0,
            probability,
            confidence,
            attributions: vec![],
        }
    }

    #[test]
    fn test_blend_with_ensemble() {
        let blended = Blender::default().blend(pick("AAPL", 90.0, 60.0, 80.0, 70.0), Some(output(0.7, 0.5)));
        // 0.6 * 0.95 + 0.4 * 0.5
        assert_relative_eq!(blended.final_confidence(), 0.77, epsilon = 1e-9);
        // 0.4 * 77 + 0.3 * 80.5 + 0.3 * 70
        assert_relative_eq!(blended.ultimate_score(), 30.8 + 24.15 + 21.0, epsilon = 1e-9);
        assert!(!blended.is_degraded());
    }

    #[test]
    fn test_fallback_never_fails() {
        let blended = Blender::default().blend(pick("AAPL", 90.0, 60.0, 80.0, 70.0), None);
        assert_relative_eq!(blended.final_confidence(), 0.95);
        // 0.57 * 77 + 0.43 * 80.5
        assert_relative_eq!(blended.ultimate_score(), 43.89 + 34.615, epsilon = 1e-9);
        assert!(blended.is_degraded());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let blended = Blender::default().blend(pick("X", 90.0, 60.0, 80.0, 70.0), Some(output(0.5, 7.0)));
        assert_eq!(blended.final_confidence(), 1.0);
    }

    #[test]
    fn test_rank_by_agreement_then_probability() {
        let blender = Blender::default();
        // all four at BUY or better
        let strong = pick("STRONG", 90.0, 60.0, 80.0, 70.0);
        // three perspectives at BUY or better, risk-managed short of 80
        let buy_a = pick("BUYA", 95.0, 80.0, 60.0, 50.0);
        let buy_b = pick("BUYB", 95.0, 80.0, 60.0, 50.0);
        assert_eq!(buy_a.agreement_count(), 3);

        let ranked = rank(vec![
            blender.blend(buy_a, Some(output(0.6, 0.5))),
            blender.blend(strong, Some(output(0.1, 0.5))),
            blender.blend(buy_b, Some(output(0.9, 0.5))),
        ]);
        let order: Vec<&str> = ranked.iter().map(|p| p.symbol()).collect();
        assert_eq!(order, ["STRONG", "BUYB", "BUYA"]);
        assert_eq!(ranked.iter().map(|p| p.rank()).collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        let blender = Blender::default();
        let ranked = rank(vec![
            blender.blend(pick("FIRST", 90.0, 60.0, 80.0, 70.0), None),
            blender.blend(pick("SECOND", 90.0, 60.0, 80.0, 70.0), None),
        ]);
        assert_eq!(ranked[0].symbol(), "FIRST");
    }

    #[test]
    fn test_serialized_pick_has_tier_label() {
        let blended = Blender::default().blend(pick("AAPL", 90.0, 60.0, 80.0, 70.0), None);
        let json = serde_json::to_value(&blended).unwrap();
        assert_eq!(json["tier_label"], "STRONG BUY");
        assert_eq!(json["symbol"], "AAPL");
        assert!(json["ensemble"].is_null());
        assert!(json.get("sort_key").is_none());
    }
}
