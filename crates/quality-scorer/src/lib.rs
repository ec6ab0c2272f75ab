//! Quality scoring: raw feature snapshot to a 0-100 composite with four
//! graded category sub-scores.

pub mod normalize;

use analysis_core::{
    AnalysisError, Category, CategoryWeights, FeatureSnapshot, PolicyConfig, QualityScore,
    ScorerSettings,
};
use normalize::{Curve, Guard};
use tracing::debug;

/// One scored metric of a category.
struct MetricRule {
    name: &'static str,
    weight: f64,
    curve: Curve,
    guard: Guard,
    value: fn(&FeatureSnapshot) -> Option<f64>,
}

static FUNDAMENTALS: [MetricRule; 5] = [
    MetricRule {
        name: "pe_ratio",
        weight: 0.25,
        curve: Curve::Band { floor: 3.0, ideal_low: 12.0, ideal_high: 20.0, ceiling: 60.0 },
        guard: Guard::Positive,
        value: |s| s.pe_ratio,
    },
    MetricRule {
        name: "revenue_growth",
        weight: 0.20,
        curve: Curve::Linear { worst: -10.0, best: 30.0 },
        guard: Guard::None,
        value: |s| s.revenue_growth,
    },
    MetricRule {
        name: "profit_margin",
        weight: 0.20,
        curve: Curve::Linear { worst: -5.0, best: 25.0 },
        guard: Guard::None,
        value: |s| s.profit_margin,
    },
    MetricRule {
        name: "roe",
        weight: 0.20,
        curve: Curve::Linear { worst: 0.0, best: 25.0 },
        guard: Guard::None,
        value: |s| s.roe,
    },
    MetricRule {
        name: "debt_to_equity",
        weight: 0.15,
        curve: Curve::Linear { worst: 3.0, best: 0.2 },
        guard: Guard::NonNegative,
        value: |s| s.debt_to_equity,
    },
];

static MOMENTUM: [MetricRule; 4] = [
    MetricRule {
        name: "trend_strength",
        weight: 0.30,
        curve: Curve::Linear { worst: -20.0, best: 20.0 },
        guard: Guard::None,
        value: |s| s.trend_strength,
    },
    MetricRule {
        name: "rsi",
        weight: 0.25,
        curve: Curve::Band { floor: 20.0, ideal_low: 45.0, ideal_high: 65.0, ceiling: 85.0 },
        guard: Guard::None,
        value: |s| s.rsi,
    },
    MetricRule {
        name: "volume_trend",
        weight: 0.15,
        curve: Curve::Band { floor: 0.4, ideal_low: 1.0, ideal_high: 1.8, ceiling: 3.5 },
        guard: Guard::None,
        value: |s| s.volume_trend,
    },
    MetricRule {
        name: "relative_strength",
        weight: 0.30,
        curve: Curve::Linear { worst: -15.0, best: 15.0 },
        guard: Guard::None,
        value: |s| s.relative_strength,
    },
];

static RISK: [MetricRule; 3] = [
    MetricRule {
        name: "beta",
        weight: 0.35,
        curve: Curve::Band { floor: 0.0, ideal_low: 0.6, ideal_high: 1.1, ceiling: 2.5 },
        guard: Guard::None,
        value: |s| s.beta,
    },
    MetricRule {
        name: "max_drawdown",
        weight: 0.30,
        curve: Curve::Linear { worst: 50.0, best: 5.0 },
        guard: Guard::None,
        value: |s| s.max_drawdown.map(f64::abs),
    },
    MetricRule {
        name: "sharpe_ratio",
        weight: 0.35,
        curve: Curve::Linear { worst: -0.5, best: 2.0 },
        guard: Guard::None,
        value: |s| s.sharpe_ratio,
    },
];

static SENTIMENT: [MetricRule; 3] = [
    MetricRule {
        name: "institutional_ownership",
        weight: 0.30,
        curve: Curve::Band { floor: 5.0, ideal_low: 50.0, ideal_high: 85.0, ceiling: 110.0 },
        guard: Guard::None,
        value: |s| s.institutional_ownership,
    },
    MetricRule {
        name: "analyst_consensus",
        weight: 0.40,
        curve: Curve::Linear { worst: 1.0, best: 5.0 },
        guard: Guard::None,
        value: |s| s.analyst_consensus,
    },
    MetricRule {
        name: "target_upside",
        weight: 0.30,
        curve: Curve::Linear { worst: -20.0, best: 30.0 },
        guard: Guard::None,
        value: |s| s.target_upside,
    },
];

fn rules(category: Category) -> &'static [MetricRule] {
    match category {
        Category::Fundamentals => &FUNDAMENTALS,
        Category::Momentum => &MOMENTUM,
        Category::Risk => &RISK,
        Category::Sentiment => &SENTIMENT,
    }
}

/// Converts feature snapshots into quality scores under a fixed policy.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    weights: CategoryWeights,
    settings: ScorerSettings,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl QualityScorer {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            weights: config.quality,
            settings: config.scorer.clone(),
        }
    }

    /// Score one instrument.
    ///
    /// Missing or non-finite fields are imputed with the neutral score and the
    /// result is marked partial. A category whose missing share exceeds
    /// `max_missing_fraction` fails the whole instrument with `DataInsufficient`.
    pub fn score(&self, snapshot: &FeatureSnapshot) -> Result<QualityScore, AnalysisError> {
        let symbol = snapshot.symbol.as_str();
        let mut imputed = Vec::new();
        let mut category_scores = [0.0; 4];

        for (slot, category) in category_scores.iter_mut().zip(Category::ALL) {
            *slot = self.score_category(symbol, category, snapshot, &mut imputed)?;
        }

        let [fundamentals, momentum, risk, sentiment] = category_scores;
        let quality = QualityScore::new(
            symbol,
            &self.weights,
            fundamentals,
            momentum,
            risk,
            sentiment,
            imputed,
        );
        debug!(
            symbol,
            overall = quality.overall(),
            grade = quality.grade().as_str(),
            partial = quality.is_partial(),
            "Scored instrument"
        );
        Ok(quality)
    }

    fn score_category(
        &self,
        symbol: &str,
        category: Category,
        snapshot: &FeatureSnapshot,
        imputed: &mut Vec<String>,
    ) -> Result<f64, AnalysisError> {
        let rules = rules(category);
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        let mut missing = Vec::new();

        for rule in rules {
            let normalized = match (rule.value)(snapshot).filter(|v| v.is_finite()) {
                Some(v) => rule.curve.score(v, rule.guard),
                None => {
                    missing.push(rule.name);
                    self.settings.neutral_score
                }
            };
            weighted += rule.weight * normalized;
            total_weight += rule.weight;
        }

        let missing_fraction = missing.len() as f64 / rules.len() as f64;
        if missing_fraction > self.settings.max_missing_fraction {
            return Err(AnalysisError::insufficient(
                symbol,
                format!(
                    "{} of {} {} fields missing ({})",
                    missing.len(),
                    rules.len(),
                    category.name(),
                    missing.join(", ")
                ),
            ));
        }
        imputed.extend(missing.into_iter().map(String::from));

        Ok(weighted / total_weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::Grade;
    use approx::assert_relative_eq;

    fn strong_snapshot() -> FeatureSnapshot {
        FeatureSnapshot {
            pe_ratio: Some(16.0),
            revenue_growth: Some(30.0),
            profit_margin: Some(25.0),
            roe: Some(25.0),
            debt_to_equity: Some(0.2),
            trend_strength: Some(20.0),
            rsi: Some(55.0),
            volume_trend: Some(1.2),
            relative_strength: Some(15.0),
            beta: Some(0.9),
            max_drawdown: Some(5.0),
            sharpe_ratio: Some(2.0),
            institutional_ownership: Some(70.0),
            analyst_consensus: Some(5.0),
            target_upside: Some(30.0),
            ..FeatureSnapshot::new("NVDA")
        }
    }

    #[test]
    fn test_ideal_snapshot_scores_100() {
        let qs = QualityScorer::default().score(&strong_snapshot()).unwrap();
        assert_relative_eq!(qs.overall(), 100.0, epsilon = 1e-9);
        assert_eq!(qs.grade(), Grade::APlus);
        assert!(!qs.is_partial());
    }

    #[test]
    fn test_negative_earnings_zeroes_pe() {
        let mut snap = strong_snapshot();
        snap.pe_ratio = Some(-12.0);
        let qs = QualityScorer::default().score(&snap).unwrap();
        assert_relative_eq!(qs.category(Category::Fundamentals), 75.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_missing_field_is_imputed() {
        let mut snap = strong_snapshot();
        snap.rsi = None;
        let qs = QualityScorer::default().score(&snap).unwrap();
        assert!(qs.is_partial());
        assert_eq!(qs.imputed_fields(), &["rsi".to_string()]);
        // 0.25 * 50 + 0.75 * 100
        assert_relative_eq!(qs.category(Category::Momentum), 87.5, epsilon = 1e-9);
    }

    #[test]
    fn test_non_finite_counts_as_missing() {
        let mut snap = strong_snapshot();
        snap.beta = Some(f64::NAN);
        let qs = QualityScorer::default().score(&snap).unwrap();
        assert_eq!(qs.imputed_fields(), &["beta".to_string()]);
    }

    #[test]
    fn test_sparse_category_is_insufficient() {
        let mut snap = strong_snapshot();
        snap.analyst_consensus = None;
        snap.target_upside = None;
        let err = QualityScorer::default().score(&snap).unwrap_err();
        match err {
            AnalysisError::DataInsufficient { symbol, reason } => {
                assert_eq!(symbol, "NVDA");
                assert!(reason.contains("sentiment"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_half_missing_is_tolerated() {
        let mut snap = strong_snapshot();
        snap.rsi = None;
        snap.volume_trend = None;
        assert!(QualityScorer::default().score(&snap).is_ok());
    }

    #[test]
    fn test_empty_snapshot_is_insufficient() {
        let result = QualityScorer::default().score(&FeatureSnapshot::new("EMPTY"));
        assert!(matches!(result, Err(AnalysisError::DataInsufficient { .. })));
    }

    #[test]
    fn test_overall_stays_in_range() {
        let snap = FeatureSnapshot {
            pe_ratio: Some(500.0),
            revenue_growth: Some(-90.0),
            profit_margin: Some(-60.0),
            roe: Some(-40.0),
            debt_to_equity: Some(12.0),
            trend_strength: Some(-70.0),
            rsi: Some(99.0),
            volume_trend: Some(9.0),
            relative_strength: Some(-50.0),
            beta: Some(4.0),
            max_drawdown: Some(-95.0),
            sharpe_ratio: Some(-3.0),
            institutional_ownership: Some(1.0),
            analyst_consensus: Some(1.0),
            target_upside: Some(-60.0),
            ..FeatureSnapshot::new("JUNK")
        };
        let qs = QualityScorer::default().score(&snap).unwrap();
        assert_eq!(qs.overall(), 0.0);
        assert_eq!(qs.grade(), Grade::F);
    }
}
