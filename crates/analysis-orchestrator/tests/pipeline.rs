use std::collections::BTreeMap;
use std::sync::Arc;

use analysis_core::{
    AnalysisError, CancellationFlag, ConsensusTier, EnsembleOutput,
    FeatureSnapshot, MarketContext, MarketRegime, PolicyConfig, QualityScore, Recommendation,
    ReturnPredictor,
};
use analysis_orchestrator::{Blender, ConsensusPipeline, RunOutput};
use approx::assert_relative_eq;
use consensus_builder::ConsensusBuilder;
use perspective_engine::PerspectiveEngine;

fn strong(symbol: &str, sector: Option<&str>) -> FeatureSnapshot {
    FeatureSnapshot {
        symbol: symbol.to_string(),
        pe_ratio: Some(18.0),
        revenue_growth: Some(25.0),
        profit_margin: Some(25.0),
        roe: Some(25.0),
        debt_to_equity: Some(0.3),
        trend_strength: Some(10.0),
        rsi: Some(55.0),
        volume_trend: Some(1.3),
        relative_strength: Some(10.0),
        beta: Some(1.0),
        max_drawdown: Some(10.0),
        sharpe_ratio: Some(2.0),
        institutional_ownership: Some(70.0),
        analyst_consensus: Some(4.5),
        target_upside: Some(20.0),
        price: Some(150.0),
        avg_dollar_volume: Some(5.0e8),
        return_1m: Some(3.0),
        return_3m: Some(8.0),
        volatility: Some(22.0),
        sector: sector.map(String::from),
    }
}

fn weak(symbol: &str) -> FeatureSnapshot {
    FeatureSnapshot {
        symbol: symbol.to_string(),
        pe_ratio: Some(40.0),
        revenue_growth: Some(0.0),
        profit_margin: Some(5.0),
        roe: Some(5.0),
        debt_to_equity: Some(2.0),
        trend_strength: Some(-10.0),
        rsi: Some(80.0),
        volume_trend: Some(0.5),
        relative_strength: Some(-10.0),
        beta: Some(2.0),
        max_drawdown: Some(40.0),
        sharpe_ratio: Some(0.0),
        institutional_ownership: Some(20.0),
        analyst_consensus: Some(2.0),
        target_upside: Some(-5.0),
        ..Default::default()
    }
}

fn universe(entries: Vec<(&str, Option<FeatureSnapshot>)>) -> BTreeMap<String, Option<FeatureSnapshot>> {
    entries.into_iter().map(|(s, snap)| (s.to_string(), snap)).collect()
}

fn quant_only() -> PolicyConfig {
    let mut config = PolicyConfig::default();
    config.ensemble.enabled = false;
    config
}

/// Probability keyed by symbol; `FAIL` errors.
struct FixedPredictor;

impl ReturnPredictor for FixedPredictor {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict(
        &self,
        quality: &QualityScore,
        _snapshot: &FeatureSnapshot,
        _market: &MarketContext,
    ) -> Result<EnsembleOutput, AnalysisError> {
        let probability = match quality.symbol() {
            "FAIL" => return Err(AnalysisError::InvalidData("no features".into())),
            "LOW" => 0.2,
            _ => 0.8,
        };
        Ok(EnsembleOutput {
            model_predictions: vec![],
            expected_return: 0.0,
            probability,
            confidence: 0.6,
            attributions: vec![],
        })
    }
}

fn run(pipeline: &ConsensusPipeline, input: &BTreeMap<String, Option<FeatureSnapshot>>, market: &MarketContext) -> RunOutput {
    pipeline.run(input, market, &CancellationFlag::new()).unwrap()
}

#[test]
fn worked_example_is_strong_buy() {
    let config = PolicyConfig::default();
    let quality = QualityScore::new("AAPL", &config.quality, 90.0, 60.0, 80.0, 70.0, vec![]);
    let verdicts = PerspectiveEngine::new(&config).evaluate_all(&quality);
    let scores: Vec<f64> = verdicts.iter().map(|v| v.weighted_score()).collect();
    for (got, want) in scores.iter().zip([84.0, 73.0, 83.0, 82.0]) {
        assert_relative_eq!(*got, want, epsilon = 1e-9);
    }
    assert!(verdicts.iter().all(|v| v.recommendation() == Recommendation::Buy));

    let pick = ConsensusBuilder::new(&config).assess(quality, verdicts).unwrap();
    assert_eq!(pick.tier(), ConsensusTier::StrongBuy);
    assert_eq!(pick.agreement_count(), 4);
    assert_relative_eq!(pick.consensus_score(), 80.5, epsilon = 1e-9);

    let blended = Blender::new(&config).blend(pick, None);
    assert_relative_eq!(blended.final_confidence(), 0.95);
}

#[test]
fn quant_only_run_counts_every_exclusion() {
    let pipeline = ConsensusPipeline::new(quant_only()).unwrap();
    assert!(!pipeline.has_predictor());

    let mut partial = strong("PART", Some("Technology"));
    partial.rsi = None;
    partial.beta = None;
    partial.target_upside = None;
    let mut sparse = FeatureSnapshot::new("SPARSE");
    sparse.pe_ratio = Some(15.0);

    let input = universe(vec![
        ("AAPL", Some(strong("AAPL", Some("Technology")))),
        ("GONE", None),
        ("PART", Some(partial)),
        ("SPARSE", Some(sparse)),
        ("WEAK", Some(weak("WEAK"))),
    ]);
    let out = run(&pipeline, &input, &MarketContext::default());

    let s = &out.summary;
    assert_eq!(s.requested, 5);
    assert_eq!(s.data_insufficient, 2);
    assert_eq!(s.scored, 3);
    assert_eq!(s.partial, 1);
    assert_eq!(s.consensus_dropped, 1);
    assert!(!s.ensemble_available);
    assert_eq!(s.ensemble_degraded, 2);
    assert_eq!(s.output, 2);
    assert_eq!(s.excluded(), 3);

    let symbols: Vec<&str> = out.picks.iter().map(|p| p.symbol()).collect();
    assert_eq!(symbols, ["AAPL", "PART"]);
    assert!(out.picks.iter().all(|p| p.is_degraded()));
    assert_eq!(out.picks[0].rank(), 1);
    assert_eq!(out.picks[0].final_confidence(), 0.95);
}

#[test]
fn predictor_failure_degrades_only_that_pick() {
    let pipeline = ConsensusPipeline::new(quant_only())
        .unwrap()
        .with_predictor(Arc::new(FixedPredictor));
    let input = universe(vec![
        ("FAIL", Some(strong("FAIL", None))),
        ("HIGH", Some(strong("HIGH", None))),
        ("LOW", Some(strong("LOW", None))),
    ]);
    let out = run(&pipeline, &input, &MarketContext::default());

    assert!(out.summary.ensemble_available);
    assert_eq!(out.summary.ensemble_degraded, 1);
    // same agreement and consensus score: 0.8 ahead of the neutral 0.5, then 0.2
    let symbols: Vec<&str> = out.picks.iter().map(|p| p.symbol()).collect();
    assert_eq!(symbols, ["HIGH", "FAIL", "LOW"]);
    assert!(out.picks[1].is_degraded());
    assert_relative_eq!(out.picks[0].final_confidence(), 0.6 * 0.95 + 0.4 * 0.6, epsilon = 1e-9);
}

#[test]
fn bear_regime_keeps_defensive_sectors() {
    let mut config = quant_only();
    config.guardrail.min_price = 5.0;
    let pipeline = ConsensusPipeline::new(config).unwrap();

    let mut penny = strong("PENNY", Some("Utilities"));
    penny.price = Some(2.0);
    let input = universe(vec![
        ("MSFT", Some(strong("MSFT", Some("Technology")))),
        ("DUK", Some(strong("DUK", Some("Utilities")))),
        ("JNJ", Some(strong("JNJ", Some("health care")))),
        ("NOSECT", Some(strong("NOSECT", None))),
        ("PENNY", Some(penny)),
    ]);
    let market = MarketContext {
        regime: MarketRegime::Bear,
        ..Default::default()
    };
    let out = run(&pipeline, &input, &market);

    let symbols: Vec<&str> = out.picks.iter().map(|p| p.symbol()).collect();
    assert_eq!(symbols, ["DUK", "JNJ"]);
    assert_eq!(out.picks.iter().map(|p| p.rank()).collect::<Vec<_>>(), [1, 2]);
    assert_eq!(out.summary.guardrail_removed, 3);
    assert_eq!(out.summary.regime, MarketRegime::Bear);
    let gates = out.summary.gates.unwrap();
    assert_relative_eq!(gates.buy, 80.0);
    assert_relative_eq!(gates.weak_buy, 75.0);
}

#[test]
fn identical_input_serializes_identically() {
    let mut config = PolicyConfig::default();
    config.ensemble.synthetic_samples = 200;
    config.ensemble.seed = 11;
    let first = ConsensusPipeline::initialize(config.clone()).unwrap();
    let second = ConsensusPipeline::initialize(config).unwrap();
    assert!(first.has_predictor());

    let input = universe(vec![
        ("AAPL", Some(strong("AAPL", Some("Technology")))),
        ("KO", Some(strong("KO", Some("Consumer Staples")))),
        ("WEAK", Some(weak("WEAK"))),
    ]);
    let market = MarketContext::default();

    let a = serde_json::to_string(&run(&first, &input, &market)).unwrap();
    let b = serde_json::to_string(&run(&first, &input, &market)).unwrap();
    let c = serde_json::to_string(&run(&second, &input, &market)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
}

#[test]
fn ensemble_disabled_falls_back() {
    let pipeline = ConsensusPipeline::initialize(quant_only()).unwrap();
    assert!(!pipeline.has_predictor());
    let input = universe(vec![("AAPL", Some(strong("AAPL", None)))]);
    let out = run(&pipeline, &input, &MarketContext::default());
    assert_eq!(out.picks.len(), 1);
    assert!(out.picks[0].ensemble().is_none());
}

#[test]
fn empty_universe() {
    let pipeline = ConsensusPipeline::new(quant_only()).unwrap();
    let out = run(&pipeline, &BTreeMap::new(), &MarketContext::default());
    assert!(out.picks.is_empty());
    assert_eq!(out.summary.requested, 0);
}
