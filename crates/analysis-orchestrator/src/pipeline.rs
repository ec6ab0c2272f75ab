//! End-to-end consensus run: score, evaluate, build consensus, predict, blend,
//! rank and guard.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use analysis_core::{
    AnalysisError, CancellationFlag, EnsembleOutput, FeatureSnapshot, MarketContext, PolicyConfig,
    QualityScore, ReturnPredictor,
};
use consensus_builder::ConsensusBuilder;
use ensemble_predictor::EnsembleLoader;
use market_regime_detector::RegimeGuardrail;
use perspective_engine::{PerspectiveEngine, VerdictSet};
use quality_scorer::QualityScorer;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blending::{assign_ranks, rank, Blender, RankedPick};
use crate::summary::RunSummary;

/// Ordered picks and the counts for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub picks: Vec<RankedPick>,
    pub summary: RunSummary,
}

pub struct ConsensusPipeline {
    config: PolicyConfig,
    scorer: QualityScorer,
    perspectives: PerspectiveEngine,
    blender: Blender,
    guardrail: RegimeGuardrail,
    predictor: Option<Arc<dyn ReturnPredictor>>,
}

impl ConsensusPipeline {
    /// Quant-only pipeline. Fails with `ConfigurationError` on a corrupt policy.
    pub fn new(config: PolicyConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            scorer: QualityScorer::new(&config),
            perspectives: PerspectiveEngine::new(&config),
            blender: Blender::new(&config),
            guardrail: RegimeGuardrail::new(&config),
            predictor: None,
            config,
        })
    }

    /// Pipeline with the six-model ensemble loaded or trained from `config`.
    /// An unavailable ensemble is logged and the pipeline runs quant-only.
    pub fn initialize(config: PolicyConfig) -> Result<Self, AnalysisError> {
        let pipeline = Self::new(config)?;
        match EnsembleLoader::initialize(&pipeline.config.ensemble) {
            Ok(predictor) => Ok(pipeline.with_predictor(Arc::new(predictor))),
            Err(e) => {
                warn!("Ensemble unavailable, using quant-only blending: {}", e);
                Ok(pipeline)
            }
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn ReturnPredictor>) -> Self {
        info!(predictor = predictor.name(), "Return predictor attached");
        self.predictor = Some(predictor);
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn has_predictor(&self) -> bool {
        self.predictor.is_some()
    }

    /// Run the full pipeline over `snapshots`. A `None` entry is a symbol the
    /// data layer could not supply.
    ///
    /// Per-instrument failures are counted in the summary and never abort the
    /// run. Returns `Cancelled` if `cancel` is raised before the run finishes.
    pub fn run(
        &self,
        snapshots: &BTreeMap<String, Option<FeatureSnapshot>>,
        market: &MarketContext,
        cancel: &CancellationFlag,
    ) -> Result<RunOutput, AnalysisError> {
        let mut summary = RunSummary {
            requested: snapshots.len(),
            ensemble_available: self.predictor.is_some(),
            regime: market.regime,
            ..Default::default()
        };

        let adjustment = self.guardrail.adjust(self.config.consensus.gates, market);
        summary.gates = Some(adjustment.gates);
        let builder = ConsensusBuilder::new(&self.config).with_gates(adjustment.gates);

        // the map key is authoritative for the symbol
        let mut available: Vec<Cow<'_, FeatureSnapshot>> = Vec::with_capacity(snapshots.len());
        for (symbol, snapshot) in snapshots {
            match snapshot {
                Some(s) if s.symbol == *symbol => available.push(Cow::Borrowed(s)),
                Some(s) => {
                    let mut owned = s.clone();
                    owned.symbol = symbol.clone();
                    available.push(Cow::Owned(owned));
                }
                None => {
                    warn!("Excluding {}: no snapshot", symbol);
                    summary.data_insufficient += 1;
                }
            }
        }

        let scored: Vec<Result<(QualityScore, VerdictSet), AnalysisError>> = available
            .par_iter()
            .map(|snapshot| {
                if cancel.is_cancelled() {
                    return Err(AnalysisError::Cancelled);
                }
                let quality = self.scorer.score(snapshot)?;
                let verdicts = self.perspectives.evaluate_all(&quality);
                debug!(
                    symbol = %quality.symbol(),
                    overall = quality.overall(),
                    grade = quality.grade().as_str(),
                    "Scored"
                );
                Ok((quality, verdicts))
            })
            .collect();

        let mut candidates = Vec::with_capacity(scored.len());
        for result in scored {
            match result {
                Ok(candidate) => candidates.push(candidate),
                Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(e) => {
                    warn!("Excluding instrument: {}", e);
                    summary.data_insufficient += 1;
                }
            }
        }
        summary.scored = candidates.len();
        summary.partial = candidates.iter().filter(|(q, _)| q.is_partial()).count();
        info!(
            scored = summary.scored,
            partial = summary.partial,
            excluded = summary.data_insufficient,
            "Quality scoring complete"
        );

        let report = builder.build(candidates);
        summary.consensus_dropped = report.dropped.len();

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let by_symbol: BTreeMap<&str, &FeatureSnapshot> =
            available.iter().map(|s| (s.symbol.as_str(), &**s)).collect();

        let predictions: Vec<Option<EnsembleOutput>> = report
            .picks
            .par_iter()
            .map(|pick| {
                if cancel.is_cancelled() {
                    return Err(AnalysisError::Cancelled);
                }
                let (Some(predictor), Some(snapshot)) =
                    (self.predictor.as_ref(), by_symbol.get(pick.symbol()))
                else {
                    return Ok(None);
                };
                match predictor.predict(pick.quality(), snapshot, market) {
                    Ok(output) => Ok(Some(output)),
                    Err(e) => {
                        warn!("Ensemble failed for {}, using quant-only blend: {}", pick.symbol(), e);
                        Ok(None)
                    }
                }
            })
            .collect::<Result<_, AnalysisError>>()?;

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let blended: Vec<RankedPick> = report
            .picks
            .into_iter()
            .zip(predictions)
            .map(|(pick, output)| self.blender.blend(pick, output))
            .collect();
        summary.ensemble_degraded = blended.iter().filter(|p| p.is_degraded()).count();
        let ranked = rank(blended);

        let paired: Vec<(RankedPick, &FeatureSnapshot)> = ranked
            .into_iter()
            .filter_map(|pick| {
                let snapshot = by_symbol.get(pick.symbol()).copied()?;
                Some((pick, snapshot))
            })
            .collect();
        let outcome = self
            .guardrail
            .apply(paired, &adjustment, |item| item.1);
        summary.guardrail_removed = outcome.removed.len();

        let picks = assign_ranks(outcome.kept.into_iter().map(|(pick, _)| pick).collect());
        summary.output = picks.len();

        info!(
            requested = summary.requested,
            output = summary.output,
            dropped = summary.consensus_dropped,
            degraded = summary.ensemble_degraded,
            guardrail_removed = summary.guardrail_removed,
            "Consensus run complete"
        );
        Ok(RunOutput { picks, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong_snapshot(symbol: &str) -> FeatureSnapshot {
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
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_policy() {
        let mut config = PolicyConfig::default();
        config.quality.fundamentals = 0.9;
        assert!(matches!(
            ConsensusPipeline::new(config),
            Err(AnalysisError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_key_overrides_snapshot_symbol() {
        let pipeline = ConsensusPipeline::new(PolicyConfig::default()).unwrap();
        let mut input = BTreeMap::new();
        input.insert("MSFT".to_string(), Some(strong_snapshot("")));
        let out = pipeline
            .run(&input, &MarketContext::default(), &CancellationFlag::new())
            .unwrap();
        assert_eq!(out.picks.len(), 1);
        assert_eq!(out.picks[0].symbol(), "MSFT");
    }

    #[test]
    fn test_cancelled_run() {
        let pipeline = ConsensusPipeline::new(PolicyConfig::default()).unwrap();
        let mut input = BTreeMap::new();
        input.insert("AAPL".to_string(), Some(strong_snapshot("AAPL")));
        let cancel = CancellationFlag::new();
        cancel.cancel();
        assert_eq!(
            pipeline.run(&input, &MarketContext::default(), &cancel).unwrap_err(),
            AnalysisError::Cancelled
        );
    }

    /// Raises the run's cancel flag from inside inference.
    struct CancellingPredictor {
        cancel: CancellationFlag,
    }

    impl ReturnPredictor for CancellingPredictor {
        fn name(&self) -> &str {
            "cancelling"
        }

        fn predict(
            &self,
            _quality: &QualityScore,
            _snapshot: &FeatureSnapshot,
            _market: &MarketContext,
        ) -> Result<EnsembleOutput, AnalysisError> {
            self.cancel.cancel();
            Ok(EnsembleOutput {
                model_predictions: vec![],
                expected_return: 0.0,
                probability: 0.5,
                confidence: 0.5,
                attributions: vec![],
            })
        }
    }

    #[test]
    fn test_cancel_during_inference() {
        let cancel = CancellationFlag::new();
        let mut config = PolicyConfig::default();
        config.ensemble.enabled = false;
        let pipeline = ConsensusPipeline::new(config)
            .unwrap()
            .with_predictor(Arc::new(CancellingPredictor { cancel: cancel.clone() }));
        let input: BTreeMap<String, Option<FeatureSnapshot>> = ["AAPL", "MSFT", "NVDA"]
            .iter()
            .map(|s| (s.to_string(), Some(strong_snapshot(s))))
            .collect();
        assert_eq!(
            pipeline.run(&input, &MarketContext::default(), &cancel).unwrap_err(),
            AnalysisError::Cancelled
        );
    }
}
