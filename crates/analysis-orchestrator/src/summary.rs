use analysis_core::{MarketRegime, TierGates};
use serde::Serialize;

/// Counts reported for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Instruments in the input universe
    pub requested: usize,
    /// Instruments that produced a quality score
    pub scored: usize,
    /// Scored instruments with at least one imputed field
    pub partial: usize,
    /// Excluded for missing or unusable data
    pub data_insufficient: usize,
    /// Scored but not retained by the consensus gates
    pub consensus_dropped: usize,
    /// Whether an ensemble was available for this run
    pub ensemble_available: bool,
    /// Picks blended without an ensemble output
    pub ensemble_degraded: usize,
    pub guardrail_removed: usize,
    pub output: usize,
    pub regime: MarketRegime,
    /// Tier gates the consensus builder used
    pub gates: Option<TierGates>,
}

impl RunSummary {
    pub fn excluded(&self) -> usize {
        self.data_insufficient + self.consensus_dropped + self.guardrail_removed
    }
}
