//! Consensus building
//!
//! Counts how many perspectives reached buy-or-better, applies the
//! tier-specific score gates and orders the surviving picks.

use analysis_core::stats::{mean, population_variance};
use analysis_core::{
    meets_threshold, ConsensusSettings, ConsensusTier, PolicyConfig, QualityScore, TierGates,
};
use perspective_engine::VerdictSet;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// An instrument that survived the consensus gates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusPick {
    symbol: String,
    quality: QualityScore,
    verdicts: VerdictSet,
    agreement_count: u8,
    consensus_score: f64,
    score_variance: f64,
    tier: ConsensusTier,
    confidence: f64,
}

impl ConsensusPick {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn quality(&self) -> &QualityScore {
        &self.quality
    }

    pub fn verdicts(&self) -> &VerdictSet {
        &self.verdicts
    }

    /// Number of perspectives at BUY or STRONG_BUY, 2..=4 for a retained pick
    pub fn agreement_count(&self) -> u8 {
        self.agreement_count
    }

    /// Mean of the four weighted perspective scores
    pub fn consensus_score(&self) -> f64 {
        self.consensus_score
    }

    /// Population variance of the four weighted perspective scores
    pub fn score_variance(&self) -> f64 {
        self.score_variance
    }

    pub fn tier(&self) -> ConsensusTier {
        self.tier
    }

    /// Quant confidence attached to the tier
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// Why a candidate did not make the consensus list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DropReason {
    /// One or zero perspectives at buy-or-better
    LowAgreement(u8),
    /// Enough agreement, but the consensus score missed the tier gate
    BelowGate { tier: ConsensusTier, gate: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedCandidate {
    pub symbol: String,
    pub consensus_score: f64,
    pub reason: DropReason,
}

/// Ordered picks plus every candidate that was filtered out.
#[derive(Debug, Clone, Default)]
pub struct ConsensusReport {
    pub picks: Vec<ConsensusPick>,
    pub dropped: Vec<DroppedCandidate>,
}

/// Tier for an agreement count and consensus score under `gates`.
///
/// STRONG BUY is never gated; BUY and WEAK BUY need the consensus score to
/// reach their gate (inclusive). Returns the tier or the reason it was denied.
pub fn classify(
    agreement_count: u8,
    consensus_score: f64,
    gates: &TierGates,
) -> Result<ConsensusTier, DropReason> {
    let tier = ConsensusTier::from_agreement(agreement_count)
        .ok_or(DropReason::LowAgreement(agreement_count))?;
    let gate = match tier {
        ConsensusTier::StrongBuy => return Ok(tier),
        ConsensusTier::Buy => gates.buy,
        ConsensusTier::WeakBuy => gates.weak_buy,
    };
    if meets_threshold(consensus_score, gate) {
        Ok(tier)
    } else {
        Err(DropReason::BelowGate { tier, gate })
    }
}

pub struct ConsensusBuilder {
    settings: ConsensusSettings,
}

impl Default for ConsensusBuilder {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl ConsensusBuilder {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            settings: config.consensus.clone(),
        }
    }

    /// Use regime-adjusted gates for this run.
    pub fn with_gates(mut self, gates: TierGates) -> Self {
        self.settings.gates = gates;
        self
    }

    pub fn gates(&self) -> TierGates {
        self.settings.gates
    }

    fn confidence_for(&self, tier: ConsensusTier) -> f64 {
        match tier {
            ConsensusTier::StrongBuy => self.settings.strong_buy_confidence,
            ConsensusTier::Buy => self.settings.buy_confidence,
            ConsensusTier::WeakBuy => self.settings.weak_buy_confidence,
        }
    }

    /// Assess one instrument.
    pub fn assess(
        &self,
        quality: QualityScore,
        verdicts: VerdictSet,
    ) -> Result<ConsensusPick, DroppedCandidate> {
        let agreement_count = verdicts
            .iter()
            .filter(|v| v.recommendation().is_buy_or_better())
            .count() as u8;
        let scores = verdicts.map(|v| v.weighted_score());
        let consensus_score = mean(&scores);
        let score_variance = population_variance(&scores);
        let symbol = quality.symbol().to_string();

        match classify(agreement_count, consensus_score, &self.settings.gates) {
            Ok(tier) => Ok(ConsensusPick {
                symbol,
                quality,
                verdicts,
                agreement_count,
                consensus_score,
                score_variance,
                tier,
                confidence: self.confidence_for(tier),
            }),
            Err(reason) => Err(DroppedCandidate {
                symbol,
                consensus_score,
                reason,
            }),
        }
    }

    /// Assess every candidate and return the ordered consensus list.
    pub fn build<I>(&self, candidates: I) -> ConsensusReport
    where
        I: IntoIterator<Item = (QualityScore, VerdictSet)>,
    {
        let mut report = ConsensusReport::default();
        for (quality, verdicts) in candidates {
            match self.assess(quality, verdicts) {
                Ok(pick) => report.picks.push(pick),
                Err(dropped) => {
                    debug!(
                        symbol = %dropped.symbol,
                        consensus_score = dropped.consensus_score,
                        reason = ?dropped.reason,
                        "Dropped from consensus"
                    );
                    report.dropped.push(dropped);
                }
            }
        }

        report.picks.sort_by(compare_picks);

        info!(
            retained = report.picks.len(),
            dropped = report.dropped.len(),
            buy_gate = self.settings.gates.buy,
            weak_buy_gate = self.settings.gates.weak_buy,
            "Consensus built"
        );
        report
    }
}

/// Tier, then consensus score descending, then variance ascending, then symbol.
pub fn compare_picks(a: &ConsensusPick, b: &ConsensusPick) -> Ordering {
    a.tier
        .cmp(&b.tier)
        .then_with(|| b.consensus_score.total_cmp(&a.consensus_score))
        .then_with(|| a.score_variance.total_cmp(&b.score_variance))
        .then_with(|| a.symbol.cmp(&b.symbol))
}
