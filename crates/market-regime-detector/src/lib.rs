//! Regime guardrail.
//!
//! Tightens or relaxes the consensus tier gates from the market regime, keeps
//! only defensive sectors in a bear market and drops picks that fail the
//! tradability floors.

use analysis_core::{
    FeatureSnapshot, GuardrailSettings, MarketContext, MarketRegime, PolicyConfig, TierGates,
};
use serde::Serialize;
use tracing::{debug, info};

/// Gate adjustment chosen for a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegimeAdjustment {
    pub regime: MarketRegime,
    /// Signed change applied to every gate (positive tightens)
    pub gate_delta: f64,
    pub gates: TierGates,
    pub defensive_only: bool,
}

impl RegimeAdjustment {
    pub fn reasoning(&self) -> String {
        format!(
            "{} regime (gate delta {:+.1}, BUY gate {:.1}, WEAK BUY gate {:.1}{})",
            self.regime.name(),
            self.gate_delta,
            self.gates.buy,
            self.gates.weak_buy,
            if self.defensive_only { ", defensive sectors only" } else { "" }
        )
    }
}

/// Why an instrument was removed by the guardrail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GuardrailRejection {
    NonDefensiveSector { sector: Option<String> },
    BelowMinPrice { price: Option<f64>, floor: f64 },
    BelowMinDollarVolume { dollar_volume: Option<f64>, floor: f64 },
}

/// Items kept in their original order, plus the removed symbols.
#[derive(Debug, Clone)]
pub struct GuardrailOutcome<T> {
    pub kept: Vec<T>,
    pub removed: Vec<(String, GuardrailRejection)>,
}

/// A floor of 0 disables the check; with a positive floor a missing value fails.
fn meets_floor(value: Option<f64>, floor: f64) -> bool {
    floor <= 0.0 || value.is_some_and(|v| v.is_finite() && v >= floor)
}

pub struct RegimeGuardrail {
    settings: GuardrailSettings,
}

impl Default for RegimeGuardrail {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl RegimeGuardrail {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            settings: config.guardrail.clone(),
        }
    }

    /// Gates the consensus builder should use for a run in `market`.
    pub fn adjust(&self, base: TierGates, market: &MarketContext) -> RegimeAdjustment {
        let regime = market.regime;
        let gate_delta = if !self.settings.enabled {
            0.0
        } else {
            match regime {
                MarketRegime::Bear => self.settings.bear_gate_margin,
                MarketRegime::Bull => -self.settings.bull_gate_margin,
                MarketRegime::Neutral => 0.0,
            }
        };
        let adjustment = RegimeAdjustment {
            regime,
            gate_delta,
            gates: base.shifted(gate_delta),
            defensive_only: self.settings.enabled && regime == MarketRegime::Bear,
        };
        info!("Regime guardrail: {}", adjustment.reasoning());
        adjustment
    }

    fn is_defensive(&self, sector: Option<&str>) -> bool {
        sector.is_some_and(|s| {
            let s = s.trim();
            self.settings
                .defensive_sectors
                .iter()
                .any(|d| d.trim().eq_ignore_ascii_case(s))
        })
    }

    /// Check one instrument against the sector filter and tradability floors.
    pub fn screen(
        &self,
        snapshot: &FeatureSnapshot,
        adjustment: &RegimeAdjustment,
    ) -> Result<(), GuardrailRejection> {
        if !self.settings.enabled {
            return Ok(());
        }
        if adjustment.defensive_only && !self.is_defensive(snapshot.sector.as_deref()) {
            return Err(GuardrailRejection::NonDefensiveSector {
                sector: snapshot.sector.clone(),
            });
        }
        if !meets_floor(snapshot.price, self.settings.min_price) {
            return Err(GuardrailRejection::BelowMinPrice {
                price: snapshot.price,
                floor: self.settings.min_price,
            });
        }
        if !meets_floor(snapshot.avg_dollar_volume, self.settings.min_avg_dollar_volume) {
            return Err(GuardrailRejection::BelowMinDollarVolume {
                dollar_volume: snapshot.avg_dollar_volume,
                floor: self.settings.min_avg_dollar_volume,
            });
        }
        Ok(())
    }

    /// Filter a ranked list. Only removes entries; relative order is preserved.
    pub fn apply<T, F>(
        &self,
        ranked: Vec<T>,
        adjustment: &RegimeAdjustment,
        snapshot_of: F,
    ) -> GuardrailOutcome<T>
    where
        F: Fn(&T) -> &FeatureSnapshot,
    {
        let mut kept = Vec::with_capacity(ranked.len());
        let mut removed = Vec::new();
        for item in ranked {
            let snapshot = snapshot_of(&item);
            match self.screen(snapshot, adjustment) {
                Ok(()) => kept.push(item),
                Err(reason) => {
                    debug!(symbol = %snapshot.symbol, ?reason, "Removed by guardrail");
                    removed.push((snapshot.symbol.clone(), reason));
                }
            }
        }
        if !removed.is_empty() {
            info!(kept = kept.len(), removed = removed.len(), "Guardrail filtered picks");
        }
        GuardrailOutcome { kept, removed }
    }
}
