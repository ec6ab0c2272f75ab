use std::collections::BTreeMap;
use std::path::Path;

use analysis_core::{AnalysisError, FeatureSnapshot, MarketContext, MarketRegime, SnapshotSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// JSON document handed to the runner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunInput {
    pub market: MarketContext,
    /// Derive the regime from the volatility index and trend instead of
    /// trusting `market.regime`
    pub derive_regime: bool,
    /// Symbols to run; defaults to every symbol in `snapshots`. A listed
    /// symbol without a snapshot is reported as data-insufficient.
    pub universe: Option<Vec<String>>,
    pub snapshots: Vec<FeatureSnapshot>,
}

impl RunInput {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run input {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("failed to parse run input {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut input: RunInput = serde_json::from_str(raw)?;
        if input.derive_regime {
            input.market.regime =
                MarketRegime::from_indicators(input.market.volatility_index, input.market.trend);
        }
        Ok(input)
    }

    pub fn symbols(&self) -> Vec<String> {
        match &self.universe {
            Some(universe) => universe.clone(),
            None => self.snapshots.iter().map(|s| s.symbol.clone()).collect(),
        }
    }

    /// Snapshots keyed by symbol, served through the `SnapshotSource` seam.
    pub fn into_source(self) -> FixtureSource {
        FixtureSource {
            snapshots: self
                .snapshots
                .into_iter()
                .map(|s| (s.symbol.clone(), s))
                .collect(),
        }
    }
}

/// In-memory snapshot source backed by the run input file.
pub struct FixtureSource {
    snapshots: BTreeMap<String, FeatureSnapshot>,
}

#[async_trait]
impl SnapshotSource for FixtureSource {
    async fn fetch(&self, symbol: &str) -> Result<Option<FeatureSnapshot>, AnalysisError> {
        Ok(self.snapshots.get(symbol).cloned())
    }
}
