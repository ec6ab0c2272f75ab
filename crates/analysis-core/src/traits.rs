use async_trait::async_trait;
use crate::{AnalysisError, EnsembleOutput, FeatureSnapshot, MarketContext, QualityScore};

/// Source of per-instrument snapshots (data vendor, cache, fixture file).
///
/// `Ok(None)` means the vendor has no record for the symbol.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<Option<FeatureSnapshot>, AnalysisError>;
}

/// Trait for return predictors consulted after consensus
pub trait ReturnPredictor: Send + Sync {
    fn name(&self) -> &str;

    fn predict(
        &self,
        quality: &QualityScore,
        snapshot: &FeatureSnapshot,
        market: &MarketContext,
    ) -> Result<EnsembleOutput, AnalysisError>;
}
