//! Concurrent snapshot collection from a `SnapshotSource`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{AnalysisError, CancellationFlag, FeatureSnapshot, SnapshotSource};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Snapshots for a universe, keyed by symbol. `None` marks a symbol whose
/// fetch failed, timed out or returned no record.
#[derive(Debug, Default)]
pub struct CollectedSnapshots {
    pub snapshots: BTreeMap<String, Option<FeatureSnapshot>>,
    pub failures: Vec<AnalysisError>,
}

pub struct SnapshotCollector {
    source: Arc<dyn SnapshotSource>,
    timeout: Duration,
    max_concurrency: usize,
}

impl SnapshotCollector {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source,
            timeout: DEFAULT_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Fetch every symbol with at most `max_concurrency` calls in flight.
    ///
    /// Per-symbol failures never abort the batch; they become `None` entries
    /// with a `DataInsufficient` failure. Cancellation aborts the outstanding
    /// fetches and returns `Cancelled`.
    pub async fn collect(
        &self,
        symbols: &[String],
        cancel: &CancellationFlag,
    ) -> Result<CollectedSnapshots, AnalysisError> {
        tracing::info!("Collecting snapshots for {} symbols", symbols.len());

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<Id, String> = HashMap::with_capacity(symbols.len());

        for symbol in symbols {
            if cancel.is_cancelled() {
                tasks.abort_all();
                return Err(AnalysisError::Cancelled);
            }
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            let symbol = symbol.clone();
            let task_symbol = symbol.clone();
            let timeout = self.timeout;
            let handle = tasks.spawn(async move {
                let symbol = task_symbol;
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => match tokio::time::timeout(timeout, source.fetch(&symbol)).await {
                        Ok(result) => result,
                        Err(_) => Err(AnalysisError::Timeout(format!(
                            "snapshot fetch for {} exceeded {:?}",
                            symbol, timeout
                        ))),
                    },
                    Err(e) => Err(AnalysisError::InvalidData(e.to_string())),
                };
                (symbol, result)
            });
            pending.insert(handle.id(), symbol);
        }

        let mut collected = CollectedSnapshots::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            if cancel.is_cancelled() {
                tasks.abort_all();
                return Err(AnalysisError::Cancelled);
            }
            match joined {
                Ok((_, (symbol, Ok(Some(snapshot))))) => {
                    collected.snapshots.insert(symbol, Some(snapshot));
                }
                Ok((_, (symbol, Ok(None)))) => {
                    tracing::warn!("No snapshot available for {}", symbol);
                    collected
                        .failures
                        .push(AnalysisError::insufficient(&symbol, "no snapshot from source"));
                    collected.snapshots.insert(symbol, None);
                }
                Ok((_, (symbol, Err(e)))) => {
                    tracing::warn!("Failed to fetch snapshot for {}: {}", symbol, e);
                    collected
                        .failures
                        .push(AnalysisError::insufficient(&symbol, e.to_string()));
                    collected.snapshots.insert(symbol, None);
                }
                Err(e) => {
                    let Some(symbol) = pending.remove(&e.id()) else {
                        tracing::error!("Snapshot task error: {}", e);
                        continue;
                    };
                    tracing::error!("Snapshot task for {} failed: {}", symbol, e);
                    collected
                        .failures
                        .push(AnalysisError::insufficient(&symbol, e.to_string()));
                    collected.snapshots.insert(symbol, None);
                }
            }
        }

        tracing::info!(
            "Snapshot collection complete: {}/{} available",
            collected.snapshots.values().filter(|s| s.is_some()).count(),
            symbols.len()
        );
        Ok(collected)
    }
}
