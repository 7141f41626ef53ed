//! Round aggregator: total share weight of a coin's live round.
//!
//! The read is a plain round trip issued before the finalization batch is
//! built. Shares ingested between this read and the batch execution are still
//! moved by the rotation but are not part of the returned total.

use std::sync::Arc;
use tracing::debug;

use crate::{
    error::{StoreError, StoreResult},
    keys::{KeyBuilder, KeyKind},
    store::StoreClient,
};

#[derive(Clone)]
pub struct RoundAggregator {
    keys: KeyBuilder,
    store: Arc<dyn StoreClient>,
}

impl RoundAggregator {
    pub fn new(keys: KeyBuilder, store: Arc<dyn StoreClient>) -> Self {
        Self { keys, store }
    }

    /// Sum of every worker's share weight in the current round, zero when the
    /// round has no entries yet.
    pub async fn current_round_total(&self) -> StoreResult<f64> {
        let key = self.keys.key(KeyKind::RoundCurrent);
        let round = self.store.hgetall(&key).await?;

        let mut total = 0.0;
        for (worker, shares) in &round {
            let shares: f64 = shares.parse().map_err(|_| {
                StoreError::InvalidData(format!(
                    "{} holds non-numeric shares `{}` for {}",
                    key, shares, worker
                ))
            })?;
            debug!(worker = %worker, shares, "Shares for worker");
            total += shares;
        }
        debug!(round = %key, workers = round.len(), total, "Calculated round total");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::memory::MemoryStore,
        types::{Batch, Command},
    };

    async fn seeded(entries: &[(&str, &str, f64)]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut batch = Batch::new();
        for (key, worker, delta) in entries {
            batch.push(Command::HashIncrByFloat {
                key: key.to_string(),
                field: worker.to_string(),
                delta: *delta,
            });
        }
        store.execute(batch).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_absent_round_totals_zero() {
        let store = Arc::new(MemoryStore::new());
        let aggregator = RoundAggregator::new(KeyBuilder::new("rvn"), store);
        assert_eq!(aggregator.current_round_total().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_sums_all_workers() {
        let store = seeded(&[
            ("rvn:shares:roundCurrent", "a", 10.0),
            ("rvn:shares:roundCurrent", "b", 20.0),
            ("rvn:shares:roundCurrent", "a", 5.0),
        ])
        .await;
        let aggregator = RoundAggregator::new(KeyBuilder::new("rvn"), store);
        assert_eq!(aggregator.current_round_total().await.unwrap(), 35.0);
    }

    #[tokio::test]
    async fn test_reads_only_own_coin() {
        let store = seeded(&[
            ("rvn:shares:roundCurrent", "a", 10.0),
            ("ravencoin:shares:roundCurrent", "a", 99.0),
        ])
        .await;
        let aggregator = RoundAggregator::new(KeyBuilder::new("rvn"), store);
        assert_eq!(aggregator.current_round_total().await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_read_failure_propagates() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_reads(1);
        let aggregator = RoundAggregator::new(KeyBuilder::new("rvn"), store);
        assert!(matches!(
            aggregator.current_round_total().await,
            Err(StoreError::BackendError(_))
        ));
    }
}
