//! Share processor: the entry point fed by the mining protocol engine.
//!
//! Every call builds exactly one batch and executes it once. The batch always
//! carries the share's counters and hashrate sample; when the share found a
//! valid block it also carries the round rotation and block records, staged
//! only after the round total has been read. A call returns one outcome: the
//! applied result, or the stage that failed with nothing applied.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, error, info, warn};

use crate::{
    aggregator::RoundAggregator,
    error::{ProcessError, StoreError},
    finalizer::BlockFinalizer,
    ingest::ShareIngest,
    keys::{stats, KeyBuilder, KeyKind},
    store::StoreClient,
    types::{Batch, Command, ShareData, ShareOutcome},
};

#[derive(Clone)]
pub struct ShareProcessor {
    keys: KeyBuilder,
    store: Arc<dyn StoreClient>,
    ingest: ShareIngest,
    finalizer: BlockFinalizer,
}

impl ShareProcessor {
    /// Create a processor writing under `coin`'s namespace.
    pub fn new(coin: impl Into<String>, store: Arc<dyn StoreClient>) -> Self {
        let keys = KeyBuilder::new(coin);
        let aggregator = RoundAggregator::new(keys.clone(), store.clone());
        Self {
            ingest: ShareIngest::new(keys.clone()),
            finalizer: BlockFinalizer::new(keys.clone(), aggregator),
            keys,
            store,
        }
    }

    pub fn coin(&self) -> &str {
        self.keys.coin()
    }

    /// Record a share, finalizing the round when it found a valid block.
    pub async fn handle_share(
        &self,
        is_valid_share: bool,
        is_valid_block: bool,
        share: &ShareData,
    ) -> Result<ShareOutcome, ProcessError> {
        self.handle_share_at(is_valid_share, is_valid_block, share, now_millis())
            .await
    }

    /// As [`ShareProcessor::handle_share`], stamped with `timestamp_ms`.
    pub async fn handle_share_at(
        &self,
        is_valid_share: bool,
        is_valid_block: bool,
        share: &ShareData,
        timestamp_ms: u64,
    ) -> Result<ShareOutcome, ProcessError> {
        let result = self
            .process(is_valid_share, is_valid_block, share, timestamp_ms)
            .await;
        if let Err(e) = &result {
            error!(
                coin = %self.keys.coin(),
                worker = %share.worker,
                height = share.height,
                stage = e.stage(),
                "Error with share processor batch: {}",
                e
            );
        }
        result
    }

    async fn process(
        &self,
        is_valid_share: bool,
        is_valid_block: bool,
        share: &ShareData,
        timestamp_ms: u64,
    ) -> Result<ShareOutcome, ProcessError> {
        if !share.difficulty.is_finite() || share.difficulty < 0.0 {
            return Err(ProcessError::InvalidDifficulty(share.difficulty));
        }

        let mut batch = Batch::new();
        self.ingest
            .stage(&mut batch, is_valid_share, share, timestamp_ms);

        let finalization = if is_valid_block {
            let finalization = self.finalizer.prepare(share).await?;
            self.finalizer
                .stage(&mut batch, share, &finalization, timestamp_ms, is_valid_share);
            Some(finalization)
        } else {
            if share.block_hash.is_some() {
                warn!(
                    worker = %share.worker,
                    height = share.height,
                    "Block candidate rejected, counting invalid block"
                );
                batch.push(Command::HashIncrBy {
                    key: self.keys.key(KeyKind::Stats),
                    field: stats::INVALID_BLOCKS.to_string(),
                    delta: 1,
                });
            }
            None
        };

        let commands = batch.len();
        self.store.execute(batch).await.map_err(|e| match e {
            StoreError::GuardTripped { .. } => ProcessError::AlreadyFinalized {
                height: share.height,
            },
            other => ProcessError::Execution(other),
        })?;
        debug!(coin = %self.keys.coin(), commands, "Sent all data to store");

        Ok(match finalization {
            Some(finalization) => {
                info!(
                    coin = %self.keys.coin(),
                    height = finalization.height,
                    worker = %share.worker,
                    round_total = finalization.round_total,
                    effort = finalization.effort,
                    "Round finalized"
                );
                ShareOutcome::BlockFinalized(finalization)
            }
            None => ShareOutcome::Recorded,
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
