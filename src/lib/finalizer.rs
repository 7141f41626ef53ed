//! Block finalization: round rotation, block records and block effort.
//!
//! A finalization is prepared in two steps. [`BlockFinalizer::prepare`] reads
//! the round total and derives the effort; only when that succeeds does
//! [`BlockFinalizer::stage`] add the rotation and block record commands to the
//! share's batch. The batch carries a finalize-once guard keyed by height, so
//! a second finalization of the same height is rejected by the store as a
//! whole instead of rotating the round twice.

use tracing::debug;

use crate::{
    aggregator::RoundAggregator,
    error::ProcessError,
    keys::{stats, KeyBuilder, KeyKind},
    types::{score_seconds, Batch, BlockFinalization, Command, FinalizeGuard, ShareData},
};

/// Whether a block target difficulty can be divided by.
pub fn valid_block_target(block_diff: f64) -> bool {
    block_diff.is_finite() && block_diff > 0.0
}

/// Ratio of round share weight to the difficulty of the block found.
///
/// `None` when `block_diff` is not a positive finite number.
pub fn block_effort(round_total: f64, block_diff: f64) -> Option<f64> {
    valid_block_target(block_diff).then(|| round_total / block_diff)
}

#[derive(Clone)]
pub struct BlockFinalizer {
    keys: KeyBuilder,
    aggregator: RoundAggregator,
}

impl BlockFinalizer {
    pub fn new(keys: KeyBuilder, aggregator: RoundAggregator) -> Self {
        Self { keys, aggregator }
    }

    /// Read the round total and compute the block effort for `share`.
    pub async fn prepare(&self, share: &ShareData) -> Result<BlockFinalization, ProcessError> {
        if !valid_block_target(share.block_diff) {
            return Err(ProcessError::InvalidBlockTarget(share.block_diff));
        }

        let round_total = self
            .aggregator
            .current_round_total()
            .await
            .map_err(ProcessError::Aggregation)?;
        let effort = block_effort(round_total, share.block_diff)
            .ok_or(ProcessError::InvalidBlockTarget(share.block_diff))?;
        debug!(
            height = share.height,
            round_total, effort, "Calculated block effort"
        );

        Ok(BlockFinalization {
            height: share.height,
            round_total,
            effort,
        })
    }

    /// Stage round archival, the block records and block counters.
    ///
    /// `round_credited` is set when the same batch already credits the block
    /// share to the current round, so the round is known to exist at rename.
    /// Otherwise an empty round is finalized without an archive entry.
    pub fn stage(
        &self,
        batch: &mut Batch,
        share: &ShareData,
        finalization: &BlockFinalization,
        timestamp_ms: u64,
        round_credited: bool,
    ) {
        let height = finalization.height;
        let block_hash = share.block_hash.as_deref().unwrap_or_default();
        let tx_hash = share.tx_hash.as_deref().unwrap_or_default();
        let score = score_seconds(timestamp_ms);

        batch.guard_with(FinalizeGuard {
            key: self.keys.key(KeyKind::FinalizedRounds),
            field: height.to_string(),
            value: timestamp_ms.to_string(),
        });

        batch.push(Command::Rename {
            from: self.keys.key(KeyKind::RoundCurrent),
            to: self.keys.key(KeyKind::RoundArchive(height)),
            required: round_credited,
        });
        batch.push(Command::Rename {
            from: self.keys.key(KeyKind::TimesCurrent),
            to: self.keys.key(KeyKind::TimesArchive(height)),
            required: false,
        });
        batch.push(Command::SetAdd {
            key: self.keys.key(KeyKind::BlocksPending),
            member: format!("{}:{}:{}", block_hash, tx_hash, height),
        });
        batch.push(Command::SetAdd {
            key: self.keys.key(KeyKind::BlocksExplorer),
            member: format!(
                "{}:{}:{}:{}:{}",
                timestamp_ms, height, block_hash, share.worker, finalization.effort
            ),
        });
        batch.push(Command::SortedSetAdd {
            key: self.keys.key(KeyKind::LastBlock),
            score,
            member: format!(
                "{}:{}:{}:{}:{}",
                block_hash, tx_hash, share.worker, height, timestamp_ms
            ),
        });
        batch.push(Command::SortedSetAdd {
            key: self.keys.key(KeyKind::LastBlockTime),
            score,
            member: timestamp_ms.to_string(),
        });
        batch.push(Command::HashIncrBy {
            key: self.keys.key(KeyKind::Stats),
            field: stats::VALID_BLOCKS.to_string(),
            delta: 1,
        });
        batch.push(Command::HashIncrBy {
            key: self.keys.key(KeyKind::BlocksFound),
            field: share.worker.clone(),
            delta: 1,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backends::memory::MemoryStore, error::StoreError};
    use std::sync::Arc;

    fn block_share(block_diff: f64) -> ShareData {
        ShareData {
            worker: "finder".to_string(),
            difficulty: 5.0,
            block_hash: Some("00ab".to_string()),
            tx_hash: Some("cd01".to_string()),
            height: 321,
            block_diff,
        }
    }

    fn finalizer(store: Arc<MemoryStore>) -> BlockFinalizer {
        let keys = KeyBuilder::new("rvn");
        BlockFinalizer::new(keys.clone(), RoundAggregator::new(keys, store))
    }

    #[test]
    fn test_block_effort() {
        assert_eq!(block_effort(35.0, 35.0), Some(1.0));
        assert_eq!(block_effort(0.0, 10.0), Some(0.0));
        assert_eq!(block_effort(10.0, 0.0), None);
        assert_eq!(block_effort(10.0, -1.0), None);
        assert_eq!(block_effort(10.0, f64::NAN), None);
        assert_eq!(block_effort(10.0, f64::INFINITY), None);
    }

    #[tokio::test]
    async fn test_prepare_rejects_zero_target_without_reading() {
        let store = Arc::new(MemoryStore::new());
        // A read would consume this fault and fail as an aggregation error
        store.fail_next_reads(1);
        let err = finalizer(store).prepare(&block_share(0.0)).await.unwrap_err();
        assert!(matches!(err, ProcessError::InvalidBlockTarget(d) if d == 0.0));
    }

    #[tokio::test]
    async fn test_prepare_surfaces_aggregation_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_reads(1);
        let err = finalizer(store).prepare(&block_share(10.0)).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Aggregation(StoreError::BackendError(_))
        ));
    }

    #[tokio::test]
    async fn test_prepare_empty_round() {
        let store = Arc::new(MemoryStore::new());
        let done = finalizer(store).prepare(&block_share(10.0)).await.unwrap();
        assert_eq!(
            done,
            BlockFinalization {
                height: 321,
                round_total: 0.0,
                effort: 0.0,
            }
        );
    }

    #[test]
    fn test_stage_uncredited_round_rename_is_optional() {
        let store = Arc::new(MemoryStore::new());
        let done = BlockFinalization {
            height: 321,
            round_total: 0.0,
            effort: 0.0,
        };
        let mut batch = Batch::new();
        finalizer(store).stage(&mut batch, &block_share(35.0), &done, 1_000, false);

        assert_eq!(
            batch.commands()[0],
            Command::Rename {
                from: "rvn:shares:roundCurrent".into(),
                to: "rvn:shares:round321".into(),
                required: false,
            }
        );
    }

    #[test]
    fn test_stage_block_records() {
        let store = Arc::new(MemoryStore::new());
        let share = block_share(35.0);
        let done = BlockFinalization {
            height: 321,
            round_total: 35.0,
            effort: 1.0,
        };
        let mut batch = Batch::new();
        finalizer(store).stage(&mut batch, &share, &done, 1_700_000_123_456, true);

        let guard = batch.guard().unwrap();
        assert_eq!(guard.key, "rvn:roundsFinalized");
        assert_eq!(guard.field, "321");

        let commands = batch.commands();
        assert_eq!(commands.len(), 8);
        assert_eq!(
            commands[0],
            Command::Rename {
                from: "rvn:shares:roundCurrent".into(),
                to: "rvn:shares:round321".into(),
                required: true,
            }
        );
        assert_eq!(
            commands[1],
            Command::Rename {
                from: "rvn:shares:timesCurrent".into(),
                to: "rvn:shares:times321".into(),
                required: false,
            }
        );
        assert_eq!(
            commands[2],
            Command::SetAdd {
                key: "rvn:blocksPending".into(),
                member: "00ab:cd01:321".into(),
            }
        );
        assert_eq!(
            commands[3],
            Command::SetAdd {
                key: "rvn:blocksExplorer".into(),
                member: "1700000123456:321:00ab:finder:1".into(),
            }
        );
        assert_eq!(
            commands[4],
            Command::SortedSetAdd {
                key: "rvn:lastBlock".into(),
                score: 1_700_000_123,
                member: "00ab:cd01:finder:321:1700000123456".into(),
            }
        );
        assert_eq!(
            commands[5],
            Command::SortedSetAdd {
                key: "rvn:lastBlockTime".into(),
                score: 1_700_000_123,
                member: "1700000123456".into(),
            }
        );
        assert_eq!(
            commands[7],
            Command::HashIncrBy {
                key: "rvn:blocksFound".into(),
                field: "finder".into(),
                delta: 1,
            }
        );
    }
}
