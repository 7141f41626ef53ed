//! Share ingest: translates one share event into staged store commands.
//!
//! Nothing here touches the store. Failures can only surface when the batch
//! the commands were staged into is executed.

use tracing::debug;

use crate::{
    keys::{stats, KeyBuilder, KeyKind},
    types::{score_seconds, Batch, Command, ShareData},
};

/// Difficulty as recorded in a hashrate sample, negative for invalid shares.
pub fn signed_difficulty(is_valid_share: bool, difficulty: f64) -> f64 {
    if is_valid_share || difficulty == 0.0 {
        difficulty
    } else {
        -difficulty
    }
}

/// Hashrate sample member: `{signedDifficulty}:{worker}:{timestampMs}`.
pub fn hashrate_sample(is_valid_share: bool, share: &ShareData, timestamp_ms: u64) -> String {
    format!(
        "{}:{}:{}",
        signed_difficulty(is_valid_share, share.difficulty),
        share.worker,
        timestamp_ms
    )
}

#[derive(Debug, Clone)]
pub struct ShareIngest {
    keys: KeyBuilder,
}

impl ShareIngest {
    pub fn new(keys: KeyBuilder) -> Self {
        Self { keys }
    }

    /// Stage round credit, share counters and the hashrate sample for a share.
    pub fn stage(
        &self,
        batch: &mut Batch,
        is_valid_share: bool,
        share: &ShareData,
        timestamp_ms: u64,
    ) {
        if is_valid_share {
            batch.push(Command::HashIncrByFloat {
                key: self.keys.key(KeyKind::RoundCurrent),
                field: share.worker.clone(),
                delta: share.difficulty,
            });
            batch.push(Command::HashIncrBy {
                key: self.keys.key(KeyKind::Stats),
                field: stats::VALID_SHARES.to_string(),
                delta: 1,
            });
        } else {
            batch.push(Command::HashIncrBy {
                key: self.keys.key(KeyKind::Stats),
                field: stats::INVALID_SHARES.to_string(),
                delta: 1,
            });
        }

        batch.push(Command::SortedSetAdd {
            key: self.keys.key(KeyKind::Hashrate),
            score: score_seconds(timestamp_ms),
            member: hashrate_sample(is_valid_share, share, timestamp_ms),
        });
        debug!(
            worker = %share.worker,
            difficulty = share.difficulty,
            valid = is_valid_share,
            "Staged share"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(worker: &str, difficulty: f64) -> ShareData {
        ShareData {
            worker: worker.to_string(),
            difficulty,
            block_hash: None,
            tx_hash: None,
            height: 100,
            block_diff: 1000.0,
        }
    }

    #[test]
    fn test_valid_share_commands() {
        let ingest = ShareIngest::new(KeyBuilder::new("rvn"));
        let mut batch = Batch::new();
        ingest.stage(&mut batch, true, &share("w1", 16.0), 1_700_000_000_500);

        assert_eq!(
            batch.commands(),
            &[
                Command::HashIncrByFloat {
                    key: "rvn:shares:roundCurrent".into(),
                    field: "w1".into(),
                    delta: 16.0,
                },
                Command::HashIncrBy {
                    key: "rvn:stats".into(),
                    field: "validShares".into(),
                    delta: 1,
                },
                Command::SortedSetAdd {
                    key: "rvn:hashrate".into(),
                    score: 1_700_000_000,
                    member: "16:w1:1700000000500".into(),
                },
            ]
        );
    }

    #[test]
    fn test_invalid_share_never_credits_round() {
        let ingest = ShareIngest::new(KeyBuilder::new("rvn"));
        let mut batch = Batch::new();
        ingest.stage(&mut batch, false, &share("w1", 2.5), 1_000);

        assert_eq!(batch.len(), 2);
        assert!(batch
            .commands()
            .iter()
            .all(|c| !matches!(c, Command::HashIncrByFloat { .. })));
        assert_eq!(
            batch.commands()[0],
            Command::HashIncrBy {
                key: "rvn:stats".into(),
                field: "invalidShares".into(),
                delta: 1,
            }
        );
        assert_eq!(
            batch.commands()[1],
            Command::SortedSetAdd {
                key: "rvn:hashrate".into(),
                score: 1,
                member: "-2.5:w1:1000".into(),
            }
        );
    }

    #[test]
    fn test_signed_difficulty_zero_has_no_sign() {
        assert_eq!(signed_difficulty(false, 0.0).to_string(), "0");
        assert_eq!(signed_difficulty(false, 4.0), -4.0);
        assert_eq!(signed_difficulty(true, 4.0), 4.0);
    }
}
