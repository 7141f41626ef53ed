//! Data types for share events, store commands and processing outcomes.

use serde::{Deserialize, Serialize};

/// One share submission as reported by the mining protocol engine.
///
/// Transient: consumed by the processor and never stored as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareData {
    /// Submitting worker (miner address or `address.rig`)
    pub worker: String,
    /// Share difficulty, the weight credited to the worker
    pub difficulty: f64,
    /// Hash of the block candidate, if the share met the network target
    #[serde(default)]
    pub block_hash: Option<String>,
    /// Coinbase transaction hash of the block candidate
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Height of the block being worked on
    pub height: u64,
    /// Network difficulty required to find the block
    pub block_diff: f64,
}

/// A single mutation staged into a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Float increment of a hash field, creating hash and field when absent
    HashIncrByFloat {
        key: String,
        field: String,
        delta: f64,
    },
    /// Integer increment of a hash field, creating hash and field when absent
    HashIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    /// Add a member to a sorted set, re-adding overwrites the score
    SortedSetAdd {
        key: String,
        score: i64,
        member: String,
    },
    /// Add a member to an unordered set
    SetAdd { key: String, member: String },
    /// Move `from` to `to`, replacing `to`. When `required` is set a missing
    /// `from` fails the whole batch, otherwise the rename is skipped.
    Rename {
        from: String,
        to: String,
        required: bool,
    },
}

/// Marker checked and set inside the same atomic execution as a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeGuard {
    pub key: String,
    pub field: String,
    pub value: String,
}

/// Ordered commands executed all-or-nothing by a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    commands: Vec<Command>,
    guard: Option<FinalizeGuard>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn guard_with(&mut self, guard: FinalizeGuard) {
        self.guard = Some(guard);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn guard(&self) -> Option<&FinalizeGuard> {
        self.guard.as_ref()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Command>, Option<FinalizeGuard>) {
        (self.commands, self.guard)
    }
}

/// Result of a finalized round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockFinalization {
    pub height: u64,
    /// Round share weight read before the rotation batch was built
    pub round_total: f64,
    /// `round_total / block_diff`
    pub effort: f64,
}

/// Successful outcome of `handle_share`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ShareOutcome {
    /// Share counters and hashrate sample were written
    Recorded,
    /// As `Recorded`, and the round was archived with the block recorded
    BlockFinalized(BlockFinalization),
}

impl ShareOutcome {
    pub fn effort(&self) -> Option<f64> {
        match self {
            ShareOutcome::Recorded => None,
            ShareOutcome::BlockFinalized(block) => Some(block.effort),
        }
    }
}

/// Milliseconds to the whole seconds used as sorted set scores.
pub fn score_seconds(timestamp_ms: u64) -> i64 {
    (timestamp_ms / 1000) as i64
}
