//! Key naming for everything the processor writes.
//!
//! Every key is `{coin}:{kind}` with an optional height qualifier, and all of
//! them are produced here so producers and archival consumers never drift.

use std::fmt;

/// Kind of key in a coin's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Per-worker share weight of the live round
    RoundCurrent,
    /// Per-worker share times of the live round
    TimesCurrent,
    /// Archived round shares at a block height
    RoundArchive(u64),
    /// Archived round times at a block height
    TimesArchive(u64),
    Stats,
    Hashrate,
    BlocksPending,
    BlocksExplorer,
    LastBlock,
    LastBlockTime,
    /// Per-worker found block count
    BlocksFound,
    /// Finalize-once markers, one field per height
    FinalizedRounds,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::RoundCurrent => write!(f, "shares:roundCurrent"),
            KeyKind::TimesCurrent => write!(f, "shares:timesCurrent"),
            KeyKind::RoundArchive(height) => write!(f, "shares:round{}", height),
            KeyKind::TimesArchive(height) => write!(f, "shares:times{}", height),
            KeyKind::Stats => write!(f, "stats"),
            KeyKind::Hashrate => write!(f, "hashrate"),
            KeyKind::BlocksPending => write!(f, "blocksPending"),
            KeyKind::BlocksExplorer => write!(f, "blocksExplorer"),
            KeyKind::LastBlock => write!(f, "lastBlock"),
            KeyKind::LastBlockTime => write!(f, "lastBlockTime"),
            KeyKind::BlocksFound => write!(f, "blocksFound"),
            KeyKind::FinalizedRounds => write!(f, "roundsFinalized"),
        }
    }
}

/// Builds canonical keys for one coin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    coin: String,
}

impl KeyBuilder {
    pub fn new(coin: impl Into<String>) -> Self {
        Self { coin: coin.into() }
    }

    pub fn coin(&self) -> &str {
        &self.coin
    }

    pub fn key(&self, kind: KeyKind) -> String {
        format!("{}:{}", self.coin, kind)
    }
}

/// Stats hash fields.
pub mod stats {
    pub const VALID_SHARES: &str = "validShares";
    pub const INVALID_SHARES: &str = "invalidShares";
    pub const VALID_BLOCKS: &str = "validBlocks";
    pub const INVALID_BLOCKS: &str = "invalidBlocks";
}
