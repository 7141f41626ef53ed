//! Share and block accounting core of a mining pool.
//!
//! [`ShareProcessor::handle_share`] turns each share reported by the mining
//! protocol engine into one atomic store batch: round credit, share counters
//! and a hashrate sample, plus round rotation and block records when the share
//! found a block.

pub mod aggregator;
pub mod backends;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod ingest;
pub mod keys;
pub mod logging;
pub mod processor;
pub mod store;
pub mod types;
pub mod version;

pub use error::*;
pub use processor::ShareProcessor;
pub use store::*;
pub use types::*;
