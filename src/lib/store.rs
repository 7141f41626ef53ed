//! Trait interface for the key-value store the processor writes to.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::{error::StoreResult, types::Batch};

/// Trait defining the interface for store backends.
///
/// The store is shared by every processor instance of every coin. Cross-batch
/// atomicity is delegated to it: `execute` must apply a batch all-or-nothing
/// and serialize whole batches against each other. Reads are never part of a
/// batch.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// All fields of a hash, empty when the key does not exist
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Whether a key currently exists
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Apply a batch atomically, honouring its finalize guard
    async fn execute(&self, batch: Batch) -> StoreResult<()>;

    /// Raw server version string, if the engine reports one
    async fn server_version(&self) -> StoreResult<Option<String>>;

    /// Health check for the store backend
    async fn health_check(&self) -> StoreResult<StoreHealth>;
}

/// Store backend health information
#[derive(Debug, Clone)]
pub struct StoreHealth {
    pub is_healthy: bool,
    pub backend_type: String,
    pub connection_status: String,
    pub last_operation_timestamp: Option<u64>,
    pub error_message: Option<String>,
}
