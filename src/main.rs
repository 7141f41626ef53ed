//! Entry point for the share processor.
//!
//! Loads the TOML configuration, connects the configured store, runs the
//! advisory store version probe, then replays JSON-lines share events through
//! [`ShareProcessor::handle_share`]. Each line looks like
//! `{"is_valid_share":true,"is_valid_block":false,"share":{...}}`.
mod args;

use std::{path::PathBuf, sync::Arc};

use args::process_cli_args;
use serde::Deserialize;
use share_processor::{
    backends::memory::MemoryStore,
    config::{BackendKind, StoreConfig},
    error::Error,
    logging::init_logging,
    store::StoreClient,
    types::ShareData,
    version::check_store_version,
    ShareProcessor,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct ShareEvent {
    is_valid_share: bool,
    is_valid_block: bool,
    share: ShareData,
}

async fn build_store(config: &StoreConfig) -> Result<Arc<dyn StoreClient>, Error> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis-backend")]
        BackendKind::Redis => {
            let store =
                share_processor::backends::redis::RedisStore::new(&config.host, config.port)?;
            store.connect().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis-backend"))]
        BackendKind::Redis => Err(Error::BackendNotCompiled("redis".to_string())),
    }
}

async fn open_input(input: Option<PathBuf>) -> Result<Box<dyn AsyncBufRead + Unpin>, Error> {
    Ok(match input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

async fn run(processor: ShareProcessor, input: Option<PathBuf>) -> Result<(), Error> {
    let mut lines = open_input(input).await?.lines();
    let (mut recorded, mut blocks, mut failed) = (0u64, 0u64, 0u64);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: ShareEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed share event: {}", e);
                failed += 1;
                continue;
            }
        };
        match processor
            .handle_share(event.is_valid_share, event.is_valid_block, &event.share)
            .await
        {
            Ok(outcome) => {
                recorded += 1;
                if let Some(effort) = outcome.effort() {
                    blocks += 1;
                    info!(height = event.share.height, effort, "Block recorded");
                }
            }
            // Already logged by the processor
            Err(_) => failed += 1,
        }
    }

    info!(recorded, blocks, failed, "Share input exhausted");
    Ok(())
}

#[tokio::main]
async fn main() {
    let (config, input) = match process_cli_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Failed to process CLI arguments: {}", e);
            return;
        }
    };
    init_logging(config.log_file());

    let store = match build_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to set up store: {}", e);
            return;
        }
    };
    check_store_version(store.as_ref()).await;

    let processor = ShareProcessor::new(config.coin.clone(), store.clone());
    info!(coin = %config.coin, backend = ?config.store.backend, "Share processor started");

    if let Err(e) = run(processor, input).await {
        error!("Share processor stopped: {}", e);
    }

    match store.health_check().await {
        Ok(health) => info!("Store health: {:?}", health),
        Err(e) => error!("Store health check failed: {}", e),
    }
}
